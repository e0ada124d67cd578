pub mod classifier;
pub mod cluster;
pub mod data;
pub mod error;
pub mod experiment;
pub mod param;
pub mod sampler;
pub mod scoring;
pub mod utils;
pub mod weights;

use crate::classifier::{Classifier, LinearHead, PrecomputedPredictions};
use crate::cluster::{default_cluster_count, ClusteringMethod, Clusterer, KMeans, PrecomputedClusters};
use crate::data::{delimiter_byte, OperationalData, Prediction};
use crate::error::{Error, Result};
use crate::experiment::{evaluate, Evaluation, Experiment};
use crate::scoring::score;
use crate::weights::build_weights;
use chrono::Local;
use log::{debug, info};
use param::Param;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::ThreadPoolBuilder;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Loads the files named in `param` and runs the experiment on them
pub fn run(param: &Param, running: Arc<AtomicBool>) -> Result<Experiment> {
    let delimiter = delimiter_byte(&param.data.delimiter)?;

    let data = OperationalData::load(&param.data.operational, delimiter)?;

    let test_data = if !param.data.test.is_empty() {
        debug!("Loading test data...");
        Some(OperationalData::load(&param.data.test, delimiter)?)
    } else {
        None
    };

    run_on_data(&data, test_data.as_ref(), param, running)
}

/// Runs the experiment on data already in memory
pub fn run_on_data(
    data: &OperationalData,
    test_data: Option<&OperationalData>,
    param: &Param,
    running: Arc<AtomicBool>,
) -> Result<Experiment> {
    let start = std::time::Instant::now();
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let colorful = param.general.display_colorful;

    cinfo!(colorful, "\x1b[2;97m{:?}\x1b[0m", data.features);

    let pool = ThreadPoolBuilder::new().num_threads(param.general.thread_number).build()?;

    // Predictions
    let head = load_head(param)?;
    let predictions = predict(data, head.as_ref())?;
    let operational_accuracy = score(&predictions, data.features.labels())?;
    cinfo!(
        colorful,
        "Accuracy on the whole operational set: \x1b[1;92m{:.4}\x1b[0m ({} samples)",
        operational_accuracy.accuracy,
        operational_accuracy.n
    );

    let test_accuracy = match test_data {
        Some(test) => {
            let test_predictions = predict(test, head.as_ref())?;
            let estimate = score(&test_predictions, test.features.labels())?;
            cinfo!(colorful, "Accuracy on the test set: {:.4} ({} samples)", estimate.accuracy, estimate.n);
            Some(estimate)
        }
        None => None,
    };

    // Clustering
    let k = cluster_count(data, param);
    let clusterer = build_clusterer(data, param)?;
    let mut rng = ChaCha8Rng::seed_from_u64(param.general.seed);
    let assignment = pool.install(|| clusterer.fit(&data.features, k, &mut rng))?;
    let weights = build_weights(&assignment, data.features.len())?;
    info!("{} clusters of sizes {:?}", assignment.k(), assignment.sizes());
    debug!("Cluster weights: {:?}", weights);

    // Sampling trials
    let evaluation = Evaluation::new(
        &assignment,
        &weights,
        &predictions,
        data.features.labels(),
        param.sampling.empty_cluster_mass,
    )?;
    let results = evaluate(&evaluation, param, &pool, running)?;

    let exec_time = start.elapsed().as_secs_f64();
    let name = Path::new(&param.general.save_exp)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("opaccuracy");

    Ok(Experiment {
        id: format!("{}_{}", name, timestamp),
        timestamp,
        version: version(),
        parameters: param.clone(),

        population_size: data.features.len(),
        dimension: data.features.dim(),
        num_classes: data.features.num_classes(),
        cluster_sizes: assignment.sizes(),
        weights,

        operational_accuracy,
        test_accuracy,

        results,
        execution_time: exec_time,
    })
}

/// crate version and the git hash recorded at build time
pub fn version() -> String {
    format!("{}#{}", env!("CARGO_PKG_VERSION"), option_env!("OPACCURACY_GIT_SHA").unwrap_or("unknown"))
}

fn load_head(param: &Param) -> Result<Option<LinearHead>> {
    if param.data.classifier_head.is_empty() {
        return Ok(None);
    }
    let delimiter = delimiter_byte(&param.data.delimiter)?;
    Ok(Some(LinearHead::load(&param.data.classifier_head, delimiter)?))
}

/// Predictions stored in the file win over the classifier head
fn predict(data: &OperationalData, head: Option<&LinearHead>) -> Result<Vec<Prediction>> {
    let classifier: Box<dyn Classifier> = match (&data.predictions, head) {
        (Some(predictions), _) => Box::new(PrecomputedPredictions { predictions: predictions.clone() }),
        (None, Some(head)) => Box::new(head.clone()),
        (None, None) => {
            return Err(Error::InvalidParam(
                "data has no prediction column and no data.classifier_head is set".to_string(),
            ))
        }
    };
    classifier.predict(&data.features)
}

fn cluster_count(data: &OperationalData, param: &Param) -> usize {
    if param.clustering.n_clusters > 0 {
        return param.clustering.n_clusters;
    }
    match (&param.clustering.method, &data.clusters) {
        (ClusteringMethod::precomputed, Some(ids)) => ids.iter().max().map_or(0, |m| m + 1),
        _ => default_cluster_count(data.features.num_classes(), param.clustering.max_clusters),
    }
}

fn build_clusterer(data: &OperationalData, param: &Param) -> Result<Box<dyn Clusterer>> {
    match param.clustering.method {
        ClusteringMethod::kmeans => {
            Ok(Box::new(KMeans { max_iter: param.clustering.max_iter, tolerance: param.clustering.tolerance }))
        }
        ClusteringMethod::precomputed => match &data.clusters {
            Some(ids) => Ok(Box::new(PrecomputedClusters { labels: ids.clone() })),
            None => Err(Error::InvalidParam(
                "clustering.method is precomputed but the data has no cluster column".to_string(),
            )),
        },
    }
}
