/// End-to-end test of the accuracy estimation experiment
///
/// The operational set holds three well separated blobs of 40 samples, one
/// per class. The classifier is always right on blob 0, always wrong on
/// blob 2 and right every other time on blob 1, so its true accuracy is 0.5
/// and stratified selection should estimate it with less variance.
///
/// Run with: cargo test --test test_experiment_e2e -- --nocapture
use opaccuracy::cluster::ClusteringMethod;
use opaccuracy::data::{FeatureSet, OperationalData, Prediction};
use opaccuracy::error::Error;
use opaccuracy::experiment::{Experiment, TrialErrorPolicy};
use opaccuracy::param::Param;
use opaccuracy::{run, run_on_data};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const PER_BLOB: usize = 40;
const CENTERS: [(f64, f64); 3] = [(0.0, 0.0), (8.0, 8.0), (16.0, 0.0)];

fn work_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("opaccuracy_e2e_{}_{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// (x, y, label, predicted label) rows
fn blob_rows(seed: u64) -> Vec<(f64, f64, usize, usize)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut rows = Vec::new();
    for (blob, &(cx, cy)) in CENTERS.iter().enumerate() {
        for i in 0..PER_BLOB {
            let x = cx + rng.gen_range(-0.5..0.5);
            let y = cy + rng.gen_range(-0.5..0.5);
            let correct = match blob {
                0 => true,
                1 => i % 2 == 0,
                _ => false,
            };
            let predicted = if correct { blob } else { (blob + 1) % 3 };
            rows.push((x, y, blob, predicted));
        }
    }
    rows
}

fn write_operational_file(path: &PathBuf, rows: &[(f64, f64, usize, usize)]) {
    let mut content = String::from("x\ty\tlabel\tprediction\tconfidence\n");
    for (x, y, label, predicted) in rows {
        content.push_str(&format!("{}\t{}\t{}\t{}\t0.9\n", x, y, label, predicted));
    }
    fs::write(path, content).unwrap();
}

fn operational_data(rows: &[(f64, f64, usize, usize)]) -> OperationalData {
    let vectors = rows.iter().map(|r| vec![r.0, r.1]).collect();
    let labels = rows.iter().map(|r| r.2).collect();
    let mut data = OperationalData::new(FeatureSet::new(vectors, labels).unwrap());
    data.predictions = Some(rows.iter().map(|r| Prediction::new(r.3, 0.9)).collect());
    data.clusters = Some(rows.iter().map(|r| r.2).collect());
    data
}

fn create_params(dir: &PathBuf) -> Param {
    let mut param = Param::default();

    param.general.seed = 42;
    param.general.thread_number = 2;
    param.general.display_colorful = false;
    param.general.log_level = "info".to_string();

    param.data.operational = dir.join("operational.tsv").to_string_lossy().to_string();
    param.data.delimiter = "\t".to_string();

    param.clustering.method = ClusteringMethod::kmeans;
    param.clustering.n_clusters = 0;

    param.sampling.init_size = 15;
    param.sampling.inc_size = 5;
    param.sampling.iters = 3;
    param.sampling.statistic = 100;
    param.sampling.on_trial_error = TrialErrorPolicy::abort;

    param.output.dir = dir.join("results").to_string_lossy().to_string();

    param
}

fn assert_experiment_shape(exp: &Experiment, statistic: usize) {
    assert_eq!(exp.population_size, 3 * PER_BLOB);
    assert_eq!(exp.dimension, 2);
    assert_eq!(exp.num_classes, 3);
    assert!((exp.operational_accuracy.accuracy - 0.5).abs() < 1e-12);
    assert!((exp.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);

    assert_eq!(exp.results.sample_sizes, vec![15, 20, 25]);
    assert_eq!(exp.results.select.len(), statistic);
    assert_eq!(exp.results.random.len(), statistic);
    for matrix in [&exp.results.select, &exp.results.random] {
        for row in matrix.iter() {
            assert_eq!(row.len(), 3);
            for cell in row {
                let acc = cell.expect("every cell computed");
                assert!((0.0..=1.0).contains(&acc));
            }
        }
    }

    assert_eq!(exp.results.summary.len(), 3);
    for summary in &exp.results.summary {
        assert_eq!(summary.completed_trials, statistic);
        assert!((summary.select_mean - 0.5).abs() < 0.05, "selective mean {}", summary.select_mean);
        assert!((summary.random_mean - 0.5).abs() < 0.05, "random mean {}", summary.random_mean);
        let re = summary.relative_efficiency.unwrap();
        assert!(re < 1.0, "relative efficiency {} at size {}", re, summary.sample_size);
    }
}

#[test]
fn test_run_from_files_with_kmeans() {
    let dir = work_dir("kmeans");
    let rows = blob_rows(1);
    write_operational_file(&dir.join("operational.tsv"), &rows);
    let mut param = create_params(&dir);
    param.general.save_exp = dir.join("exp.bin").to_string_lossy().to_string();

    let exp = run(&param, Arc::new(AtomicBool::new(true))).unwrap();

    assert_experiment_shape(&exp, 100);
    let mut sizes = exp.cluster_sizes.clone();
    sizes.sort();
    assert_eq!(sizes, vec![PER_BLOB; 3], "k-means should recover the three blobs");
    assert!(exp.test_accuracy.is_none());
    assert!(!exp.results.interrupted);
    assert!(exp.id.starts_with("exp_"));

    // delimited matrices and summary
    exp.save_results().unwrap();
    let results = PathBuf::from(&param.output.dir);
    let select = fs::read_to_string(results.join(&param.output.select_file)).unwrap();
    assert_eq!(select.lines().count(), 100);
    assert!(select.lines().all(|l| l.split(',').count() == 3));
    let summary = fs::read_to_string(results.join(&param.output.summary_file)).unwrap();
    assert_eq!(summary.lines().count(), 4);
    assert!(summary.lines().next().unwrap().starts_with("step,sample_size,completed_trials"));

    // binary round trip is exact
    exp.save_auto(&param.general.save_exp).unwrap();
    let loaded = Experiment::load_auto(&param.general.save_exp).unwrap();
    assert_eq!(loaded, exp);

    // json keeps the structure
    let json_path = dir.join("exp.json");
    exp.save_auto(&json_path).unwrap();
    let loaded = Experiment::load_auto(&json_path).unwrap();
    assert_eq!(loaded.id, exp.id);
    assert_eq!(loaded.results.select.len(), 100);
    assert_eq!(loaded.parameters, exp.parameters);

    assert!(exp.display_results().contains("Operational accuracy: 0.5000"));
}

#[test]
fn test_run_on_data_with_precomputed_clusters_and_test_set() {
    let dir = work_dir("precomputed");
    let mut param = create_params(&dir);
    param.clustering.method = ClusteringMethod::precomputed;
    param.general.thread_number = 3;

    let data = operational_data(&blob_rows(2));
    let test = operational_data(&blob_rows(3));

    let exp = run_on_data(&data, Some(&test), &param, Arc::new(AtomicBool::new(true))).unwrap();

    assert_experiment_shape(&exp, 100);
    assert_eq!(exp.cluster_sizes, vec![PER_BLOB; 3]);
    assert!((exp.test_accuracy.unwrap().accuracy - 0.5).abs() < 1e-12);

    // same seed, same results whatever the thread count
    param.general.thread_number = 1;
    let again = run_on_data(&data, Some(&test), &param, Arc::new(AtomicBool::new(true))).unwrap();
    assert_eq!(again.results, exp.results);
}

#[test]
fn test_interrupted_run_keeps_partial_results() {
    let dir = work_dir("interrupted");
    let mut param = create_params(&dir);
    param.clustering.method = ClusteringMethod::precomputed;

    let exp = run_on_data(&operational_data(&blob_rows(4)), None, &param, Arc::new(AtomicBool::new(false))).unwrap();

    assert!(exp.results.interrupted);
    assert!(exp.results.summary.is_empty());
    assert!(exp.results.select.iter().flatten().all(|c| c.is_none()));

    exp.save_results().unwrap();
    let select = fs::read_to_string(PathBuf::from(&param.output.dir).join(&param.output.select_file)).unwrap();
    assert!(select.lines().all(|l| l == "nan,nan,nan"));
}

#[test]
fn test_oversized_sample_aborts_or_skips() {
    let dir = work_dir("oversized");
    let mut param = create_params(&dir);
    param.clustering.method = ClusteringMethod::precomputed;
    param.sampling.statistic = 10;
    param.sampling.init_size = 110;
    let data = operational_data(&blob_rows(5));

    // sizes 110, 115, 120, 125: the last one exceeds the 120 samples
    param.sampling.iters = 4;
    let err = run_on_data(&data, None, &param, Arc::new(AtomicBool::new(true))).unwrap_err();
    assert!(matches!(err, Error::InsufficientPopulation { requested: 125, available: 120 }));

    param.sampling.on_trial_error = TrialErrorPolicy::skip;
    let exp = run_on_data(&data, None, &param, Arc::new(AtomicBool::new(true))).unwrap();
    assert_eq!(exp.results.skipped_trials, 10);
    assert_eq!(exp.results.summary.len(), 3);
    assert!(exp.results.select.iter().all(|row| row[3].is_none()));
}

#[test]
fn test_run_without_predictions_needs_classifier_head() {
    let dir = work_dir("no_predictions");
    let mut content = String::from("x\ty\tlabel\n");
    for (x, y, label, _) in blob_rows(6) {
        content.push_str(&format!("{}\t{}\t{}\n", x, y, label));
    }
    fs::write(dir.join("operational.tsv"), content).unwrap();
    let mut param = create_params(&dir);
    assert!(matches!(run(&param, Arc::new(AtomicBool::new(true))), Err(Error::InvalidParam(_))));

    // head scoring blob 0 low x, blob 1 high y, blob 2 high x
    fs::write(dir.join("head.tsv"), "4\t-1\t0\n-10\t0\t2\n-36\t3\t0\n").unwrap();
    param.data.classifier_head = dir.join("head.tsv").to_string_lossy().to_string();
    let exp = run(&param, Arc::new(AtomicBool::new(true))).unwrap();
    assert!((exp.operational_accuracy.accuracy - 1.0).abs() < 1e-12);
}
