use crate::cinfo;
use crate::cluster::ClusterAssignment;
use crate::data::Prediction;
use crate::error::{Error, Result};
use crate::param::Param;
use crate::sampler::{Sampler, SamplingPolicy};
use crate::scoring::{score_selection, weighted_score, AccuracyEstimate, EmptyClusterMass};
use crate::utils::{mean_and_variance, sample_sizes};
use log::{debug, error, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What to do with a trial whose sampling or scoring failed
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[allow(non_camel_case_types)]
pub enum TrialErrorPolicy {
    /// stop the whole run and return the error
    abort,
    /// leave the trial's cells empty and go on
    skip,
}

//-----------------------------------------------------------------------------
// Trials
//-----------------------------------------------------------------------------

/// Accuracy estimates produced by one trial
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialOutcome {
    pub selective: f64,
    pub random: f64,
}

/// Read-only state shared by every trial: the clustered population and
/// the classifier's predictions on it.
pub struct Evaluation<'a> {
    sampler: Sampler<'a>,
    weights: &'a [f64],
    predictions: &'a [Prediction],
    labels: &'a [usize],
    mass: EmptyClusterMass,
}

impl<'a> Evaluation<'a> {
    pub fn new(
        assignment: &'a ClusterAssignment,
        weights: &'a [f64],
        predictions: &'a [Prediction],
        labels: &'a [usize],
        mass: EmptyClusterMass,
    ) -> Result<Evaluation<'a>> {
        if predictions.len() != assignment.len() || labels.len() != assignment.len() {
            return Err(Error::DimensionMismatch {
                expected: format!("{} predictions and labels", assignment.len()),
                actual: format!("{} predictions, {} labels", predictions.len(), labels.len()),
            });
        }
        Ok(Evaluation { sampler: Sampler::new(assignment, weights)?, weights, predictions, labels, mass })
    }

    /// Draws one random and one selective sample of `sample_size` and scores both
    pub fn trial(&self, sample_size: usize, rng: &mut ChaCha8Rng) -> Result<TrialOutcome> {
        let random_selection = self.sampler.sample(SamplingPolicy::Random, sample_size, rng)?;
        let selective_selection = self.sampler.sample(SamplingPolicy::Selective, sample_size, rng)?;

        let random = score_selection(self.predictions, self.labels, &random_selection)?;
        let selective = weighted_score(
            self.sampler.assignment(),
            self.weights,
            &selective_selection,
            self.predictions,
            self.labels,
            self.mass,
        )?;

        Ok(TrialOutcome { selective: selective.accuracy, random: random.accuracy })
    }
}

/// RNG of one trial: the run seed with its own stream, so that a trial's
/// draws do not depend on which thread runs it or in which order
pub fn trial_rng(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

//-----------------------------------------------------------------------------
// Results
//-----------------------------------------------------------------------------

/// Statistics of one sample size across its completed trials
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StepSummary {
    pub step: usize,
    pub sample_size: usize,
    pub completed_trials: usize,
    pub select_mean: f64,
    pub random_mean: f64,
    pub select_variance: f64,
    pub random_variance: f64,
    /// Var(selective) / Var(random), None when random estimates did not vary
    pub relative_efficiency: Option<f64>,
}

/// Accuracy estimates of every (trial, sample size) cell, one matrix per policy
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AccuracyMatrices {
    pub sample_sizes: Vec<usize>,
    /// select[trial][step], None when the trial was skipped or never ran
    pub select: Vec<Vec<Option<f64>>>,
    pub random: Vec<Vec<Option<f64>>>,
    pub summary: Vec<StepSummary>,
    pub skipped_trials: usize,
    pub interrupted: bool,
}

impl AccuracyMatrices {
    pub fn new(sample_sizes: Vec<usize>, statistic: usize) -> AccuracyMatrices {
        let steps = sample_sizes.len();
        AccuracyMatrices {
            sample_sizes,
            select: vec![vec![None; steps]; statistic],
            random: vec![vec![None; steps]; statistic],
            summary: Vec::new(),
            skipped_trials: 0,
            interrupted: false,
        }
    }

    fn column(matrix: &[Vec<Option<f64>>], step: usize) -> Vec<f64> {
        matrix.iter().filter_map(|row| row[step]).collect()
    }

    /// Summary of a sample size, None if none of its trials completed
    pub fn summarize(&self, step: usize) -> Option<StepSummary> {
        let select = Self::column(&self.select, step);
        let random = Self::column(&self.random, step);
        if select.is_empty() {
            return None;
        }

        let (select_mean, select_variance) = mean_and_variance(&select);
        let (random_mean, random_variance) = mean_and_variance(&random);
        let relative_efficiency = if random_variance > 0.0 { Some(select_variance / random_variance) } else { None };

        Some(StepSummary {
            step,
            sample_size: self.sample_sizes[step],
            completed_trials: select.len(),
            select_mean,
            random_mean,
            select_variance,
            random_variance,
            relative_efficiency,
        })
    }
}

/// Runs `statistic` trials for every sample size `init_size + inc_size * step`.
///
/// Trials of a sample size run in parallel on `pool`. Clearing `running`
/// stops the loop between trials; cells of trials that never ran stay None.
pub fn evaluate(
    evaluation: &Evaluation,
    param: &Param,
    pool: &ThreadPool,
    running: Arc<AtomicBool>,
) -> Result<AccuracyMatrices> {
    let sizes = sample_sizes(param.sampling.init_size, param.sampling.inc_size, param.sampling.iters);
    let statistic = param.sampling.statistic;
    let mut results = AccuracyMatrices::new(sizes.clone(), statistic);

    for (step, &sample_size) in sizes.iter().enumerate() {
        if !running.load(Ordering::Relaxed) {
            results.interrupted = true;
            break;
        }
        debug!("Running {} trials with sample size {}", statistic, sample_size);

        let outcomes: Vec<Option<Result<TrialOutcome>>> = pool.install(|| {
            (0..statistic)
                .into_par_iter()
                .map(|trial| {
                    if !running.load(Ordering::Relaxed) {
                        return None;
                    }
                    let mut rng = trial_rng(param.general.seed, (step * statistic + trial) as u64);
                    Some(evaluation.trial(sample_size, &mut rng))
                })
                .collect()
        });

        for (trial, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(outcome)) => {
                    results.select[trial][step] = Some(outcome.selective);
                    results.random[trial][step] = Some(outcome.random);
                }
                Some(Err(e)) => match param.sampling.on_trial_error {
                    TrialErrorPolicy::abort => {
                        error!("Trial {} with sample size {} failed: {}", trial, sample_size, e);
                        return Err(e);
                    }
                    TrialErrorPolicy::skip => {
                        warn!("Trial {} with sample size {} skipped: {}", trial, sample_size, e);
                        results.skipped_trials += 1;
                    }
                },
                None => results.interrupted = true,
            }
        }

        if let Some(summary) = results.summarize(step) {
            cinfo!(
                param.general.display_colorful,
                "\x1b[1;93mSize {:>4}\x1b[0m | selective {:.4} | random {:.4} | re: {}",
                sample_size,
                summary.select_mean,
                summary.random_mean,
                summary.relative_efficiency.map_or("n/a".to_string(), |re| format!("{:.4}", re))
            );
            results.summary.push(summary);
        }

        if results.interrupted {
            warn!("Experiment interrupted during sample size {}: remaining trials left empty", sample_size);
            break;
        }
    }

    Ok(results)
}

//-----------------------------------------------------------------------------
// Experiment
//-----------------------------------------------------------------------------

/// Complete experiment: setup, reference accuracies and the accuracy matrices
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Experiment {
    /// Experiment ID, i.e. name and timestamp
    pub id: String,
    pub timestamp: String,
    /// crate version and git hash used
    pub version: String,
    pub parameters: Param,

    pub population_size: usize,
    pub dimension: usize,
    pub num_classes: usize,
    pub cluster_sizes: Vec<usize>,
    pub weights: Vec<f64>,

    /// Accuracy of the classifier on the whole operational set
    pub operational_accuracy: AccuracyEstimate,
    /// If a test set was provided, accuracy on it
    pub test_accuracy: Option<AccuracyEstimate>,

    pub results: AccuracyMatrices,

    /// Execution time in seconds
    pub execution_time: f64,
}

impl Experiment {
    pub fn display_results(&self) -> String {
        let mut text = String::new();
        text.push_str(&format!("\n=============== Experiment {} ===============\n\n", self.id));
        text.push_str(&format!("Version: v{}\n", self.version));
        text.push_str(&format!("Timestamp: {}\n", self.timestamp));
        text.push_str(&format!("Execution time: {:.2}s\n", self.execution_time));
        text.push_str(&format!(
            "Population: {} samples, dimension {}, {} classes\n",
            self.population_size, self.dimension, self.num_classes
        ));
        text.push_str(&format!("Clusters: {} (sizes {:?})\n", self.cluster_sizes.len(), self.cluster_sizes));
        text.push_str(&format!(
            "Operational accuracy: {:.4} (variance {:.4})\n",
            self.operational_accuracy.accuracy, self.operational_accuracy.variance
        ));
        if let Some(test) = &self.test_accuracy {
            text.push_str(&format!("Test accuracy: {:.4} (variance {:.4})\n", test.accuracy, test.variance));
        }
        if self.results.skipped_trials > 0 {
            text.push_str(&format!("Skipped trials: {}\n", self.results.skipped_trials));
        }
        if self.results.interrupted {
            text.push_str("\x1b[1;91mRun interrupted: results are partial\x1b[0m\n");
        }

        text.push_str(&format!(
            "\n{:>6} {:>8} {:>12} {:>12} {:>12} {:>12} {:>8}\n",
            "size", "trials", "sel. mean", "rand. mean", "sel. var", "rand. var", "re"
        ));
        for s in &self.results.summary {
            text.push_str(&format!(
                "{:>6} {:>8} {:>12.4} {:>12.4} {:>12.6} {:>12.6} {:>8}\n",
                s.sample_size,
                s.completed_trials,
                s.select_mean,
                s.random_mean,
                s.select_variance,
                s.random_variance,
                s.relative_efficiency.map_or("n/a".to_string(), |re| format!("{:.4}", re))
            ));
        }

        crate::utils::strip_ansi_if_needed(&text, self.parameters.general.display_colorful)
    }

    /// Writes both accuracy matrices and the per-size summary into the output directory
    pub fn save_results(&self) -> Result<()> {
        let output = &self.parameters.output;
        let dir = Path::new(&output.dir);
        fs::create_dir_all(dir)?;

        write_matrix(dir.join(&output.select_file), &self.results.select)?;
        write_matrix(dir.join(&output.random_file), &self.results.random)?;

        let mut writer = csv::Writer::from_path(dir.join(&output.summary_file))?;
        for summary in &self.results.summary {
            writer.serialize(summary)?;
        }
        writer.flush()?;

        debug!("Results written in {}", dir.display());
        Ok(())
    }

    /// Saves the experiment in a format chosen from the file extension
    pub fn save_auto<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        match extension(path).as_str() {
            "json" => self.save_json(path),
            "bin" | "bincode" => self.save_bincode(path),
            _ => {
                warn!("Unknown format. Saving experiment in json.");
                self.save_json(path.with_extension("json"))
            }
        }
    }

    fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    fn save_bincode<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let encoded = bincode::serialize(self)?;
        fs::write(path, encoded)?;
        Ok(())
    }

    /// Loads an experiment saved by `save_auto`
    pub fn load_auto<P: AsRef<Path>>(path: P) -> Result<Experiment> {
        let path = path.as_ref();
        match extension(path).as_str() {
            "json" => Ok(serde_json::from_str(&fs::read_to_string(path)?)?),
            "bin" | "bincode" => Ok(bincode::deserialize(&fs::read(path)?)?),
            other => Err(Error::InvalidParam(format!("unknown experiment format '{}'", other))),
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase()
}

/// Comma-delimited matrix without header, `nan` for empty cells
fn write_matrix<P: AsRef<Path>>(path: P, matrix: &[Vec<Option<f64>>]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    for row in matrix {
        writer.write_record(row.iter().map(|cell| match cell {
            Some(v) => format!("{:.18e}", v),
            None => "nan".to_string(),
        }))?;
    }
    writer.flush()?;
    Ok(())
}
