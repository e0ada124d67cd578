use crate::cluster::ClusteringMethod;
use crate::error::{Error, Result};
use crate::experiment::TrialErrorPolicy;
use crate::scoring::EmptyClusterMass;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

// Field definitions and associated default values

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Param {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub clustering: Clustering,
    #[serde(default)]
    pub sampling: Sampling,
    #[serde(default)]
    pub output: Output,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct General {
    #[serde(default = "seed_default")]
    pub seed: u64,
    #[serde(default = "one_default")]
    pub thread_number: usize,
    #[serde(default = "log_base_default")]
    pub log_base: String,
    #[serde(default = "log_suffix_default")]
    pub log_suffix: String,
    #[serde(default = "log_level_default")]
    pub log_level: String,
    #[serde(default = "true_default")]
    pub display_colorful: bool,
    #[serde(default = "empty_string")]
    pub save_exp: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Data {
    #[serde(default = "empty_string")]
    pub operational: String,
    #[serde(default = "empty_string")]
    pub test: String,
    #[serde(default = "delimiter_default")]
    pub delimiter: String,
    #[serde(default = "empty_string")]
    pub classifier_head: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Clustering {
    #[serde(default = "clustering_method_default")]
    pub method: ClusteringMethod,
    /// 0 means one cluster per class, capped at max_clusters
    #[serde(default = "uzero_default")]
    pub n_clusters: usize,
    #[serde(default = "max_clusters_default")]
    pub max_clusters: usize,
    #[serde(default = "max_iter_default")]
    pub max_iter: usize,
    #[serde(default = "tolerance_default")]
    pub tolerance: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Sampling {
    #[serde(default = "init_size_default")]
    pub init_size: usize,
    #[serde(default = "inc_size_default")]
    pub inc_size: usize,
    #[serde(default = "iters_default")]
    pub iters: usize,
    #[serde(default = "statistic_default")]
    pub statistic: usize,
    #[serde(default = "empty_cluster_mass_default")]
    pub empty_cluster_mass: EmptyClusterMass,
    #[serde(default = "on_trial_error_default")]
    pub on_trial_error: TrialErrorPolicy,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Output {
    #[serde(default = "output_dir_default")]
    pub dir: String,
    #[serde(default = "select_file_default")]
    pub select_file: String,
    #[serde(default = "random_file_default")]
    pub random_file: String,
    #[serde(default = "summary_file_default")]
    pub summary_file: String,
}

// Default section definitions

impl Default for General {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Data {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Clustering {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Sampling {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Output {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Param {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Param {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn get<P: AsRef<Path>>(param_file: P) -> Result<Param> {
    let param_file_reader = File::open(param_file)?;
    let param_reader = BufReader::new(param_file_reader);

    let mut config: Param = serde_yaml::from_reader(param_reader)?;

    validate(&mut config)?;

    Ok(config)
}

pub fn validate(param: &mut Param) -> Result<()> {
    if !param.general.log_base.is_empty() {
        param.general.display_colorful = false;
    }

    if param.data.operational.is_empty() {
        return Err(Error::InvalidParam("data.operational must point to the operational set".to_string()));
    }

    crate::data::delimiter_byte(&param.data.delimiter)?;

    if param.general.thread_number == 0 {
        return Err(Error::InvalidParam("general.thread_number must be at least 1".to_string()));
    }

    validate_sampling(param)?;
    validate_clustering(param)?;

    if param.sampling.empty_cluster_mass == EmptyClusterMass::legacy {
        warn!(
            "empty_cluster_mass=legacy: empty clusters with an id above the largest sampled one keep their weight \
            in the denominator. Weighted accuracies are then biased; use it only to reproduce older results."
        );
    }

    Ok(())
}

fn validate_sampling(param: &Param) -> Result<()> {
    if param.sampling.statistic == 0 {
        return Err(Error::InvalidParam("sampling.statistic (trials per sample size) must be positive".to_string()));
    }
    if param.sampling.iters == 0 {
        return Err(Error::InvalidParam("sampling.iters (number of sample sizes) must be positive".to_string()));
    }
    if param.sampling.init_size == 0 {
        return Err(Error::InvalidParam("sampling.init_size must be positive".to_string()));
    }
    Ok(())
}

fn validate_clustering(param: &Param) -> Result<()> {
    if !(param.clustering.tolerance > 0.0) {
        return Err(Error::InvalidParam(format!(
            "Invalid clustering.tolerance={}. Must be > 0.",
            param.clustering.tolerance
        )));
    }
    if param.clustering.n_clusters == 0 && param.clustering.max_clusters == 0 {
        return Err(Error::InvalidParam(
            "clustering.max_clusters must be positive when n_clusters is automatic".to_string(),
        ));
    }
    if param.clustering.max_iter == 0 {
        return Err(Error::InvalidParam("clustering.max_iter must be positive".to_string()));
    }
    Ok(())
}

// Default value definitions

fn seed_default() -> u64 {
    1
}
fn empty_string() -> String {
    "".to_string()
}
fn log_base_default() -> String {
    "".to_string()
}
fn log_suffix_default() -> String {
    "log".to_string()
}
fn log_level_default() -> String {
    "info".to_string()
}
fn delimiter_default() -> String {
    "\t".to_string()
}
fn clustering_method_default() -> ClusteringMethod {
    ClusteringMethod::kmeans
}
fn max_clusters_default() -> usize {
    10
}
fn max_iter_default() -> usize {
    300
}
fn tolerance_default() -> f64 {
    1e-4
}
fn init_size_default() -> usize {
    30
}
fn inc_size_default() -> usize {
    5
}
fn iters_default() -> usize {
    30
}
fn statistic_default() -> usize {
    500
}
fn empty_cluster_mass_default() -> EmptyClusterMass {
    EmptyClusterMass::accumulate
}
fn on_trial_error_default() -> TrialErrorPolicy {
    TrialErrorPolicy::abort
}
fn output_dir_default() -> String {
    "./exp_results/".to_string()
}
fn select_file_default() -> String {
    "select_accuracy.csv".to_string()
}
fn random_file_default() -> String {
    "random_accuracy.csv".to_string()
}
fn summary_file_default() -> String {
    "summary.csv".to_string()
}
fn true_default() -> bool {
    true
}
fn uzero_default() -> usize {
    0
}
fn one_default() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn valid_param() -> Param {
        let mut param = Param::default();
        param.data.operational = "operational.tsv".to_string();
        param
    }

    #[test]
    fn test_defaults_match_reference_experiment() {
        let param = Param::default();
        assert_eq!(param.sampling.statistic, 500);
        assert_eq!(param.sampling.iters, 30);
        assert_eq!(param.sampling.init_size, 30);
        assert_eq!(param.sampling.inc_size, 5);
        assert_eq!(param.clustering.max_clusters, 10);
        assert_eq!(param.clustering.n_clusters, 0);
        assert_eq!(param.clustering.method, ClusteringMethod::kmeans);
        assert_eq!(param.sampling.empty_cluster_mass, EmptyClusterMass::accumulate);
        assert_eq!(param.sampling.on_trial_error, TrialErrorPolicy::abort);
        assert_eq!(param.output.select_file, "select_accuracy.csv");
        assert_eq!(param.data.delimiter, "\t");
    }

    #[test]
    fn test_get_parses_partial_yaml() {
        let dir = std::env::temp_dir().join(format!("opaccuracy_param_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("param.yaml");
        fs::write(
            &path,
            "general:\n  seed: 7\n  log_base: run\ndata:\n  operational: op.csv\n  delimiter: ','\n\
             clustering:\n  method: precomputed\nsampling:\n  statistic: 20\n  empty_cluster_mass: legacy\n  on_trial_error: skip\n",
        )
        .unwrap();

        let param = get(&path).unwrap();
        assert_eq!(param.general.seed, 7);
        assert!(!param.general.display_colorful);
        assert_eq!(param.data.delimiter, ",");
        assert_eq!(param.clustering.method, ClusteringMethod::precomputed);
        assert_eq!(param.sampling.statistic, 20);
        assert_eq!(param.sampling.iters, 30);
        assert_eq!(param.sampling.empty_cluster_mass, EmptyClusterMass::legacy);
        assert_eq!(param.sampling.on_trial_error, TrialErrorPolicy::skip);
    }

    #[test]
    fn test_validate_requires_operational_path() {
        let mut param = Param::default();
        assert!(matches!(validate(&mut param), Err(Error::InvalidParam(_))));
        assert!(validate(&mut valid_param()).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut param = valid_param();
        param.sampling.statistic = 0;
        assert!(validate(&mut param).is_err());

        let mut param = valid_param();
        param.sampling.iters = 0;
        assert!(validate(&mut param).is_err());

        let mut param = valid_param();
        param.sampling.init_size = 0;
        assert!(validate(&mut param).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_clustering() {
        let mut param = valid_param();
        param.clustering.tolerance = 0.0;
        assert!(validate(&mut param).is_err());

        let mut param = valid_param();
        param.clustering.max_clusters = 0;
        assert!(validate(&mut param).is_err());
        param.clustering.n_clusters = 4;
        assert!(validate(&mut param).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_delimiter() {
        let mut param = valid_param();
        param.data.delimiter = "||".to_string();
        assert!(validate(&mut param).is_err());
    }
}
