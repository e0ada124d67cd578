use thiserror::Error;

/// Errors raised while clustering, sampling, scoring or running an experiment.
///
/// None of them is retried: they signal a mismatch between the requested
/// configuration (sample size, cluster count) and the data at hand.
#[derive(Debug, Error)]
pub enum Error {
    /// Non-positive cluster count, empty population or out-of-range cluster id.
    #[error("invalid clustering: {0}")]
    InvalidClustering(String),

    /// Weight vector that cannot be normalised (all zero, negative or non finite).
    #[error("degenerate weights: {0}")]
    DegenerateWeights(String),

    /// Random policy asked for more samples than the population holds.
    #[error("insufficient population: {requested} samples requested from a population of {available}")]
    InsufficientPopulation { requested: usize, available: usize },

    /// Selective policy ran out of members in every cluster it may draw from.
    #[error("population exhausted: {requested} samples requested but weighted clusters only hold {available}")]
    PopulationExhausted { requested: usize, available: usize },

    #[error("empty selection: {0}")]
    EmptySelection(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;
