use crate::data::{FeatureSet, Prediction};
use crate::error::{Error, Result};
use crate::utils::argmax;
use log::info;
use std::path::Path;

/// Produces one prediction per sample of a FeatureSet, in order
pub trait Classifier {
    fn predict(&self, features: &FeatureSet) -> Result<Vec<Prediction>>;
}

/// Predictions computed upstream, e.g. read from the operational file
pub struct PrecomputedPredictions {
    pub predictions: Vec<Prediction>,
}

impl Classifier for PrecomputedPredictions {
    fn predict(&self, features: &FeatureSet) -> Result<Vec<Prediction>> {
        if self.predictions.len() != features.len() {
            return Err(Error::DimensionMismatch {
                expected: format!("{} predictions", features.len()),
                actual: format!("{}", self.predictions.len()),
            });
        }
        Ok(self.predictions.clone())
    }
}

/// Final linear layer of the classifier: softmax(W·x + b)
#[derive(Clone, Debug, PartialEq)]
pub struct LinearHead {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl LinearHead {
    pub fn new(weights: Vec<Vec<f64>>, bias: Vec<f64>) -> Result<LinearHead> {
        if weights.is_empty() {
            return Err(Error::InvalidData("classifier head has no class".to_string()));
        }
        if weights.len() != bias.len() {
            return Err(Error::DimensionMismatch {
                expected: format!("{} bias values", weights.len()),
                actual: format!("{}", bias.len()),
            });
        }
        let dim = weights[0].len();
        if dim == 0 || weights.iter().any(|w| w.len() != dim) {
            return Err(Error::DimensionMismatch {
                expected: format!("{} weights for every class", dim),
                actual: "rows of different lengths".to_string(),
            });
        }
        Ok(LinearHead { weights, bias })
    }

    /// Loads a head file without header: one row per class, bias first then weights
    pub fn load<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<LinearHead> {
        let path = path.as_ref();
        info!("Loading classifier head {}...", path.display());

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut weights = Vec::new();
        let mut bias = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let values = record?
                .iter()
                .map(|v| v.parse::<f64>())
                .collect::<std::result::Result<Vec<f64>, _>>()
                .map_err(|e| Error::InvalidData(format!("{} line {}: {}", path.display(), row + 1, e)))?;
            let (b, w) = values
                .split_first()
                .ok_or_else(|| Error::InvalidData(format!("{} line {} is empty", path.display(), row + 1)))?;
            bias.push(*b);
            weights.push(w.to_vec());
        }

        LinearHead::new(weights, bias)
    }

    pub fn num_classes(&self) -> usize {
        self.weights.len()
    }

    pub fn dim(&self) -> usize {
        self.weights[0].len()
    }

    /// Class probabilities of one vector
    pub fn probabilities(&self, vector: &[f64]) -> Vec<f64> {
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(w, b)| b + w.iter().zip(vector).map(|(wi, xi)| wi * xi).sum::<f64>())
            .collect();
        let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exp.iter().sum();
        exp.into_iter().map(|e| e / total).collect()
    }
}

impl Classifier for LinearHead {
    fn predict(&self, features: &FeatureSet) -> Result<Vec<Prediction>> {
        if features.dim() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: format!("vectors of length {}", self.dim()),
                actual: format!("{}", features.dim()),
            });
        }

        Ok(features
            .vectors()
            .map(|v| {
                let probabilities = self.probabilities(v);
                let label = argmax(&probabilities).unwrap_or(0);
                Prediction::new(label, probabilities[label])
            })
            .collect())
    }
}
