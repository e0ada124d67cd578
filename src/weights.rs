use crate::cluster::ClusterAssignment;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Population weight of each cluster: |cluster_i| / N, indexed by cluster id.
pub fn build_weights(assignment: &ClusterAssignment, population_size: usize) -> Result<Vec<f64>> {
    if assignment.k() == 0 {
        return Err(Error::InvalidClustering("cluster count must be positive".to_string()));
    }
    if population_size == 0 {
        return Err(Error::InvalidClustering("population is empty".to_string()));
    }
    if assignment.len() != population_size {
        return Err(Error::InvalidClustering(format!(
            "{} samples assigned to clusters but population holds {}",
            assignment.len(),
            population_size
        )));
    }

    let n = population_size as f64;
    Ok(assignment.sizes().into_iter().map(|size| size as f64 / n).collect())
}

/// Inverse-CDF lookup over normalised cluster weights.
///
/// `boundaries` has k+1 non-decreasing entries from 0 to 1; cluster i owns
/// the half-open interval [boundaries[i], boundaries[i+1]).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CumulativeTable {
    boundaries: Vec<f64>,
}

impl CumulativeTable {
    pub fn new(weights: &[f64]) -> Result<CumulativeTable> {
        if weights.is_empty() {
            return Err(Error::DegenerateWeights("no weight given".to_string()));
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(Error::DegenerateWeights(format!("weight {} is not a finite non-negative value", w)));
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(Error::DegenerateWeights("weights sum to zero".to_string()));
        }

        let mut boundaries = Vec::with_capacity(weights.len() + 1);
        boundaries.push(0.0);
        let mut acc = 0.0;
        for w in weights {
            acc += w / total;
            boundaries.push(acc);
        }

        Ok(CumulativeTable { boundaries })
    }

    pub fn k(&self) -> usize {
        self.boundaries.len() - 1
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    /// Probability mass of cluster i
    pub fn width(&self, i: usize) -> f64 {
        self.boundaries[i + 1] - self.boundaries[i]
    }

    /// Cluster owning the uniform draw `u` in [0, 1).
    ///
    /// A draw beyond the last boundary (round-off leaves it slightly below 1)
    /// goes to the last cluster with positive mass.
    pub fn locate(&self, u: f64) -> usize {
        let k = self.k();
        // first boundary strictly greater than u, minus one
        let upper = self.boundaries.partition_point(|&b| b <= u);
        if upper >= 1 && upper <= k {
            return upper - 1;
        }
        (0..k).rev().find(|&i| self.width(i) > 0.0).unwrap_or(0)
    }
}

/// Normalised prefix-sum table built from raw weights
pub fn build_cumulative_table(weights: &[f64]) -> Result<CumulativeTable> {
    CumulativeTable::new(weights)
}
