use crate::cluster::ClusterAssignment;
use crate::data::Prediction;
use crate::error::{Error, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Which empty-cluster weights leave the normalising denominator
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[allow(non_camel_case_types)]
pub enum EmptyClusterMass {
    /// every empty cluster's weight is excluded
    accumulate,
    /// only empty clusters whose id is below the largest sampled id are
    /// excluded, as the first published experiments did; trailing empty
    /// clusters keep their weight in the denominator
    legacy,
}

/// Accuracy of a classifier on a subset and the dispersion of its correctness
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct AccuracyEstimate {
    pub accuracy: f64,
    /// population variance (ddof 0) of the correctness indicator
    pub variance: f64,
    pub n: usize,
}

/// Accuracy and indicator variance of `predictions` against `labels`
pub fn score(predictions: &[Prediction], labels: &[usize]) -> Result<AccuracyEstimate> {
    if predictions.len() != labels.len() {
        return Err(Error::DimensionMismatch {
            expected: format!("{} predictions", labels.len()),
            actual: format!("{}", predictions.len()),
        });
    }
    let hits = predictions.iter().zip(labels).map(|(p, &y)| if p.is_correct(y) { 1.0 } else { 0.0 });
    estimate_from_indicator(hits.collect())
}

/// Same as `score`, restricted to the population indices in `selection`
pub fn score_selection(predictions: &[Prediction], labels: &[usize], selection: &[usize]) -> Result<AccuracyEstimate> {
    if predictions.len() != labels.len() {
        return Err(Error::DimensionMismatch {
            expected: format!("{} predictions", labels.len()),
            actual: format!("{}", predictions.len()),
        });
    }
    check_selection(selection, labels.len())?;
    let hits = selection.iter().map(|&i| if predictions[i].is_correct(labels[i]) { 1.0 } else { 0.0 });
    estimate_from_indicator(hits.collect())
}

/// Every selected index must address the population
fn check_selection(selection: &[usize], population_size: usize) -> Result<()> {
    match selection.iter().find(|&&i| i >= population_size) {
        Some(i) => Err(Error::InvalidData(format!(
            "selected index {} outside a population of {}",
            i, population_size
        ))),
        None => Ok(()),
    }
}

fn estimate_from_indicator(hits: Vec<f64>) -> Result<AccuracyEstimate> {
    if hits.is_empty() {
        return Err(Error::EmptySelection("cannot score an empty selection".to_string()));
    }
    Ok(AccuracyEstimate {
        accuracy: hits.iter().mean(),
        variance: hits.iter().population_variance(),
        n: hits.len(),
    })
}

/// Weighted accuracy of a selective sample
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WeightedEstimate {
    pub accuracy: f64,
    /// weight mass removed from the denominator because no sample fell in it
    pub excluded_weight: f64,
    /// per cluster estimate, None when the cluster received no sample
    pub per_cluster: Vec<Option<AccuracyEstimate>>,
}

impl WeightedEstimate {
    pub fn variances(&self) -> Vec<Option<f64>> {
        self.per_cluster.iter().map(|e| e.map(|e| e.variance)).collect()
    }

    pub fn empty_clusters(&self) -> usize {
        self.per_cluster.iter().filter(|e| e.is_none()).count()
    }
}

/// Combines per-cluster estimates: Σ acc_i·w_i / (1 − excluded empty mass).
///
/// Returns the weighted accuracy and the excluded mass.
pub fn combine_weighted(
    per_cluster: &[Option<AccuracyEstimate>],
    weights: &[f64],
    mass: EmptyClusterMass,
) -> Result<(f64, f64)> {
    if per_cluster.len() != weights.len() {
        return Err(Error::DimensionMismatch {
            expected: format!("{} cluster weights", per_cluster.len()),
            actual: format!("{}", weights.len()),
        });
    }
    let last_sampled = per_cluster
        .iter()
        .rposition(|e| e.is_some())
        .ok_or_else(|| Error::EmptySelection("no cluster received a sample".to_string()))?;

    let mut weighted_sum = 0.0;
    let mut excluded = 0.0;
    let mut kept_empty = 0;
    for (i, (estimate, &w)) in per_cluster.iter().zip(weights).enumerate() {
        match estimate {
            Some(e) => weighted_sum += e.accuracy * w,
            None if mass == EmptyClusterMass::legacy && i > last_sampled => {
                if w > 0.0 {
                    kept_empty += 1;
                }
            }
            None => excluded += w,
        }
    }

    if kept_empty > 0 {
        warn!(
            "{} empty clusters above the last sampled id keep their weight in the denominator (legacy mode)",
            kept_empty
        );
    }

    let retained = 1.0 - excluded;
    if retained <= 0.0 {
        return Err(Error::DegenerateWeights(format!(
            "no weight left after excluding {:.4} of empty clusters",
            excluded
        )));
    }

    Ok((weighted_sum / retained, excluded))
}

/// Partitions `selection` by cluster, scores each non-empty cluster and combines them
pub fn weighted_score(
    assignment: &ClusterAssignment,
    weights: &[f64],
    selection: &[usize],
    predictions: &[Prediction],
    labels: &[usize],
    mass: EmptyClusterMass,
) -> Result<WeightedEstimate> {
    if selection.is_empty() {
        return Err(Error::EmptySelection("cannot score an empty selection".to_string()));
    }
    if weights.len() != assignment.k() {
        return Err(Error::InvalidClustering(format!(
            "{} cluster weights for {} clusters",
            weights.len(),
            assignment.k()
        )));
    }

    if predictions.len() != assignment.len() || labels.len() != assignment.len() {
        return Err(Error::DimensionMismatch {
            expected: format!("{} predictions and labels", assignment.len()),
            actual: format!("{} predictions, {} labels", predictions.len(), labels.len()),
        });
    }
    check_selection(selection, assignment.len())?;

    let mut by_cluster: Vec<Vec<usize>> = vec![Vec::new(); assignment.k()];
    for &i in selection {
        by_cluster[assignment.cluster_of(i)].push(i);
    }

    let per_cluster = by_cluster
        .iter()
        .map(|indices| {
            if indices.is_empty() {
                Ok(None)
            } else {
                score_selection(predictions, labels, indices).map(Some)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let (accuracy, excluded_weight) = combine_weighted(&per_cluster, weights, mass)?;

    Ok(WeightedEstimate { accuracy, excluded_weight, per_cluster })
}
