use crate::data::FeatureSet;
use crate::error::{Error, Result};
use log::{debug, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// How the operational representation space is partitioned
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[allow(non_camel_case_types)]
pub enum ClusteringMethod {
    /// k-means fitted on the operational vectors
    kmeans,
    /// cluster ids read from the operational file
    precomputed,
}

//-----------------------------------------------------------------------------
// Cluster assignment
//-----------------------------------------------------------------------------

/// Cluster id of every population index, with member pools per cluster.
///
/// Clusters that received no member keep their slot so that ids stay valid
/// indices into weight vectors.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClusterAssignment {
    labels: Vec<usize>,
    members: Vec<Vec<usize>>,
}

impl ClusterAssignment {
    pub fn new(labels: Vec<usize>, k: usize) -> Result<ClusterAssignment> {
        if k == 0 {
            return Err(Error::InvalidClustering("cluster count must be positive".to_string()));
        }
        if labels.is_empty() {
            return Err(Error::InvalidClustering("population is empty".to_string()));
        }

        let mut members = vec![Vec::new(); k];
        for (i, &c) in labels.iter().enumerate() {
            if c >= k {
                return Err(Error::InvalidClustering(format!(
                    "sample {} assigned to cluster {} but only {} clusters exist",
                    i, c, k
                )));
            }
            members[c].push(i);
        }

        Ok(ClusterAssignment { labels, members })
    }

    pub fn k(&self) -> usize {
        self.members.len()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn cluster_of(&self, i: usize) -> usize {
        self.labels[i]
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn members(&self, cluster: usize) -> &[usize] {
        &self.members[cluster]
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.members.iter().map(|m| m.len()).collect()
    }
}

/// Default cluster count: one cluster per class, capped
pub fn default_cluster_count(num_classes: usize, max_clusters: usize) -> usize {
    num_classes.min(max_clusters)
}

//-----------------------------------------------------------------------------
// Clusterers
//-----------------------------------------------------------------------------

/// Partitions a FeatureSet into `k` clusters; a given input and rng state
/// always yields the same assignment.
pub trait Clusterer: Send + Sync {
    fn fit(&self, features: &FeatureSet, k: usize, rng: &mut ChaCha8Rng) -> Result<ClusterAssignment>;
}

/// Cluster ids computed upstream
pub struct PrecomputedClusters {
    pub labels: Vec<usize>,
}

impl Clusterer for PrecomputedClusters {
    fn fit(&self, features: &FeatureSet, k: usize, _rng: &mut ChaCha8Rng) -> Result<ClusterAssignment> {
        if self.labels.len() != features.len() {
            return Err(Error::DimensionMismatch {
                expected: format!("{} cluster ids", features.len()),
                actual: format!("{}", self.labels.len()),
            });
        }
        ClusterAssignment::new(self.labels.clone(), k)
    }
}

/// Lloyd's k-means with k-means++ seeding
#[derive(Clone, Debug)]
pub struct KMeans {
    pub max_iter: usize,
    /// relative to the mean per-dimension variance of the data
    pub tolerance: f64,
}

impl Default for KMeans {
    fn default() -> Self {
        KMeans { max_iter: 300, tolerance: 1e-4 }
    }
}

impl Clusterer for KMeans {
    fn fit(&self, features: &FeatureSet, k: usize, rng: &mut ChaCha8Rng) -> Result<ClusterAssignment> {
        if k == 0 {
            return Err(Error::InvalidClustering("cluster count must be positive".to_string()));
        }
        if k > features.len() {
            return Err(Error::InvalidClustering(format!(
                "{} clusters requested for {} samples",
                k,
                features.len()
            )));
        }

        let dim = features.dim();
        let threshold = self.tolerance * mean_dimension_variance(features);
        let mut centroids = init_plus_plus(features, k, rng);
        let mut labels = assign(features, &centroids);

        let mut iteration = 0;
        while iteration < self.max_iter {
            iteration += 1;

            let updated = update_centroids(features, &labels, &centroids);
            let shift: f64 = centroids
                .chunks_exact(dim)
                .zip(updated.chunks_exact(dim))
                .map(|(a, b)| squared_distance(a, b))
                .sum();
            centroids = updated;

            let new_labels = assign(features, &centroids);
            let stable = new_labels == labels;
            labels = new_labels;

            if stable || shift <= threshold {
                break;
            }
        }

        if iteration == self.max_iter {
            warn!("k-means stopped after {} iterations without converging", self.max_iter);
        }
        debug!("k-means converged in {} iterations, inertia {:.4}", iteration, inertia(features, &centroids, &labels));

        ClusterAssignment::new(labels, k)
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn mean_dimension_variance(features: &FeatureSet) -> f64 {
    let n = features.len() as f64;
    let dim = features.dim();
    let mut mean = vec![0.0; dim];
    for v in features.vectors() {
        for (m, x) in mean.iter_mut().zip(v) {
            *m += x / n;
        }
    }
    let total: f64 = features.vectors().map(|v| squared_distance(v, &mean)).sum();
    total / n / dim as f64
}

/// Flat centroid buffer (k * dim) seeded by D² sampling
fn init_plus_plus(features: &FeatureSet, k: usize, rng: &mut ChaCha8Rng) -> Vec<f64> {
    let n = features.len();
    let mut centroids = Vec::with_capacity(k * features.dim());
    centroids.extend_from_slice(features.vector(rng.gen_range(0..n)));

    let mut closest: Vec<f64> = features.vectors().map(|v| squared_distance(v, &centroids)).collect();

    for _ in 1..k {
        // all points already sit on a centroid when every distance is zero
        let next = match WeightedIndex::new(&closest) {
            Ok(dist) => dist.sample(rng),
            Err(_) => rng.gen_range(0..n),
        };
        let chosen = features.vector(next).to_vec();
        for (d, v) in closest.iter_mut().zip(features.vectors()) {
            *d = d.min(squared_distance(v, &chosen));
        }
        centroids.extend(chosen);
    }

    centroids
}

fn nearest(vector: &[f64], centroids: &[f64]) -> usize {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.chunks_exact(vector.len()).enumerate() {
        let d = squared_distance(vector, centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best.0
}

fn assign(features: &FeatureSet, centroids: &[f64]) -> Vec<usize> {
    (0..features.len())
        .into_par_iter()
        .map(|i| nearest(features.vector(i), centroids))
        .collect()
}

/// Recomputes centroids as member means; a cluster left empty keeps its previous centroid
fn update_centroids(features: &FeatureSet, labels: &[usize], previous: &[f64]) -> Vec<f64> {
    let dim = features.dim();
    let k = previous.len() / dim;
    let mut sums = vec![0.0; k * dim];
    let mut counts = vec![0usize; k];

    for (v, &c) in features.vectors().zip(labels) {
        counts[c] += 1;
        for (s, x) in sums[c * dim..(c + 1) * dim].iter_mut().zip(v) {
            *s += x;
        }
    }

    for c in 0..k {
        let slot = &mut sums[c * dim..(c + 1) * dim];
        if counts[c] == 0 {
            slot.copy_from_slice(&previous[c * dim..(c + 1) * dim]);
        } else {
            for s in slot.iter_mut() {
                *s /= counts[c] as f64;
            }
        }
    }
    sums
}

fn inertia(features: &FeatureSet, centroids: &[f64], labels: &[usize]) -> f64 {
    let dim = features.dim();
    features
        .vectors()
        .zip(labels)
        .map(|(v, &c)| squared_distance(v, &centroids[c * dim..(c + 1) * dim]))
        .sum()
}
