use crate::cluster::ClusterAssignment;
use crate::error::{Error, Result};
use crate::weights::CumulativeTable;
use rand::seq::index::sample;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Selection policy compared by the experiment
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum SamplingPolicy {
    /// uniform without replacement over the whole population
    Random,
    /// stratified draws proportional to cluster weights
    Selective,
}

/// Uniform sampling without replacement of `sample_size` indices in [0, population_size)
pub fn sample_random(population_size: usize, sample_size: usize, rng: &mut ChaCha8Rng) -> Result<Vec<usize>> {
    if sample_size > population_size {
        return Err(Error::InsufficientPopulation { requested: sample_size, available: population_size });
    }
    Ok(sample(rng, population_size, sample_size).into_vec())
}

/// Stratified sampling: each draw picks a cluster through the cumulative
/// table, then an unselected member of that cluster uniformly.
///
/// Draws landing on an exhausted cluster are redrawn. The capacity of the
/// clusters with positive weight is checked first so redrawing always ends.
pub fn sample_selective(
    assignment: &ClusterAssignment,
    table: &CumulativeTable,
    sample_size: usize,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<usize>> {
    if table.k() != assignment.k() {
        return Err(Error::InvalidClustering(format!(
            "{} cluster weights for {} clusters",
            table.k(),
            assignment.k()
        )));
    }

    let mut pools: Vec<Vec<usize>> = (0..assignment.k()).map(|c| assignment.members(c).to_vec()).collect();

    let available: usize = pools
        .iter()
        .enumerate()
        .filter(|(c, _)| table.width(*c) > 0.0)
        .map(|(_, pool)| pool.len())
        .sum();
    if sample_size > available {
        return Err(Error::PopulationExhausted { requested: sample_size, available });
    }

    let mut selection = Vec::with_capacity(sample_size);
    while selection.len() < sample_size {
        let cluster = table.locate(rng.gen::<f64>());
        let pool = &mut pools[cluster];
        if pool.is_empty() {
            continue;
        }
        let pick = rng.gen_range(0..pool.len());
        selection.push(pool.swap_remove(pick));
    }

    Ok(selection)
}

/// Both selection policies over one clustered population
#[derive(Clone, Debug)]
pub struct Sampler<'a> {
    assignment: &'a ClusterAssignment,
    table: CumulativeTable,
}

impl<'a> Sampler<'a> {
    pub fn new(assignment: &'a ClusterAssignment, weights: &[f64]) -> Result<Sampler<'a>> {
        if weights.len() != assignment.k() {
            return Err(Error::InvalidClustering(format!(
                "{} cluster weights for {} clusters",
                weights.len(),
                assignment.k()
            )));
        }
        Ok(Sampler { assignment, table: CumulativeTable::new(weights)? })
    }

    pub fn population_size(&self) -> usize {
        self.assignment.len()
    }

    pub fn assignment(&self) -> &ClusterAssignment {
        self.assignment
    }

    pub fn sample(&self, policy: SamplingPolicy, sample_size: usize, rng: &mut ChaCha8Rng) -> Result<Vec<usize>> {
        match policy {
            SamplingPolicy::Random => sample_random(self.population_size(), sample_size, rng),
            SamplingPolicy::Selective => sample_selective(self.assignment, &self.table, sample_size, rng),
        }
    }
}
