use crate::error::{Error, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub const LABEL_COLUMN: &str = "label";
pub const PREDICTION_COLUMN: &str = "prediction";
pub const CONFIDENCE_COLUMN: &str = "confidence";
pub const CLUSTER_COLUMN: &str = "cluster";

/// Representation-space vectors and their ground-truth labels.
///
/// Vectors are stored row-major in one buffer whose shape is validated at
/// construction, so every `vector(i)` has exactly `dim()` values.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureSet {
    values: Vec<f64>,
    labels: Vec<usize>,
    dim: usize,
}

impl FeatureSet {
    /// Builds a FeatureSet from one vector per sample.
    pub fn new(vectors: Vec<Vec<f64>>, labels: Vec<usize>) -> Result<FeatureSet> {
        let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dim) {
            return Err(Error::DimensionMismatch {
                expected: format!("vectors of length {}", dim),
                actual: format!("length {} at sample {}", v.len(), i),
            });
        }
        let values = vectors.into_iter().flatten().collect();
        FeatureSet::from_flat(values, dim, labels)
    }

    /// Builds a FeatureSet from a row-major buffer of `labels.len() * dim` values.
    pub fn from_flat(values: Vec<f64>, dim: usize, labels: Vec<usize>) -> Result<FeatureSet> {
        if labels.is_empty() {
            return Err(Error::EmptySelection("feature set has no samples".to_string()));
        }
        if dim == 0 {
            return Err(Error::DimensionMismatch {
                expected: "vectors with at least one dimension".to_string(),
                actual: "0".to_string(),
            });
        }
        if values.len() != labels.len() * dim {
            return Err(Error::DimensionMismatch {
                expected: format!("{} values ({} samples x {})", labels.len() * dim, labels.len(), dim),
                actual: format!("{} values", values.len()),
            });
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidData(format!("non finite value in sample {}", pos / dim)));
        }

        Ok(FeatureSet { values, labels, dim })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn vector(&self, i: usize) -> &[f64] {
        &self.values[i * self.dim..(i + 1) * self.dim]
    }

    pub fn vectors(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks_exact(self.dim)
    }

    pub fn label(&self, i: usize) -> usize {
        self.labels[i]
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Number of classes seen, i.e. largest label + 1
    pub fn num_classes(&self) -> usize {
        self.labels.iter().max().map(|m| m + 1).unwrap_or(0)
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Samples: {}   Dimension: {}   Classes: {}", self.len(), self.dim, self.num_classes())?;

        for (i, vector) in self.vectors().enumerate().take(5) {
            let row = vector
                .iter()
                .map(|v| format!("{:.2}", v))
                .collect::<Vec<_>>()
                .join("\t");
            let truncated_row = if row.len() > 80 { format!("{}...", &row[..77]) } else { row };
            writeln!(f, "{:<6} {:<6} {}", i, self.labels[i], truncated_row)?;
        }
        if self.len() > 5 {
            writeln!(f, "...")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Classifier output for one sample
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub label: usize,
    pub confidence: f64,
}

impl Prediction {
    pub fn new(label: usize, confidence: f64) -> Prediction {
        Prediction { label, confidence }
    }

    pub fn is_correct(&self, truth: usize) -> bool {
        self.label == truth
    }
}

/// Operational set as read from disk: features, and whatever upstream
/// collaborators already computed for them (predictions, cluster ids).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OperationalData {
    pub features: FeatureSet,
    pub predictions: Option<Vec<Prediction>>,
    pub clusters: Option<Vec<usize>>,
}

impl OperationalData {
    pub fn new(features: FeatureSet) -> OperationalData {
        OperationalData { features, predictions: None, clusters: None }
    }

    /// Loads a delimited file with a header line.
    ///
    /// The `label` column is required; `prediction`, `confidence` and
    /// `cluster` are optional; every other column is a feature dimension.
    pub fn load<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<OperationalData> {
        let path = path.as_ref();
        info!("Loading file {}...", path.display());

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let position = |name: &str| headers.iter().position(|h| h == name);

        let label_col = position(LABEL_COLUMN)
            .ok_or_else(|| Error::InvalidData(format!("{}: missing '{}' column", path.display(), LABEL_COLUMN)))?;
        let prediction_col = position(PREDICTION_COLUMN);
        let confidence_col = position(CONFIDENCE_COLUMN);
        let cluster_col = position(CLUSTER_COLUMN);

        let feature_cols: Vec<usize> = (0..headers.len())
            .filter(|c| Some(*c) != Some(label_col) && Some(*c) != prediction_col && Some(*c) != confidence_col && Some(*c) != cluster_col)
            .collect();
        debug!("{} feature columns found in {}", feature_cols.len(), path.display());

        let mut values = Vec::new();
        let mut labels = Vec::new();
        let mut predictions = Vec::new();
        let mut clusters = Vec::new();

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let line = row + 2;
            let field = |col: usize| record.get(col).unwrap_or("");

            labels.push(parse_class_id(field(label_col), line, LABEL_COLUMN)?);

            for &col in &feature_cols {
                let value: f64 = field(col).parse().map_err(|_| {
                    Error::InvalidData(format!("line {}: '{}' is not a number (column {})", line, field(col), &headers[col]))
                })?;
                values.push(value);
            }

            if let Some(col) = prediction_col {
                let label = parse_class_id(field(col), line, PREDICTION_COLUMN)?;
                let confidence = match confidence_col {
                    Some(c) => field(c).parse().map_err(|_| {
                        Error::InvalidData(format!("line {}: '{}' is not a confidence", line, field(c)))
                    })?,
                    None => 1.0,
                };
                predictions.push(Prediction::new(label, confidence));
            }

            if let Some(col) = cluster_col {
                clusters.push(parse_class_id(field(col), line, CLUSTER_COLUMN)?);
            }
        }

        let features = FeatureSet::from_flat(values, feature_cols.len(), labels)?;

        Ok(OperationalData {
            features,
            predictions: prediction_col.map(|_| predictions),
            clusters: cluster_col.map(|_| clusters),
        })
    }
}

/// Parses a class or cluster id; integral floats such as `3.0` are accepted
fn parse_class_id(raw: &str, line: usize, column: &str) -> Result<usize> {
    if let Ok(id) = raw.parse::<usize>() {
        return Ok(id);
    }
    match raw.parse::<f64>() {
        Ok(v) if v >= 0.0 && v.fract() == 0.0 && v.is_finite() => Ok(v as usize),
        _ => Err(Error::InvalidData(format!("line {}: '{}' is not a valid {}", line, raw, column))),
    }
}

/// Parses the `delimiter` parameter: a single character or `\t`
pub fn delimiter_byte(raw: &str) -> Result<u8> {
    match raw {
        "\\t" | "\t" | "tab" => Ok(b'\t'),
        s if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        s => Err(Error::InvalidParam(format!("delimiter must be a single ASCII character, got '{}'", s))),
    }
}
