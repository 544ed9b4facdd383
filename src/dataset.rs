//! Modeling dataset
//!
//! A `Dataset` is the featurized modeling table: one row per task session with a
//! participant group key, a binary high-load target, and numeric feature columns.
//! Missing feature values are stored as `NaN`.

use crate::error::{EvalError, Result};
use crate::types::Label;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Default participant column
pub const DEFAULT_GROUP_COLUMN: &str = "participantId";

/// Default binary target column
pub const DEFAULT_TARGET_COLUMN: &str = "High_Load";

/// Default continuous workload score column
pub const DEFAULT_SCORE_COLUMN: &str = "tlx";

/// TLX score above which a session counts as high load
pub const DEFAULT_HIGH_LOAD_THRESHOLD: f64 = 60.0;

/// Metadata columns never treated as features
pub const DEFAULT_DROP_COLUMNS: [&str; 4] = ["participantId", "task_id", "tlx", "High_Load"];

/// Which columns of the modeling table play which role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnSpec {
    /// Group key for leave-one-group-out splitting
    pub group_column: String,
    /// Binary target column
    pub target_column: String,
    /// Explicit feature columns; empty means "every column not dropped"
    pub feature_columns: Vec<String>,
    /// Columns excluded when inferring features
    pub drop_columns: Vec<String>,
    /// Score column used to derive the target when the target column is absent
    pub score_column: Option<String>,
    /// Threshold applied to `score_column` (`score > threshold` is high load)
    pub high_load_threshold: f64,
}

impl Default for ColumnSpec {
    fn default() -> Self {
        Self {
            group_column: DEFAULT_GROUP_COLUMN.to_string(),
            target_column: DEFAULT_TARGET_COLUMN.to_string(),
            feature_columns: Vec::new(),
            drop_columns: DEFAULT_DROP_COLUMNS.iter().map(|c| c.to_string()).collect(),
            score_column: Some(DEFAULT_SCORE_COLUMN.to_string()),
            high_load_threshold: DEFAULT_HIGH_LOAD_THRESHOLD,
        }
    }
}

impl ColumnSpec {
    /// Resolve the feature column list against the table headers
    pub fn resolve_features(&self, headers: &[String]) -> Vec<String> {
        if !self.feature_columns.is_empty() {
            return self.feature_columns.clone();
        }
        let dropped: HashSet<&str> = self
            .drop_columns
            .iter()
            .map(String::as_str)
            .chain([self.group_column.as_str(), self.target_column.as_str()])
            .chain(self.score_column.as_deref())
            .collect();
        headers
            .iter()
            .filter(|h| !dropped.contains(h.as_str()))
            .cloned()
            .collect()
    }
}

/// Row-major numeric feature matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    values: Vec<f64>,
    n_rows: usize,
    n_features: usize,
}

impl FeatureMatrix {
    /// Build from flat row-major storage
    pub fn new(values: Vec<f64>, n_rows: usize, n_features: usize) -> Result<Self> {
        if values.len() != n_rows * n_features {
            return Err(EvalError::InvalidInput(format!(
                "feature storage has {} values, expected {} rows x {} features",
                values.len(),
                n_rows,
                n_features
            )));
        }
        Ok(Self {
            values,
            n_rows,
            n_features,
        })
    }

    /// Build from per-row vectors (all rows must have the same width)
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_features = rows.first().map_or(0, Vec::len);
        let mut values = Vec::with_capacity(rows.len() * n_features);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_features {
                return Err(EvalError::InvalidInput(format!(
                    "row {} has {} features, expected {}",
                    i,
                    row.len(),
                    n_features
                )));
            }
            values.extend_from_slice(row);
        }
        Self::new(values, rows.len(), n_features)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.n_features..(i + 1) * self.n_features]
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.n_features + col]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.n_rows).map(move |i| self.row(i))
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.n_rows).map(|i| self.get(i, col)).collect()
    }

    /// Copy the given rows (in the given order) into a new matrix
    pub fn select_rows(&self, indices: &[usize]) -> FeatureMatrix {
        let mut values = Vec::with_capacity(indices.len() * self.n_features);
        for &i in indices {
            values.extend_from_slice(self.row(i));
        }
        FeatureMatrix {
            values,
            n_rows: indices.len(),
            n_features: self.n_features,
        }
    }

    /// Apply `f(col, value)` to every cell, producing a new matrix
    pub fn map_cells<F>(&self, f: F) -> FeatureMatrix
    where
        F: Fn(usize, f64) -> f64,
    {
        let values = self
            .values
            .iter()
            .enumerate()
            .map(|(i, &v)| f(i % self.n_features.max(1), v))
            .collect();
        FeatureMatrix {
            values,
            n_rows: self.n_rows,
            n_features: self.n_features,
        }
    }

    pub fn has_non_finite(&self) -> bool {
        self.values.iter().any(|v| !v.is_finite())
    }
}

/// The modeling table restricted to what the evaluation engine consumes
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    feature_names: Vec<String>,
    features: FeatureMatrix,
    labels: Vec<Label>,
    groups: Vec<String>,
}

impl Dataset {
    pub fn new(
        feature_names: Vec<String>,
        features: FeatureMatrix,
        labels: Vec<Label>,
        groups: Vec<String>,
    ) -> Result<Self> {
        if features.is_empty() {
            return Err(EvalError::InvalidInput("dataset has no rows".into()));
        }
        if feature_names.is_empty() {
            return Err(EvalError::InvalidInput("dataset has no feature columns".into()));
        }
        if feature_names.len() != features.n_features() {
            return Err(EvalError::InvalidInput(format!(
                "{} feature names for {} feature columns",
                feature_names.len(),
                features.n_features()
            )));
        }
        if labels.len() != features.n_rows() || groups.len() != features.n_rows() {
            return Err(EvalError::InvalidInput(format!(
                "row count mismatch: {} feature rows, {} labels, {} groups",
                features.n_rows(),
                labels.len(),
                groups.len()
            )));
        }
        if let Some(row) = labels.iter().position(|&l| l > 1) {
            return Err(EvalError::InvalidLabel {
                row,
                value: labels[row].to_string(),
            });
        }
        Ok(Self {
            feature_names,
            features,
            labels,
            groups,
        })
    }

    /// Load the modeling table from a CSV file
    pub fn from_csv_path(path: impl AsRef<Path>, spec: &ColumnSpec) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            EvalError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        Self::from_csv_reader(file, spec)
    }

    /// Load the modeling table from any CSV source
    ///
    /// Feature cells that are empty or non-numeric become `NaN`. When the target
    /// column is absent, the target is derived as `score > high_load_threshold`.
    pub fn from_csv_reader<R: Read>(reader: R, spec: &ColumnSpec) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let position = |name: &str| headers.iter().position(|h| h == name);

        let group_idx = position(&spec.group_column)
            .ok_or_else(|| EvalError::MissingColumn(spec.group_column.clone()))?;
        let target = match position(&spec.target_column) {
            Some(idx) => TargetSource::Label(idx),
            None => {
                let score_name = spec
                    .score_column
                    .as_deref()
                    .ok_or_else(|| EvalError::MissingColumn(spec.target_column.clone()))?;
                let idx = position(score_name)
                    .ok_or_else(|| EvalError::MissingColumn(spec.target_column.clone()))?;
                TargetSource::Threshold(idx, spec.high_load_threshold)
            }
        };

        let feature_names = spec.resolve_features(&headers);
        let feature_idx: Vec<usize> = feature_names
            .iter()
            .map(|name| position(name).ok_or_else(|| EvalError::MissingColumn(name.clone())))
            .collect::<Result<_>>()?;

        let mut values = Vec::new();
        let mut labels = Vec::new();
        let mut groups = Vec::new();

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let group = field(&record, group_idx);
            if group.is_empty() {
                return Err(EvalError::InvalidInput(format!(
                    "row {} has an empty {}",
                    row, spec.group_column
                )));
            }
            groups.push(group.to_string());
            labels.push(target.label(&record, row)?);
            values.extend(feature_idx.iter().map(|&i| coerce_numeric(field(&record, i))));
        }

        let n_rows = labels.len();
        let features = FeatureMatrix::new(values, n_rows, feature_names.len())?;
        Self::new(feature_names, features, labels, groups)
    }

    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Number of distinct group values
    pub fn n_groups(&self) -> usize {
        self.groups.iter().collect::<HashSet<_>>().len()
    }

    /// Feature rows and labels for a set of row indices
    pub fn select(&self, indices: &[usize]) -> (FeatureMatrix, Vec<Label>) {
        let x = self.features.select_rows(indices);
        let y = indices.iter().map(|&i| self.labels[i]).collect();
        (x, y)
    }
}

enum TargetSource {
    Label(usize),
    Threshold(usize, f64),
}

impl TargetSource {
    fn label(&self, record: &StringRecord, row: usize) -> Result<Label> {
        match *self {
            TargetSource::Label(idx) => {
                let raw = field(record, idx);
                parse_label(raw).ok_or_else(|| EvalError::InvalidLabel {
                    row,
                    value: raw.to_string(),
                })
            }
            TargetSource::Threshold(idx, threshold) => {
                let raw = field(record, idx);
                let score = coerce_numeric(raw);
                if score.is_nan() {
                    return Err(EvalError::InvalidLabel {
                        row,
                        value: raw.to_string(),
                    });
                }
                Ok(Label::from(score > threshold))
            }
        }
    }
}

fn field(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("")
}

/// Parse a numeric cell; anything unparsable or non-finite is missing
pub fn coerce_numeric(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(f64::NAN)
}

/// Parse a binary target cell
pub fn parse_label(raw: &str) -> Option<Label> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Some(1),
        "0" | "0.0" | "false" => Some(0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE_CSV: &str = "\
participantId,task_id,tlx,High_Load,click_rate,dwell_ms
P1,form,72.5,1,0.8,1200
P1,travel,40.0,0,0.2,
P2,form,65.0,1,n/a,900
P2,product,20.0,0,0.1,300
";

    #[test]
    fn test_load_csv_infers_features() {
        let ds = Dataset::from_csv_reader(SAMPLE_CSV.as_bytes(), &ColumnSpec::default()).unwrap();
        assert_eq!(ds.n_rows(), 4);
        assert_eq!(ds.feature_names(), &["click_rate".to_string(), "dwell_ms".to_string()]);
        assert_eq!(ds.labels(), &[1, 0, 1, 0]);
        assert_eq!(ds.groups(), &["P1", "P1", "P2", "P2"]);
        assert_eq!(ds.n_groups(), 2);
    }

    #[test]
    fn test_non_numeric_cells_become_missing() {
        let ds = Dataset::from_csv_reader(SAMPLE_CSV.as_bytes(), &ColumnSpec::default()).unwrap();
        assert!(ds.features().get(1, 1).is_nan());
        assert!(ds.features().get(2, 0).is_nan());
        assert_eq!(ds.features().get(3, 1), 300.0);
    }

    #[test]
    fn test_target_derived_from_tlx_when_absent() {
        let csv = "participantId,tlx,x\nA,61,1\nA,60,2\nB,90,3\n";
        let ds = Dataset::from_csv_reader(csv.as_bytes(), &ColumnSpec::default()).unwrap();
        assert_eq!(ds.labels(), &[1, 0, 1]);
        assert_eq!(ds.feature_names(), &["x".to_string()]);
    }

    #[test]
    fn test_missing_group_column_is_error() {
        let csv = "user,High_Load,x\nA,1,1\n";
        let err = Dataset::from_csv_reader(csv.as_bytes(), &ColumnSpec::default()).unwrap_err();
        assert!(matches!(err, EvalError::MissingColumn(c) if c == "participantId"));
    }

    #[test]
    fn test_explicit_missing_feature_is_error() {
        let spec = ColumnSpec {
            feature_columns: vec!["nope".to_string()],
            ..ColumnSpec::default()
        };
        let err = Dataset::from_csv_reader(SAMPLE_CSV.as_bytes(), &spec).unwrap_err();
        assert!(matches!(err, EvalError::MissingColumn(c) if c == "nope"));
    }

    #[test]
    fn test_invalid_label_is_error() {
        let csv = "participantId,High_Load,x\nA,maybe,1\n";
        let err = Dataset::from_csv_reader(csv.as_bytes(), &ColumnSpec::default()).unwrap_err();
        assert!(matches!(err, EvalError::InvalidLabel { row: 0, .. }));
    }

    #[test]
    fn test_parse_label_variants() {
        assert_eq!(parse_label("True"), Some(1));
        assert_eq!(parse_label("0.0"), Some(0));
        assert_eq!(parse_label(" 1 "), Some(1));
        assert_eq!(parse_label("2"), None);
    }

    #[test]
    fn test_select_rows_preserves_order() {
        let m = FeatureMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        let s = m.select_rows(&[2, 0]);
        assert_eq!(s.values(), &[5.0, 6.0, 1.0, 2.0]);
        assert_eq!(s.n_rows(), 2);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        assert!(FeatureMatrix::from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
