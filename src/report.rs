//! Result persistence
//!
//! Tables are written as CSV with a header row (also when empty), structured
//! artifacts as pretty-printed JSON. Undefined metric values are written as
//! `NaN` in CSV and `null` in JSON.

use crate::aggregate::LouoReport;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::types::{FeatureImportance, FoldRecord, Misclassification};
use crate::{PRODUCER_NAME, VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const FOLD_METRICS_HEADER: [&str; 7] = [
    "accuracy",
    "precision_pos",
    "recall_pos",
    "f1_pos",
    "roc_auc",
    "left_out",
    "fold",
];

pub const MISCLASSIFICATION_HEADER: [&str; 5] = ["fold", "left_out", "true", "pred", "index"];

pub const IMPORTANCE_HEADER: [&str; 2] = ["feature", "importance"];

pub const BEST_PARAMS_FILE: &str = "rf_best_params.json";
pub const FEATURE_IMPORTANCES_FILE: &str = "feature_importances.csv";
pub const MODEL_FILE: &str = "tuned_random_forest_model.json";
pub const MANIFEST_FILE: &str = "run_manifest.json";

/// Serialize `rows` to CSV; an empty slice still produces `header`
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T], header: &[&str]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    if rows.is_empty() {
        writer.write_record(header)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn write_fold_metrics(path: &Path, records: &[FoldRecord]) -> Result<()> {
    write_csv(path, records, &FOLD_METRICS_HEADER)
}

pub fn write_misclassifications(path: &Path, records: &[Misclassification]) -> Result<()> {
    write_csv(path, records, &MISCLASSIFICATION_HEADER)
}

pub fn write_feature_importances(path: &Path, importances: &[FeatureImportance]) -> Result<()> {
    write_csv(path, importances, &IMPORTANCE_HEADER)
}

/// Read back a fold metrics table
pub fn read_fold_metrics(path: &Path) -> Result<Vec<FoldRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut out = Vec::new();
    for row in reader.deserialize() {
        out.push(row?);
    }
    Ok(out)
}

/// Writes result files into one output directory, tracking what was written
#[derive(Debug)]
pub struct ReportWriter {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl ReportWriter {
    /// Creates the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            written: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn target(&mut self, file_name: &str) -> PathBuf {
        let path = self.dir.join(file_name);
        self.written.push(path.clone());
        path
    }

    /// `{prefix}_fold_metrics.csv` and `{prefix}_summary.csv`
    pub fn louo_report(&mut self, prefix: &str, report: &LouoReport) -> Result<()> {
        let folds = self.target(&format!("{prefix}_fold_metrics.csv"));
        write_fold_metrics(&folds, &report.folds)?;
        let summary = self.target(&format!("{prefix}_summary.csv"));
        write_csv(&summary, &[report.summary.mean_row()], &FOLD_METRICS_HEADER[..5])
    }

    /// `{prefix}_misclassifications.csv`
    pub fn misclassifications(&mut self, prefix: &str, report: &LouoReport) -> Result<()> {
        let path = self.target(&format!("{prefix}_misclassifications.csv"));
        write_misclassifications(&path, &report.misclassifications)
    }

    pub fn feature_importances(&mut self, importances: &[FeatureImportance]) -> Result<()> {
        let path = self.target(FEATURE_IMPORTANCES_FILE);
        write_feature_importances(&path, importances)
    }

    pub fn json<T: Serialize + ?Sized>(&mut self, file_name: &str, value: &T) -> Result<()> {
        let path = self.target(file_name);
        write_json(&path, value)
    }

    /// Write the manifest listing every file written so far
    pub fn manifest(&mut self, mut manifest: RunManifest) -> Result<RunManifest> {
        manifest.files = self
            .written
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        let path = self.target(MANIFEST_FILE);
        write_json(&path, &manifest)?;
        Ok(manifest)
    }
}

/// Provenance record for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub producer: String,
    pub version: String,
    pub command: String,
    pub n_rows: usize,
    pub n_features: usize,
    pub n_groups: usize,
    pub files: Vec<String>,
}

impl RunManifest {
    pub fn new(command: impl Into<String>, dataset: &Dataset) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            producer: PRODUCER_NAME.to_string(),
            version: VERSION.to_string(),
            command: command.into(),
            n_rows: dataset.n_rows(),
            n_features: dataset.feature_names().len(),
            n_groups: dataset.n_groups(),
            files: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::FoldAggregator;
    use crate::dataset::FeatureMatrix;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn report() -> LouoReport {
        let mut agg = FoldAggregator::new();
        agg.push(0, "1", &[0, 1], &[0, 0], Some(&[0.1, 0.3]), false);
        agg.push(1, "2", &[1, 1], &[1, 1], None, false);
        agg.finish("rf")
    }

    #[test]
    fn test_fold_metrics_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("folds.csv");
        let report = report();
        write_fold_metrics(&path, &report.folds).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.lines().next().unwrap(),
            "accuracy,precision_pos,recall_pos,f1_pos,roc_auc,left_out,fold"
        );

        let back = read_fold_metrics(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].left_out, "1");
        assert!(back[1].roc_auc.is_nan());
    }

    #[test]
    fn test_empty_misclassifications_keep_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mis.csv");
        write_misclassifications(&path, &[]).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap().trim(),
            "fold,left_out,true,pred,index"
        );
    }

    #[test]
    fn test_writer_outputs_and_manifest() {
        let dir = TempDir::new().unwrap();
        let mut writer = ReportWriter::new(dir.path().join("out")).unwrap();
        let report = report();
        writer.louo_report("rf", &report).unwrap();
        writer.misclassifications("rf", &report).unwrap();

        let summary = fs::read_to_string(dir.path().join("out/rf_summary.csv")).unwrap();
        let mut lines = summary.lines();
        assert_eq!(
            lines.next().unwrap(),
            "accuracy,precision_pos,recall_pos,f1_pos,roc_auc"
        );
        assert_eq!(lines.next().unwrap(), "0.75,0.5,0.5,0.5,1.0");

        let mis = fs::read_to_string(dir.path().join("out/rf_misclassifications.csv")).unwrap();
        assert_eq!(mis.lines().nth(1).unwrap(), "0,1,1,0,1");

        let ds = Dataset::new(
            vec!["a".into()],
            FeatureMatrix::new(vec![0.0, 1.0], 2, 1).unwrap(),
            vec![0, 1],
            vec!["1".into(), "2".into()],
        )
        .unwrap();
        let manifest = writer.manifest(RunManifest::new("train", &ds)).unwrap();
        assert_eq!(
            manifest.files,
            vec![
                "rf_fold_metrics.csv".to_string(),
                "rf_summary.csv".to_string(),
                "rf_misclassifications.csv".to_string(),
            ]
        );
        assert_eq!(manifest.n_groups, 2);
        let json = fs::read_to_string(dir.path().join("out").join(MANIFEST_FILE)).unwrap();
        let back: RunManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, manifest);
    }
}
