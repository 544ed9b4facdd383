//! Core types for the Synheart TLX evaluation engine
//!
//! This module defines the records that flow out of each stage of a
//! leave-one-user-out run: per-fold metric records, misclassification records,
//! and the aggregate summary.

use serde::{Deserialize, Serialize};

/// Binary workload label (0 = low load, 1 = high load)
pub type Label = u8;

/// The label value representing "High Load"
pub const POSITIVE_LABEL: Label = 1;

/// Metrics reported for every fold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
    PrecisionPos,
    RecallPos,
    F1Pos,
    RocAuc,
}

impl Metric {
    /// All metrics in report column order
    pub const ALL: [Metric; 5] = [
        Metric::Accuracy,
        Metric::PrecisionPos,
        Metric::RecallPos,
        Metric::F1Pos,
        Metric::RocAuc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
            Metric::PrecisionPos => "precision_pos",
            Metric::RecallPos => "recall_pos",
            Metric::F1Pos => "f1_pos",
            Metric::RocAuc => "roc_auc",
        }
    }
}

/// Classification metrics for a single fold
///
/// Undefined values (e.g. ROC-AUC on a single-class fold) are `NaN`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldScores {
    pub accuracy: f64,
    pub precision_pos: f64,
    pub recall_pos: f64,
    pub f1_pos: f64,
    pub roc_auc: f64,
}

impl FoldScores {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Accuracy => self.accuracy,
            Metric::PrecisionPos => self.precision_pos,
            Metric::RecallPos => self.recall_pos,
            Metric::F1Pos => self.f1_pos,
            Metric::RocAuc => self.roc_auc,
        }
    }
}

/// One row of the fold-level metrics table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldRecord {
    pub accuracy: f64,
    pub precision_pos: f64,
    pub recall_pos: f64,
    pub f1_pos: f64,
    pub roc_auc: f64,
    /// Group (participant) held out in this fold
    pub left_out: String,
    /// Sequential fold index starting at 0
    pub fold: usize,
}

impl FoldRecord {
    pub fn new(scores: FoldScores, left_out: impl Into<String>, fold: usize) -> Self {
        Self {
            accuracy: scores.accuracy,
            precision_pos: scores.precision_pos,
            recall_pos: scores.recall_pos,
            f1_pos: scores.f1_pos,
            roc_auc: scores.roc_auc,
            left_out: left_out.into(),
            fold,
        }
    }

    pub fn scores(&self) -> FoldScores {
        FoldScores {
            accuracy: self.accuracy,
            precision_pos: self.precision_pos,
            recall_pos: self.recall_pos,
            f1_pos: self.f1_pos,
            roc_auc: self.roc_auc,
        }
    }
}

/// A single wrongly predicted test sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Misclassification {
    pub fold: usize,
    pub left_out: String,
    #[serde(rename = "true")]
    pub true_label: Label,
    pub pred: Label,
    /// Position of the sample within the fold's test set
    pub index: usize,
}

/// Mean and spread of one metric across folds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    /// Mean over folds where the metric is defined (NaN if none)
    pub mean: f64,
    /// Sample standard deviation (ddof = 1) over defined folds
    pub std: f64,
    /// Number of folds where the metric is defined
    pub n_defined: usize,
}

/// Aggregate summary of a leave-one-user-out run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub accuracy: MetricStats,
    pub precision_pos: MetricStats,
    pub recall_pos: MetricStats,
    pub f1_pos: MetricStats,
    pub roc_auc: MetricStats,
    pub n_folds: usize,
}

impl MetricSummary {
    pub fn stats(&self, metric: Metric) -> MetricStats {
        match metric {
            Metric::Accuracy => self.accuracy,
            Metric::PrecisionPos => self.precision_pos,
            Metric::RecallPos => self.recall_pos,
            Metric::F1Pos => self.f1_pos,
            Metric::RocAuc => self.roc_auc,
        }
    }

    pub fn mean(&self, metric: Metric) -> f64 {
        self.stats(metric).mean
    }

    /// Flat row of means, the shape written to `*_summary.csv`
    pub fn mean_row(&self) -> SummaryRow {
        SummaryRow {
            accuracy: self.accuracy.mean,
            precision_pos: self.precision_pos.mean,
            recall_pos: self.recall_pos.mean,
            f1_pos: self.f1_pos.mean,
            roc_auc: self.roc_auc.mean,
        }
    }
}

/// Summary means as a single table row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub accuracy: f64,
    pub precision_pos: f64,
    pub recall_pos: f64,
    pub f1_pos: f64,
    pub roc_auc: f64,
}

/// Feature importance entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}
