//! Fold aggregation
//!
//! Collects per-fold metric records and misclassifications in the order folds
//! are produced, then summarizes each metric across folds. Summaries ignore
//! undefined (`NaN`) fold values; a metric undefined in every fold summarizes
//! to `NaN`.

use crate::metrics::evaluate_fold;
use crate::types::{FoldRecord, Label, Metric, MetricStats, MetricSummary, Misclassification};
use serde::{Deserialize, Serialize};

/// Full result of one leave-one-user-out evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LouoReport {
    /// Estimator name
    pub model: String,
    pub folds: Vec<FoldRecord>,
    pub summary: MetricSummary,
    pub misclassifications: Vec<Misclassification>,
    /// Fold indices whose model came from the fallback policy
    pub fallback_folds: Vec<usize>,
}

impl LouoReport {
    pub fn n_folds(&self) -> usize {
        self.folds.len()
    }

    /// Fold values of one metric, in fold order
    pub fn metric_values(&self, metric: Metric) -> Vec<f64> {
        self.folds.iter().map(|r| r.scores().get(metric)).collect()
    }
}

/// Append-only accumulator for fold results
#[derive(Debug, Clone, Default)]
pub struct FoldAggregator {
    records: Vec<FoldRecord>,
    misclassifications: Vec<Misclassification>,
    fallback_folds: Vec<usize>,
}

impl FoldAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score one fold and record it
    pub fn push(
        &mut self,
        fold: usize,
        left_out: &str,
        y_true: &[Label],
        y_pred: &[Label],
        y_score: Option<&[f64]>,
        used_fallback: bool,
    ) -> &FoldRecord {
        let scores = evaluate_fold(y_true, y_pred, y_score);
        self.misclassifications
            .extend(collect_misclassifications(y_true, y_pred, fold, left_out));
        if used_fallback {
            self.fallback_folds.push(fold);
        }
        self.records.push(FoldRecord::new(scores, left_out, fold));
        &self.records[self.records.len() - 1]
    }

    pub fn records(&self) -> &[FoldRecord] {
        &self.records
    }

    pub fn finish(self, model: impl Into<String>) -> LouoReport {
        LouoReport {
            model: model.into(),
            summary: summarize(&self.records),
            folds: self.records,
            misclassifications: self.misclassifications,
            fallback_folds: self.fallback_folds,
        }
    }
}

/// Misclassified test samples of one fold; `index` is the position in the test set
pub fn collect_misclassifications(
    y_true: &[Label],
    y_pred: &[Label],
    fold: usize,
    left_out: &str,
) -> Vec<Misclassification> {
    y_true
        .iter()
        .zip(y_pred)
        .enumerate()
        .filter(|(_, (t, p))| t != p)
        .map(|(index, (&t, &p))| Misclassification {
            fold,
            left_out: left_out.to_string(),
            true_label: t,
            pred: p,
            index,
        })
        .collect()
}

/// Per-metric mean and sample standard deviation across folds
pub fn summarize(records: &[FoldRecord]) -> MetricSummary {
    let stats = |metric: Metric| {
        let values: Vec<f64> = records.iter().map(|r| r.scores().get(metric)).collect();
        metric_stats(&values)
    };
    MetricSummary {
        accuracy: stats(Metric::Accuracy),
        precision_pos: stats(Metric::PrecisionPos),
        recall_pos: stats(Metric::RecallPos),
        f1_pos: stats(Metric::F1Pos),
        roc_auc: stats(Metric::RocAuc),
        n_folds: records.len(),
    }
}

/// NaN-ignoring mean and sample standard deviation (ddof = 1)
pub fn metric_stats(values: &[f64]) -> MetricStats {
    let defined: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    let n = defined.len();
    if n == 0 {
        return MetricStats {
            mean: f64::NAN,
            std: f64::NAN,
            n_defined: 0,
        };
    }
    let mean = defined.iter().sum::<f64>() / n as f64;
    let std = if n < 2 {
        f64::NAN
    } else {
        let ss: f64 = defined.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1) as f64).sqrt()
    };
    MetricStats {
        mean,
        std,
        n_defined: n,
    }
}
