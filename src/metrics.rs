//! Single-fold classification metrics
//!
//! All metrics are computed for the positive ("High Load") class. Precision,
//! recall and F1 follow a zero-division-is-zero policy; ROC-AUC is only defined
//! when both classes occur in the true labels and is `NaN` otherwise.

use crate::error::{EvalError, Result};
use crate::types::{FoldScores, Label, POSITIVE_LABEL};

/// 2x2 confusion counts for the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinaryConfusion {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl BinaryConfusion {
    /// Count outcomes pairwise
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::InvalidInput`] when the slices differ in length.
    pub fn from_labels(y_true: &[Label], y_pred: &[Label]) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(EvalError::InvalidInput(format!(
                "labels length {} != predictions length {}",
                y_true.len(),
                y_pred.len()
            )));
        }
        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t == POSITIVE_LABEL, p == POSITIVE_LABEL) {
                (true, true) => cm.tp += 1,
                (false, true) => cm.fp += 1,
                (false, false) => cm.tn += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        Ok(cm)
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// `TP / (TP + FP)`, 0.0 when nothing was predicted positive
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// `TP / (TP + FN)`, 0.0 when there are no positives
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

/// Compute the fixed metric record for one fold
///
/// `y_score` is a continuous score where larger means "more likely positive"
/// (a probability or a decision margin). Without it, or when `y_true` holds a
/// single class, `roc_auc` is `NaN`. Mismatched `y_true`/`y_pred` lengths
/// leave every metric undefined (`NaN`).
pub fn evaluate_fold(y_true: &[Label], y_pred: &[Label], y_score: Option<&[f64]>) -> FoldScores {
    let Ok(cm) = BinaryConfusion::from_labels(y_true, y_pred) else {
        return FoldScores {
            accuracy: f64::NAN,
            precision_pos: f64::NAN,
            recall_pos: f64::NAN,
            f1_pos: f64::NAN,
            roc_auc: f64::NAN,
        };
    };
    let roc_auc = match y_score {
        Some(scores) if has_both_classes(y_true) => roc_auc(y_true, scores).unwrap_or(f64::NAN),
        _ => f64::NAN,
    };

    FoldScores {
        accuracy: cm.accuracy(),
        precision_pos: cm.precision(),
        recall_pos: cm.recall(),
        f1_pos: cm.f1(),
        roc_auc,
    }
}

/// Whether both the positive and the negative class occur
pub fn has_both_classes(labels: &[Label]) -> bool {
    let positives = labels.iter().filter(|&&l| l == POSITIVE_LABEL).count();
    positives > 0 && positives < labels.len()
}

/// Area under the ROC curve via the tie-aware rank statistic
///
/// Equals the trapezoidal ROC area: tied scores contribute half a concordant
/// pair.
///
/// # Errors
///
/// Returns an error on length mismatch, non-finite scores, or when either
/// class is absent.
pub fn roc_auc(y_true: &[Label], scores: &[f64]) -> Result<f64> {
    if y_true.len() != scores.len() {
        return Err(EvalError::InvalidInput(format!(
            "labels length {} != scores length {}",
            y_true.len(),
            scores.len()
        )));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(EvalError::InvalidInput("non-finite score".into()));
    }

    let n_pos = y_true.iter().filter(|&&l| l == POSITIVE_LABEL).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(EvalError::InvalidInput(
            "ROC-AUC needs both classes present".into(),
        ));
    }

    let ranks = average_ranks(scores);
    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(y_true)
        .filter(|(_, &l)| l == POSITIVE_LABEL)
        .map(|(r, _)| r)
        .sum();

    let n_pos_f = n_pos as f64;
    let u = pos_rank_sum - n_pos_f * (n_pos_f + 1.0) / 2.0;
    Ok(u / (n_pos_f * n_neg as f64))
}

/// 1-based ranks with ties assigned their average rank
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // positions i..=j share the mean of ranks i+1..=j+1
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perfect_predictions() {
        let y = [0, 1, 0, 1];
        let m = evaluate_fold(&y, &y, Some(&[0.1, 0.9, 0.2, 0.8]));
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.precision_pos, 1.0);
        assert_eq!(m.recall_pos, 1.0);
        assert_eq!(m.f1_pos, 1.0);
        assert_eq!(m.roc_auc, 1.0);
    }

    #[test]
    fn test_zero_division_policy() {
        // positive class never predicted
        let m = evaluate_fold(&[1, 0, 1], &[0, 0, 0], None);
        assert_relative_eq!(m.accuracy, 1.0 / 3.0);
        assert_eq!(m.precision_pos, 0.0);
        assert_eq!(m.recall_pos, 0.0);
        assert_eq!(m.f1_pos, 0.0);
        assert!(m.roc_auc.is_nan());
    }

    #[test]
    fn test_no_positives_in_truth() {
        let m = evaluate_fold(&[0, 0, 0], &[0, 1, 0], Some(&[0.2, 0.7, 0.1]));
        assert_eq!(m.precision_pos, 0.0);
        assert_eq!(m.recall_pos, 0.0);
        assert_eq!(m.f1_pos, 0.0);
        assert!(m.roc_auc.is_nan(), "single-class fold must have undefined AUC");
    }

    #[test]
    fn test_mixed_metrics() {
        // tp=2 fp=1 fn=1 tn=1
        let y_true = [1, 1, 1, 0, 0];
        let y_pred = [1, 1, 0, 1, 0];
        let m = evaluate_fold(&y_true, &y_pred, None);
        assert_relative_eq!(m.accuracy, 0.6);
        assert_relative_eq!(m.precision_pos, 2.0 / 3.0);
        assert_relative_eq!(m.recall_pos, 2.0 / 3.0);
        assert_relative_eq!(m.f1_pos, 2.0 / 3.0);
    }

    #[test]
    fn test_auc_known_value() {
        // pairs: (0.35 vs 0.1)=1, (0.35 vs 0.4)=0, (0.8 vs 0.1)=1, (0.8 vs 0.4)=1 → 3/4
        let auc = roc_auc(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]).unwrap();
        assert_relative_eq!(auc, 0.75);
    }

    #[test]
    fn test_auc_ties_count_half() {
        let auc = roc_auc(&[0, 1], &[0.5, 0.5]).unwrap();
        assert_relative_eq!(auc, 0.5);

        let auc = roc_auc(&[0, 0, 1, 1], &[0.2, 0.6, 0.6, 0.9]).unwrap();
        assert_relative_eq!(auc, 0.875);
    }

    #[test]
    fn test_auc_failure_is_nan_in_fold_metrics() {
        let m = evaluate_fold(&[0, 1], &[0, 1], Some(&[f64::NAN, 0.3]));
        assert!(m.roc_auc.is_nan());
        assert_eq!(m.accuracy, 1.0);

        let m = evaluate_fold(&[0, 1], &[0, 1], Some(&[0.3]));
        assert!(m.roc_auc.is_nan());
    }

    #[test]
    fn test_length_mismatch_leaves_metrics_undefined() {
        assert!(BinaryConfusion::from_labels(&[0, 1, 1], &[0, 1]).is_err());

        let m = evaluate_fold(&[0, 1, 1], &[0, 1], Some(&[0.1, 0.9, 0.8]));
        assert!(m.accuracy.is_nan());
        assert!(m.precision_pos.is_nan());
        assert!(m.recall_pos.is_nan());
        assert!(m.f1_pos.is_nan());
        assert!(m.roc_auc.is_nan());
    }

    #[test]
    fn test_constant_score_gives_half_auc() {
        let m = evaluate_fold(&[0, 1, 1], &[1, 1, 1], Some(&[1.0, 1.0, 1.0]));
        assert_relative_eq!(m.roc_auc, 0.5);
    }
}
