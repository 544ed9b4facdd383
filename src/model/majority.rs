//! Majority-class baseline
//!
//! Predicts the most frequent training label for every test row. The score it
//! reports is that label cast to `f64`: a floor reference, not a calibrated
//! probability, so its ROC-AUC is either undefined or 0.5.

use super::{Estimator, Scorer};
use crate::dataset::FeatureMatrix;
use crate::error::Result;
use crate::types::Label;
use serde::{Deserialize, Serialize};

/// Most frequent label; frequency ties resolve to the smaller label
pub fn majority_label(train_y: &[Label]) -> Label {
    let mut counts = [0usize; 2];
    for &l in train_y {
        counts[usize::from(l.min(1))] += 1;
    }
    if counts[1] > counts[0] {
        1
    } else {
        0
    }
}

/// Majority predictions and the label-as-score surrogate for `n_test` rows
pub fn majority_baseline_predict(train_y: &[Label], n_test: usize) -> (Vec<Label>, Vec<f64>) {
    let label = majority_label(train_y);
    (vec![label; n_test], vec![f64::from(label); n_test])
}

/// Estimator wrapper so the baseline flows through the common evaluation path
#[derive(Debug, Clone, Copy, Default)]
pub struct MajorityClassifier;

/// Fitted majority baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MajorityModel {
    pub label: Label,
}

impl Estimator for MajorityClassifier {
    type Model = MajorityModel;

    fn name(&self) -> &str {
        "majority"
    }

    fn fit(&self, _x: &FeatureMatrix, y: &[Label]) -> Result<MajorityModel> {
        Ok(MajorityModel {
            label: majority_label(y),
        })
    }
}

impl Scorer for MajorityModel {
    fn predict(&self, x: &FeatureMatrix) -> Vec<Label> {
        majority_baseline_predict(&[self.label], x.n_rows()).0
    }

    fn decision_function(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        Some(majority_baseline_predict(&[self.label], x.n_rows()).1)
    }
}
