//! Classifiers and the evaluation contract they implement
//!
//! Every model exposes the capability-based [`Scorer`] interface: hard labels
//! plus, where available, a positive-class probability or a decision margin.
//! Estimators ([`Estimator`]) turn a training split into a fitted `Scorer`.
//!
//! Models: majority-class baseline, balanced logistic regression, and the
//! impute → scale → random forest pipeline.

pub mod fallback;
pub mod forest;
pub mod logistic;
pub mod majority;
pub mod pipeline;
pub mod preprocess;
pub mod tree;

pub use fallback::{fit_or_fallback, ConstantModel, FitOutcome};
pub use forest::{RandomForest, RandomForestConfig};
pub use logistic::{LogisticModel, LogisticRegression};
pub use majority::{majority_baseline_predict, majority_label, MajorityClassifier, MajorityModel};
pub use pipeline::{FittedPipeline, ForestParams, ForestPipeline};
pub use preprocess::{MedianImputer, StandardScaler};
pub use tree::{DecisionTree, TreeParams};

use crate::dataset::FeatureMatrix;
use crate::error::Result;
use crate::types::Label;
use serde::{Deserialize, Serialize};

/// A fitted model that can label and score feature rows
pub trait Scorer {
    /// Hard class predictions
    fn predict(&self, x: &FeatureMatrix) -> Vec<Label>;

    /// Probability of the positive class, if the model provides one
    fn predict_proba(&self, _x: &FeatureMatrix) -> Option<Vec<f64>> {
        None
    }

    /// Signed decision margin, if the model provides one
    fn decision_function(&self, _x: &FeatureMatrix) -> Option<Vec<f64>> {
        None
    }

    /// Continuous score for ranking metrics: probability, else margin, else none
    fn score(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        self.predict_proba(x).or_else(|| self.decision_function(x))
    }

    /// Number of input features the model was fitted on, if it depends on them
    fn n_features(&self) -> Option<usize> {
        None
    }
}

impl<S: Scorer + ?Sized> Scorer for &S {
    fn predict(&self, x: &FeatureMatrix) -> Vec<Label> {
        (**self).predict(x)
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        (**self).predict_proba(x)
    }

    fn decision_function(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        (**self).decision_function(x)
    }

    fn score(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        (**self).score(x)
    }

    fn n_features(&self) -> Option<usize> {
        (**self).n_features()
    }
}

impl<S: Scorer + ?Sized> Scorer for Box<S> {
    fn predict(&self, x: &FeatureMatrix) -> Vec<Label> {
        (**self).predict(x)
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        (**self).predict_proba(x)
    }

    fn decision_function(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        (**self).decision_function(x)
    }

    fn score(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        (**self).score(x)
    }

    fn n_features(&self) -> Option<usize> {
        (**self).n_features()
    }
}

/// Something that can be trained on a labelled split
pub trait Estimator {
    type Model: Scorer;

    /// Short identifier used in logs and reports
    fn name(&self) -> &str;

    /// Fit a fresh model; errors are recoverable per fold via [`fit_or_fallback`]
    fn fit(&self, x: &FeatureMatrix, y: &[Label]) -> Result<Self::Model>;
}

/// Class weighting applied during training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassWeight {
    /// Every sample weighs 1
    Uniform,
    /// `n_samples / (n_classes * class_count)`
    #[default]
    Balanced,
}

impl ClassWeight {
    /// Per-class weights `[w0, w1]` for a binary label vector
    pub fn class_weights(&self, y: &[Label]) -> [f64; 2] {
        match self {
            ClassWeight::Uniform => [1.0, 1.0],
            ClassWeight::Balanced => {
                let n = y.len() as f64;
                let n1 = y.iter().filter(|&&l| l == 1).count() as f64;
                let n0 = n - n1;
                let w = |count: f64| if count > 0.0 { n / (2.0 * count) } else { 0.0 };
                [w(n0), w(n1)]
            }
        }
    }
}

/// Both classes present, otherwise the single class found
pub(crate) fn require_both_classes(y: &[Label]) -> Result<()> {
    match y.first() {
        None => Err(crate::error::EvalError::InvalidInput(
            "cannot fit on an empty training set".into(),
        )),
        Some(&first) if y.iter().all(|&l| l == first) => {
            Err(crate::error::EvalError::SingleClass(first))
        }
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_balanced_class_weights() {
        let w = ClassWeight::Balanced.class_weights(&[0, 0, 0, 1]);
        assert_relative_eq!(w[0], 4.0 / 6.0);
        assert_relative_eq!(w[1], 2.0);
    }

    #[test]
    fn test_uniform_class_weights() {
        assert_eq!(ClassWeight::Uniform.class_weights(&[0, 1, 1]), [1.0, 1.0]);
    }

    #[test]
    fn test_require_both_classes() {
        assert!(require_both_classes(&[0, 1]).is_ok());
        assert!(matches!(
            require_both_classes(&[1, 1]),
            Err(crate::error::EvalError::SingleClass(1))
        ));
        assert!(require_both_classes(&[]).is_err());
    }
}
