//! Fit-or-fallback policy
//!
//! A fold whose training split cannot be fitted (single class, non-finite
//! input, non-convergence) must not abort the run. [`fit_or_fallback`] always
//! returns a usable model: the fitted one, or a constant model predicting the
//! rounded mean of the training labels.

use super::{Estimator, Scorer};
use crate::dataset::FeatureMatrix;
use crate::types::Label;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Predicts one label for every row; the label doubles as the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantModel {
    label: Label,
}

impl ConstantModel {
    pub fn new(label: Label) -> Self {
        Self { label }
    }

    /// Rounded (half-to-even) mean of the training labels
    pub fn from_training_labels(y: &[Label]) -> Self {
        if y.is_empty() {
            return Self::new(0);
        }
        let mean = y.iter().map(|&l| f64::from(l)).sum::<f64>() / y.len() as f64;
        Self::new(mean.round_ties_even() as Label)
    }

    pub fn label(&self) -> Label {
        self.label
    }
}

impl Scorer for ConstantModel {
    fn predict(&self, x: &FeatureMatrix) -> Vec<Label> {
        vec![self.label; x.n_rows()]
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        Some(vec![f64::from(self.label); x.n_rows()])
    }
}

/// Result of fitting one fold
#[derive(Debug, Clone)]
pub enum FitOutcome<M> {
    Fitted(M),
    Fallback { model: ConstantModel, reason: String },
}

impl<M> FitOutcome<M> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, FitOutcome::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            FitOutcome::Fitted(_) => None,
            FitOutcome::Fallback { reason, .. } => Some(reason),
        }
    }
}

impl<M: Scorer> Scorer for FitOutcome<M> {
    fn predict(&self, x: &FeatureMatrix) -> Vec<Label> {
        match self {
            FitOutcome::Fitted(m) => m.predict(x),
            FitOutcome::Fallback { model, .. } => model.predict(x),
        }
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        match self {
            FitOutcome::Fitted(m) => m.predict_proba(x),
            FitOutcome::Fallback { model, .. } => model.predict_proba(x),
        }
    }

    fn decision_function(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        match self {
            FitOutcome::Fitted(m) => m.decision_function(x),
            FitOutcome::Fallback { model, .. } => model.decision_function(x),
        }
    }

    fn score(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        match self {
            FitOutcome::Fitted(m) => m.score(x),
            FitOutcome::Fallback { model, .. } => model.score(x),
        }
    }

    fn n_features(&self) -> Option<usize> {
        match self {
            FitOutcome::Fitted(m) => m.n_features(),
            FitOutcome::Fallback { .. } => None,
        }
    }
}

/// Fit `estimator` on a training split, falling back to a constant model on failure
pub fn fit_or_fallback<E: Estimator>(
    estimator: &E,
    x: &FeatureMatrix,
    y: &[Label],
) -> FitOutcome<E::Model> {
    match estimator.fit(x, y) {
        Ok(model) => FitOutcome::Fitted(model),
        Err(e) => {
            let model = ConstantModel::from_training_labels(y);
            warn!(
                estimator = estimator.name(),
                error = %e,
                fallback_label = model.label(),
                "fit failed, using rounded-mean fallback"
            );
            FitOutcome::Fallback {
                model,
                reason: e.to_string(),
            }
        }
    }
}
