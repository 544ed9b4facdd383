//! Random forest classifier
//!
//! Bagged CART trees with per-node feature subsampling. Each tree draws its own
//! bootstrap sample from an RNG seeded with `seed + tree_index`, so the fitted
//! forest does not depend on how rayon schedules the trees.

use super::tree::{DecisionTree, TreeParams};
use super::{require_both_classes, ClassWeight, Scorer};
use crate::dataset::FeatureMatrix;
use crate::error::{EvalError, Result};
use crate::types::Label;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default random seed for forest training
pub const DEFAULT_SEED: u64 = 2025;

/// Random forest hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Split candidates per node (`None` = floor(sqrt(n_features)))
    pub max_features: Option<usize>,
    pub class_weight: ClassWeight,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            class_weight: ClassWeight::Balanced,
            bootstrap: true,
            seed: DEFAULT_SEED,
        }
    }
}

impl RandomForestConfig {
    fn tree_params(&self, n_features: usize) -> TreeParams {
        let sqrt = (n_features as f64).sqrt().floor() as usize;
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: Some(self.max_features.unwrap_or(sqrt).max(1)),
        }
    }
}

/// A fitted random forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    /// Fit a forest on finite features
    ///
    /// # Errors
    ///
    /// Returns an error on invalid parameters, dimension mismatch, non-finite
    /// features, or a single-class target.
    pub fn fit(x: &FeatureMatrix, y: &[Label], config: &RandomForestConfig) -> Result<Self> {
        if config.n_estimators == 0 {
            return Err(EvalError::InvalidParameter {
                name: "n_estimators".into(),
                reason: "must be at least 1".into(),
            });
        }
        let n_features = x.n_features();
        let params = config.tree_params(n_features);
        params.validate()?;

        if x.n_rows() != y.len() {
            return Err(EvalError::InvalidInput(format!(
                "{} feature rows but {} labels",
                x.n_rows(),
                y.len()
            )));
        }
        require_both_classes(y)?;
        if x.has_non_finite() {
            return Err(EvalError::InvalidInput(
                "random forest input contains NaN or infinity".into(),
            ));
        }

        let class_w = config.class_weight.class_weights(y);
        let n = y.len();

        let trees: Vec<DecisionTree> = (0..config.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(t as u64));
                let mut counts = vec![0.0f64; n];
                if config.bootstrap {
                    for _ in 0..n {
                        counts[rng.gen_range(0..n)] += 1.0;
                    }
                } else {
                    counts.fill(1.0);
                }
                let weights: Vec<f64> = counts
                    .iter()
                    .zip(y)
                    .map(|(c, &l)| c * class_w[usize::from(l)])
                    .collect();
                DecisionTree::fit_weighted(x, y, &weights, params, &mut rng)
            })
            .collect();

        debug!(
            n_estimators = trees.len(),
            n_features,
            n_samples = n,
            "random forest fitted"
        );
        Ok(Self { trees, n_features })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Mean-decrease-in-impurity importances, summing to 1
    ///
    /// Each tree's importances are normalized before averaging; a forest
    /// whose trees never split reports all zeros.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.trees {
            let raw = tree.raw_importances();
            let sum: f64 = raw.iter().sum();
            if sum > 0.0 {
                for (acc, v) in total.iter_mut().zip(raw) {
                    *acc += v / sum;
                }
            }
        }
        let grand: f64 = total.iter().sum();
        if grand > 0.0 {
            total.iter_mut().for_each(|v| *v /= grand);
        }
        total
    }

    fn proba_row(&self, row: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict_proba_row(row)).sum();
        sum / self.trees.len().max(1) as f64
    }
}

impl Scorer for RandomForest {
    fn predict(&self, x: &FeatureMatrix) -> Vec<Label> {
        x.rows()
            .map(|r| Label::from(self.proba_row(r) > 0.5))
            .collect()
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        Some(x.rows().map(|r| self.proba_row(r)).collect())
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.n_features)
    }
}
