//! Weighted CART decision tree (Gini impurity)
//!
//! The tree is stored as a flat arena of [`TreeNode`] values with index 0 as the
//! root. Sample weights carry both class balancing and bootstrap multiplicity,
//! so the forest can reuse this builder directly. Leaves store the weighted
//! fraction of positive samples, which serves as the tree's probability.

use super::{require_both_classes, Scorer};
use crate::dataset::FeatureMatrix;
use crate::error::{EvalError, Result};
use crate::types::Label;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Nodes with impurity at or below this are treated as pure
const PURITY_EPS: f64 = 1e-12;

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Maximum depth (`None` grows until leaves are pure or too small)
    pub max_depth: Option<usize>,
    /// Minimum samples required to split an internal node
    pub min_samples_split: usize,
    /// Minimum samples required in each child
    pub min_samples_leaf: usize,
    /// Features drawn as split candidates at each node (`None` = all)
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

impl TreeParams {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == Some(0) {
            return Err(invalid("max_depth", "must be at least 1"));
        }
        if self.min_samples_split < 2 {
            return Err(invalid("min_samples_split", "must be at least 2"));
        }
        if self.min_samples_leaf < 1 {
            return Err(invalid("min_samples_leaf", "must be at least 1"));
        }
        if self.max_features == Some(0) {
            return Err(invalid("max_features", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: &str) -> EvalError {
    EvalError::InvalidParameter {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// A single node in the tree arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        /// Weighted fraction of positive samples
        proba: f64,
    },
}

/// A fitted decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
    /// Unnormalized weighted impurity decrease per feature
    importances: Vec<f64>,
}

impl DecisionTree {
    /// Fit on unweighted samples
    ///
    /// # Errors
    ///
    /// Returns an error on dimension mismatch, non-finite features, a
    /// single-class target, or invalid parameters.
    pub fn fit(x: &FeatureMatrix, y: &[Label], params: TreeParams, seed: u64) -> Result<Self> {
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
                "decision tree input contains NaN or infinity".into(),
            ));
        }
        let weights = vec![1.0; y.len()];
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(Self::fit_weighted(x, y, &weights, params, &mut rng))
    }

    /// Fit using per-sample weights; zero-weight samples are ignored
    ///
    /// Inputs are assumed validated by the caller.
    pub(crate) fn fit_weighted<R: Rng>(
        x: &FeatureMatrix,
        y: &[Label],
        weights: &[f64],
        params: TreeParams,
        rng: &mut R,
    ) -> Self {
        let n_features = x.n_features();
        let max_features = params
            .max_features
            .map_or(n_features, |m| m.min(n_features))
            .max(1);
        let indices: Vec<usize> = (0..y.len()).filter(|&i| weights[i] > 0.0).collect();

        let mut builder = Builder {
            x,
            y,
            w: weights,
            params,
            max_features,
            rng,
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
        };
        builder.build(indices, 0);

        Self {
            nodes: builder.nodes,
            importances: builder.importances,
        }
    }

    /// Probability of the positive class for one row
    pub fn predict_proba_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { proba } => return *proba,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Raw impurity-decrease importances (not normalized)
    pub fn raw_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Depth of the deepest leaf (root-only tree has depth 0)
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }
}

impl Scorer for DecisionTree {
    fn predict(&self, x: &FeatureMatrix) -> Vec<Label> {
        x.rows()
            .map(|r| Label::from(self.predict_proba_row(r) > 0.5))
            .collect()
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        Some(x.rows().map(|r| self.predict_proba_row(r)).collect())
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.importances.len())
    }
}

// ---------------------------------------------------------------------------
// Tree building
// ---------------------------------------------------------------------------

struct Builder<'a, R: Rng> {
    x: &'a FeatureMatrix,
    y: &'a [Label],
    w: &'a [f64],
    params: TreeParams,
    max_features: usize,
    rng: &'a mut R,
    nodes: Vec<TreeNode>,
    importances: Vec<f64>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Weighted child impurity sum `w_l * gini_l + w_r * gini_r`
    child_impurity: f64,
}

impl<R: Rng> Builder<'_, R> {
    /// Build the subtree over `indices`, returning its arena index
    fn build(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let sums = self.class_sums(&indices);
        let total = sums[0] + sums[1];
        let impurity = gini(sums);
        let proba = if total > 0.0 { sums[1] / total } else { 0.0 };

        let depth_reached = self.params.max_depth.is_some_and(|d| depth >= d);
        let too_small = indices.len() < self.params.min_samples_split
            || indices.len() < 2 * self.params.min_samples_leaf;
        if depth_reached || too_small || impurity <= PURITY_EPS {
            return self.leaf(proba);
        }

        let Some(split) = self.find_best_split(&indices) else {
            return self.leaf(proba);
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| self.x.get(i, split.feature) <= split.threshold);
        if left_idx.is_empty() || right_idx.is_empty() {
            return self.leaf(proba);
        }

        self.importances[split.feature] += total * impurity - split.child_impurity;

        let node_idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { proba }); // placeholder
        let left = self.build(left_idx, depth + 1);
        let right = self.build(right_idx, depth + 1);
        self.nodes[node_idx] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_idx
    }

    fn leaf(&mut self, proba: f64) -> usize {
        self.nodes.push(TreeNode::Leaf { proba });
        self.nodes.len() - 1
    }

    fn class_sums(&self, indices: &[usize]) -> [f64; 2] {
        let mut sums = [0.0; 2];
        for &i in indices {
            sums[usize::from(self.y[i])] += self.w[i];
        }
        sums
    }

    /// Feature visiting order: all features in a random order when subsampling
    fn feature_order(&mut self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.x.n_features()).collect();
        if self.max_features < order.len() {
            order.shuffle(&mut *self.rng);
        }
        order
    }

    fn find_best_split(&mut self, indices: &[usize]) -> Option<SplitCandidate> {
        let min_leaf = self.params.min_samples_leaf;
        let parent = self.class_sums(indices);
        let mut best: Option<SplitCandidate> = None;

        // constant features do not count toward the max_features budget
        let mut visited = 0;
        for feature in self.feature_order() {
            if visited >= self.max_features {
                break;
            }
            let mut sorted = indices.to_vec();
            sorted.sort_by(|&a, &b| self.x.get(a, feature).total_cmp(&self.x.get(b, feature)));
            let lo = self.x.get(sorted[0], feature);
            let hi = self.x.get(sorted[sorted.len() - 1], feature);
            if hi <= lo {
                continue;
            }
            visited += 1;

            let mut left = [0.0; 2];
            for k in 0..sorted.len() - 1 {
                let i = sorted[k];
                left[usize::from(self.y[i])] += self.w[i];

                let n_left = k + 1;
                let n_right = sorted.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let v = self.x.get(i, feature);
                let v_next = self.x.get(sorted[k + 1], feature);
                if v_next <= v {
                    continue;
                }

                let right = [parent[0] - left[0], parent[1] - left[1]];
                let w_left = left[0] + left[1];
                let w_right = right[0] + right[1];
                let child_impurity = w_left * gini(left) + w_right * gini(right);

                if best
                    .as_ref()
                    .map_or(true, |b| child_impurity < b.child_impurity)
                {
                    let mut threshold = (v + v_next) / 2.0;
                    if threshold >= v_next {
                        threshold = v;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        child_impurity,
                    });
                }
            }
        }
        best
    }
}

/// Gini impurity of weighted class sums
fn gini(sums: [f64; 2]) -> f64 {
    let total = sums[0] + sums[1];
    if total <= 0.0 {
        return 0.0;
    }
    let p0 = sums[0] / total;
    let p1 = sums[1] / total;
    1.0 - p0 * p0 - p1 * p1
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn one_feature(values: &[f64]) -> FeatureMatrix {
        FeatureMatrix::new(values.to_vec(), values.len(), 1).unwrap()
    }

    #[test]
    fn test_separates_threshold_data() {
        let x = one_feature(&[1.0, 2.0, 3.0, 10.0, 11.0, 12.0]);
        let y = vec![0, 0, 0, 1, 1, 1];
        let tree = DecisionTree::fit(&x, &y, TreeParams::default(), 0).unwrap();
        assert_eq!(tree.predict(&x), y);
        assert_eq!(tree.depth(), 1);
        // split at the midpoint between 3 and 10
        assert_eq!(tree.predict(&one_feature(&[6.4, 6.6])), vec![0, 1]);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = one_feature(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let y = vec![0, 1, 0, 1, 0, 1, 0, 1];
        let params = TreeParams {
            max_depth: Some(2),
            ..TreeParams::default()
        };
        let tree = DecisionTree::fit(&x, &y, params, 0).unwrap();
        assert!(tree.depth() <= 2);

        let full = DecisionTree::fit(&x, &y, TreeParams::default(), 0).unwrap();
        assert_eq!(full.predict(&x), y);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let x = one_feature(&[1.0, 2.0, 3.0, 4.0]);
        let y = vec![1, 0, 0, 0];
        let params = TreeParams {
            min_samples_leaf: 2,
            ..TreeParams::default()
        };
        let tree = DecisionTree::fit(&x, &y, params, 0).unwrap();
        // the lone positive cannot be isolated
        let proba = tree.predict_proba(&x).unwrap();
        assert_relative_eq!(proba[0], 0.5);
        assert_relative_eq!(proba[1], 0.5);
    }

    #[test]
    fn test_importance_on_informative_feature() {
        let x = FeatureMatrix::from_rows(&[
            vec![0.0, 5.0],
            vec![1.0, 5.0],
            vec![2.0, 5.0],
            vec![3.0, 5.0],
        ])
        .unwrap();
        let tree = DecisionTree::fit(&x, &[0, 0, 1, 1], TreeParams::default(), 0).unwrap();
        let imp = tree.raw_importances();
        assert!(imp[0] > 0.0);
        assert_eq!(imp[1], 0.0);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let x = one_feature(&[1.0, 2.0]);
        let params = TreeParams {
            min_samples_split: 1,
            ..TreeParams::default()
        };
        assert!(matches!(
            DecisionTree::fit(&x, &[0, 1], params, 0),
            Err(EvalError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_gini() {
        assert_relative_eq!(gini([1.0, 1.0]), 0.5);
        assert_relative_eq!(gini([3.0, 0.0]), 0.0);
    }
}
