//! L2-regularized logistic regression
//!
//! Minimizes `0.5 * ||w||^2 + C * sum_i s_i * log(1 + exp(-t_i * (w'x_i + b)))`
//! with Newton's method, where `s_i` are class weights and `t_i` is ±1. The
//! intercept is not penalized, so coefficients differ slightly from liblinear
//! fits that regularize it; baseline metrics match those only approximately.
//!
//! Fitting fails on single-class targets, non-finite features, a singular
//! Hessian, or when the iteration budget runs out; callers evaluating folds
//! route those failures through the fallback policy.

use super::{require_both_classes, ClassWeight, Estimator, Scorer};
use crate::dataset::FeatureMatrix;
use crate::error::{EvalError, Result};
use crate::types::Label;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default inverse regularization strength
pub const DEFAULT_C: f64 = 1.0;

/// Default Newton iteration budget
pub const DEFAULT_MAX_ITER: usize = 2000;

/// Default step-size convergence tolerance
pub const DEFAULT_TOL: f64 = 1e-8;

/// Backtracking halvings before a Newton step is accepted as-is
const MAX_LINE_SEARCH_STEPS: usize = 30;

/// Logistic regression estimator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticRegression {
    /// Inverse regularization strength
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub class_weight: ClassWeight,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            c: DEFAULT_C,
            max_iter: DEFAULT_MAX_ITER,
            tol: DEFAULT_TOL,
            class_weight: ClassWeight::Balanced,
        }
    }
}

/// Fitted logistic regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub coef: Vec<f64>,
    pub intercept: f64,
    pub n_iter: usize,
}

impl LogisticModel {
    fn margin(&self, row: &[f64]) -> f64 {
        self.intercept + dot(&self.coef, row)
    }
}

impl Scorer for LogisticModel {
    fn predict(&self, x: &FeatureMatrix) -> Vec<Label> {
        x.rows().map(|r| Label::from(self.margin(r) > 0.0)).collect()
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        Some(x.rows().map(|r| sigmoid(self.margin(r))).collect())
    }

    fn decision_function(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        Some(x.rows().map(|r| self.margin(r)).collect())
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.coef.len())
    }
}

impl Estimator for LogisticRegression {
    type Model = LogisticModel;

    fn name(&self) -> &str {
        "logreg"
    }

    fn fit(&self, x: &FeatureMatrix, y: &[Label]) -> Result<LogisticModel> {
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
                "logistic regression input contains NaN or infinity".into(),
            ));
        }

        let d = x.n_features();
        let p = d + 1; // coefficients + intercept
        let class_w = self.class_weight.class_weights(y);
        let weights: Vec<f64> = y.iter().map(|&l| class_w[usize::from(l)]).collect();
        let mut beta = vec![0.0; p];
        let mut obj = self.objective(x, y, &weights, &beta);

        for iter in 0..self.max_iter {
            let (grad, hess) = self.gradient_hessian(x, y, &weights, &beta);
            let step = solve_spd(hess, &grad).ok_or_else(|| {
                EvalError::TrainingError("singular Hessian in logistic regression".into())
            })?;

            // backtracking on the Newton direction
            let mut t = 1.0;
            let mut candidate = beta.clone();
            let mut new_obj = obj;
            for _ in 0..MAX_LINE_SEARCH_STEPS {
                for j in 0..p {
                    candidate[j] = beta[j] - t * step[j];
                }
                new_obj = self.objective(x, y, &weights, &candidate);
                if new_obj <= obj {
                    break;
                }
                t *= 0.5;
            }

            let max_change = step.iter().map(|s| (t * s).abs()).fold(0.0, f64::max);
            beta = candidate;
            obj = new_obj;

            if max_change < self.tol {
                debug!(iterations = iter + 1, objective = obj, "logistic regression converged");
                let intercept = beta[d];
                beta.truncate(d);
                return Ok(LogisticModel {
                    coef: beta,
                    intercept,
                    n_iter: iter + 1,
                });
            }
        }

        Err(EvalError::ConvergenceFailure {
            iterations: self.max_iter,
        })
    }
}

impl LogisticRegression {
    fn objective(&self, x: &FeatureMatrix, y: &[Label], w: &[f64], beta: &[f64]) -> f64 {
        let d = x.n_features();
        let penalty = 0.5 * beta[..d].iter().map(|b| b * b).sum::<f64>();
        let loss: f64 = x
            .rows()
            .zip(y)
            .zip(w)
            .map(|((row, &label), &s)| {
                let z = beta[d] + dot(&beta[..d], row);
                let t = if label == 1 { 1.0 } else { -1.0 };
                s * log1p_exp(-t * z)
            })
            .sum();
        penalty + self.c * loss
    }

    /// Gradient and Hessian of the objective over `[coef..., intercept]`
    fn gradient_hessian(
        &self,
        x: &FeatureMatrix,
        y: &[Label],
        w: &[f64],
        beta: &[f64],
    ) -> (Vec<f64>, Vec<Vec<f64>>) {
        let d = x.n_features();
        let p = d + 1;
        let mut grad = vec![0.0; p];
        let mut hess = vec![vec![0.0; p]; p];
        for j in 0..d {
            grad[j] = beta[j];
            hess[j][j] = 1.0;
        }
        // keeps the intercept direction positive definite when probabilities saturate
        hess[d][d] = 1e-10;

        let mut xi = vec![0.0; p];
        for ((row, &label), &s) in x.rows().zip(y).zip(w) {
            xi[..d].copy_from_slice(row);
            xi[d] = 1.0;
            let z = dot(beta, &xi);
            let mu = sigmoid(z);
            let r = self.c * s * (mu - f64::from(label));
            let h = self.c * s * mu * (1.0 - mu);
            for a in 0..p {
                grad[a] += r * xi[a];
                for b in 0..=a {
                    hess[a][b] += h * xi[a] * xi[b];
                }
            }
        }
        for a in 0..p {
            for b in 0..a {
                hess[b][a] = hess[a][b];
            }
        }
        (grad, hess)
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Numerically stable `ln(1 + e^z)`
fn log1p_exp(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// Solve `A x = b` for symmetric positive definite `A` via Cholesky
fn solve_spd(mut a: Vec<Vec<f64>>, b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    for j in 0..n {
        let mut diag = a[j][j];
        for k in 0..j {
            diag -= a[j][k] * a[j][k];
        }
        if diag <= 0.0 || !diag.is_finite() {
            return None;
        }
        let l_jj = diag.sqrt();
        a[j][j] = l_jj;
        for i in (j + 1)..n {
            let mut v = a[i][j];
            for k in 0..j {
                v -= a[i][k] * a[j][k];
            }
            a[i][j] = v / l_jj;
        }
    }

    // forward: L z = b
    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut v = b[i];
        for k in 0..i {
            v -= a[i][k] * z[k];
        }
        z[i] = v / a[i][i];
    }
    // backward: L' x = z
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut v = z[i];
        for k in (i + 1)..n {
            v -= a[k][i] * x[k];
        }
        x[i] = v / a[i][i];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn separable() -> (FeatureMatrix, Vec<Label>) {
        let x = FeatureMatrix::from_rows(&[
            vec![-2.0, 0.1],
            vec![-1.5, -0.3],
            vec![-1.0, 0.2],
            vec![1.0, -0.1],
            vec![1.5, 0.3],
            vec![2.0, 0.0],
        ])
        .unwrap();
        (x, vec![0, 0, 0, 1, 1, 1])
    }

    #[test]
    fn test_fits_separable_data() {
        let (x, y) = separable();
        let model = LogisticRegression::default().fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x), y);
        assert!(model.coef[0] > 0.0);

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[0] < 0.5 && proba[5] > 0.5);
    }

    #[test]
    fn test_score_prefers_probability() {
        let (x, y) = separable();
        let model = LogisticRegression::default().fit(&x, &y).unwrap();
        assert_eq!(model.score(&x), model.predict_proba(&x));
    }

    #[test]
    fn test_intercept_is_not_shrunk() {
        // uninformative feature: the intercept alone recovers the 3:1 log-odds
        let x = FeatureMatrix::from_rows(&[vec![0.0], vec![0.0], vec![0.0], vec![0.0]]).unwrap();
        let lr = LogisticRegression {
            class_weight: ClassWeight::Uniform,
            ..LogisticRegression::default()
        };
        let model = lr.fit(&x, &[0, 1, 1, 1]).unwrap();
        assert_relative_eq!(model.coef[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(model.intercept, 3.0f64.ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_single_class_fails() {
        let (x, _) = separable();
        let err = LogisticRegression::default().fit(&x, &[1; 6]).unwrap_err();
        assert!(matches!(err, EvalError::SingleClass(1)));
    }

    #[test]
    fn test_nan_input_fails() {
        let x = FeatureMatrix::from_rows(&[vec![f64::NAN], vec![1.0]]).unwrap();
        assert!(LogisticRegression::default().fit(&x, &[0, 1]).is_err());
    }

    #[test]
    fn test_iteration_budget_exhaustion_fails() {
        let (x, y) = separable();
        let lr = LogisticRegression {
            max_iter: 1,
            ..LogisticRegression::default()
        };
        let err = lr.fit(&x, &y).unwrap_err();
        assert!(matches!(err, EvalError::ConvergenceFailure { iterations: 1 }));
    }

    #[test]
    fn test_balanced_weights_shift_intercept() {
        // 1 positive vs 5 negatives on an uninformative feature
        let x = FeatureMatrix::from_rows(&[
            vec![0.0],
            vec![0.0],
            vec![0.0],
            vec![0.0],
            vec![0.0],
            vec![0.0],
        ])
        .unwrap();
        let y = vec![1, 0, 0, 0, 0, 0];
        let balanced = LogisticRegression::default().fit(&x, &y).unwrap();
        assert_relative_eq!(balanced.intercept, 0.0, epsilon = 1e-6);

        let uniform = LogisticRegression {
            class_weight: ClassWeight::Uniform,
            ..LogisticRegression::default()
        };
        let m = uniform.fit(&x, &y).unwrap();
        assert_relative_eq!(m.intercept, (1.0f64 / 5.0).ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_solve_spd() {
        let a = vec![vec![4.0, 2.0], vec![2.0, 3.0]];
        let x = solve_spd(a, &[2.0, 1.0]).unwrap();
        assert_relative_eq!(x[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(x[1], 0.0, epsilon = 1e-12);
    }
}
