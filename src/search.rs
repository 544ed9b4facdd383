//! Grouped hyperparameter search
//!
//! Exhaustive grid search scored by leave-one-group-out F1 on the positive
//! class. Grid points are evaluated as an order-preserving parallel map on a
//! dedicated rayon pool; the winner is picked afterwards by a sequential scan,
//! so the result does not depend on the worker count.

use crate::cv::LeaveOneGroupOut;
use crate::dataset::Dataset;
use crate::error::{EvalError, Result};
use crate::evaluate::refit_folds;
use crate::model::Estimator;
use crate::types::Metric;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "None"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ParamValue::Null, Into::into)
    }
}

/// One point of the search space
pub type GridPoint = BTreeMap<String, ParamValue>;

/// Parameter name → ordered candidate values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamGrid {
    params: BTreeMap<String, Vec<ParamValue>>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the candidates for one parameter
    pub fn with<V: Into<ParamValue>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.params
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Number of grid points
    pub fn len(&self) -> usize {
        self.params.values().map(Vec::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cartesian product in sorted-key order, last key varying fastest
    pub fn points(&self) -> Vec<GridPoint> {
        let mut points = vec![GridPoint::new()];
        for (name, values) in &self.params {
            let mut next = Vec::with_capacity(points.len() * values.len());
            for point in &points {
                for value in values {
                    let mut p = point.clone();
                    p.insert(name.clone(), value.clone());
                    next.push(p);
                }
            }
            points = next;
        }
        points
    }
}

/// Default search space for the forest pipeline
pub fn default_forest_grid() -> ParamGrid {
    ParamGrid::new()
        .with("rf__n_estimators", [100i64, 300, 600])
        .with("rf__max_depth", [None, Some(6i64), Some(12)])
        .with("rf__min_samples_split", [2i64, 5])
        .with("rf__min_samples_leaf", [1i64, 2])
}

/// Cross-validated result for one grid point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub params: GridPoint,
    /// Mean fold F1; `NaN` when the point could not be evaluated
    pub mean_score: f64,
    /// Population standard deviation of fold F1
    pub std_score: f64,
    pub fold_scores: Vec<f64>,
    /// Folds that used the fallback model
    pub fallback_folds: usize,
    pub error: Option<String>,
    /// 1 = best; ties share the smaller rank, failed points rank last
    pub rank: usize,
}

impl CandidateResult {
    fn failed(params: GridPoint, error: &EvalError) -> Self {
        Self {
            params,
            mean_score: f64::NAN,
            std_score: f64::NAN,
            fold_scores: Vec::new(),
            fallback_folds: 0,
            error: Some(error.to_string()),
            rank: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.mean_score.is_nan()
    }
}

/// The persisted best-parameters record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestParams {
    pub params: GridPoint,
    pub score: f64,
    pub scoring: String,
}

/// Search result including the best model refit on all rows
#[derive(Debug, Clone)]
pub struct SearchOutcome<M> {
    pub best_index: usize,
    pub best_params: GridPoint,
    pub best_score: f64,
    pub candidates: Vec<CandidateResult>,
    pub best_model: M,
}

impl<M> SearchOutcome<M> {
    pub fn best_params_record(&self) -> BestParams {
        BestParams {
            params: self.best_params.clone(),
            score: self.best_score,
            scoring: Metric::F1Pos.as_str().to_string(),
        }
    }
}

/// Exhaustive grid search under leave-one-group-out
#[derive(Debug, Clone)]
pub struct GroupedGridSearch {
    grid: ParamGrid,
    n_jobs: usize,
    splitter: LeaveOneGroupOut,
}

impl GroupedGridSearch {
    /// `n_jobs = 0` uses every available core
    pub fn new(grid: ParamGrid, n_jobs: usize) -> Self {
        Self {
            grid,
            n_jobs,
            splitter: LeaveOneGroupOut::new(),
        }
    }

    pub fn with_splitter(mut self, splitter: LeaveOneGroupOut) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn grid(&self) -> &ParamGrid {
        &self.grid
    }

    /// Evaluate every grid point, select the best and refit it on all rows
    ///
    /// `factory` builds an estimator for a grid point; a factory error marks
    /// that point as failed without aborting the search.
    ///
    /// # Errors
    ///
    /// Input errors (fewer than two groups, empty grid), a thread-pool build
    /// failure, [`EvalError::SearchFailed`] when no point could be scored,
    /// or an error from the final refit.
    pub fn run<E, F>(&self, dataset: &Dataset, factory: F) -> Result<SearchOutcome<E::Model>>
    where
        E: Estimator,
        F: Fn(&GridPoint) -> Result<E> + Sync,
    {
        let folds = self.splitter.split(dataset.groups())?;
        let points = self.grid.points();
        if points.is_empty() {
            return Err(EvalError::InvalidInput(
                "hyperparameter grid has no points".into(),
            ));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_jobs)
            .build()
            .map_err(|e| EvalError::TrainingError(format!("failed to build thread pool: {e}")))?;

        info!(
            candidates = points.len(),
            folds = folds.len(),
            n_jobs = pool.current_num_threads(),
            "starting grouped grid search"
        );

        let mut candidates: Vec<CandidateResult> = pool.install(|| {
            points
                .par_iter()
                .map(|point| match factory(point) {
                    Ok(estimator) => {
                        let report = refit_folds(&estimator, dataset, &folds);
                        let fold_scores = report.metric_values(Metric::F1Pos);
                        let (mean_score, std_score) = mean_std(&fold_scores);
                        debug!(params = ?point, mean_f1 = mean_score, "grid point evaluated");
                        CandidateResult {
                            params: point.clone(),
                            mean_score,
                            std_score,
                            fold_scores,
                            fallback_folds: report.fallback_folds.len(),
                            error: None,
                            rank: 0,
                        }
                    }
                    Err(e) => {
                        warn!(params = ?point, error = %e, "grid point failed");
                        CandidateResult::failed(point.clone(), &e)
                    }
                })
                .collect()
        });

        assign_ranks(&mut candidates);
        let best_index = select_best(&candidates).ok_or(EvalError::SearchFailed)?;
        let best_params = candidates[best_index].params.clone();
        let best_score = candidates[best_index].mean_score;
        info!(params = ?best_params, mean_f1 = best_score, "best grid point selected");

        let best_model = factory(&best_params)?.fit(dataset.features(), dataset.labels())?;

        Ok(SearchOutcome {
            best_index,
            best_params,
            best_score,
            candidates,
            best_model,
        })
    }
}

/// Index of the highest mean score; the first one wins ties, failed points never win
pub fn select_best(candidates: &[CandidateResult]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, c) in candidates.iter().enumerate() {
        if c.is_failed() {
            continue;
        }
        if best.map_or(true, |b| c.mean_score > candidates[b].mean_score) {
            best = Some(i);
        }
    }
    best
}

fn assign_ranks(candidates: &mut [CandidateResult]) {
    let key = |c: &CandidateResult| {
        if c.is_failed() {
            f64::NEG_INFINITY
        } else {
            c.mean_score
        }
    };
    let keys: Vec<f64> = candidates.iter().map(key).collect();
    for (i, c) in candidates.iter_mut().enumerate() {
        c.rank = 1 + keys.iter().filter(|&&k| k > keys[i]).count();
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
