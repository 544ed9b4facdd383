//! Impute → scale → random forest pipeline
//!
//! This is the unit trained for the final model and scored by the grid search.
//! All preprocessing statistics are learned from the training split only.

use super::forest::{RandomForest, RandomForestConfig, DEFAULT_SEED};
use super::preprocess::{MedianImputer, StandardScaler};
use super::tree::TreeParams;
use super::{ClassWeight, Estimator, Scorer};
use crate::dataset::FeatureMatrix;
use crate::error::{EvalError, Result};
use crate::search::{GridPoint, ParamValue};
use crate::types::{FeatureImportance, Label};
use serde::{Deserialize, Serialize};

/// Prefix for forest hyperparameters in a search grid
pub const FOREST_PARAM_PREFIX: &str = "rf__";

/// Tunable forest hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: Some(12),
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl ForestParams {
    /// Build from a grid point, starting from the defaults
    ///
    /// Keys may carry the `rf__` prefix. `max_depth` accepts `null` or
    /// `"none"` for unlimited depth.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::InvalidParameter`] for unknown keys, values of
    /// the wrong type, and values outside the ranges checked by
    /// [`ForestParams::validate`].
    pub fn from_grid_point(point: &GridPoint) -> Result<Self> {
        let mut params = Self::default();
        for (key, value) in point {
            let name = key.strip_prefix(FOREST_PARAM_PREFIX).unwrap_or(key);
            match name {
                "n_estimators" => params.n_estimators = positive_int(key, value)?,
                "min_samples_split" => params.min_samples_split = positive_int(key, value)?,
                "min_samples_leaf" => params.min_samples_leaf = positive_int(key, value)?,
                "max_depth" => {
                    params.max_depth = match value {
                        ParamValue::Null => None,
                        ParamValue::Text(t) if t.eq_ignore_ascii_case("none") => None,
                        other => Some(positive_int(key, other)?),
                    }
                }
                _ => {
                    return Err(EvalError::InvalidParameter {
                        name: key.clone(),
                        reason: "unknown forest parameter".into(),
                    })
                }
            }
        }
        params.validate()?;
        Ok(params)
    }

    /// At least one tree, `max_depth >= 1`, `min_samples_split >= 2` and
    /// `min_samples_leaf >= 1`
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(EvalError::InvalidParameter {
                name: "n_estimators".into(),
                reason: "must be at least 1".into(),
            });
        }
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: None,
        }
        .validate()
    }

    /// The equivalent grid point with `rf__`-prefixed keys
    pub fn to_grid_point(&self) -> GridPoint {
        let mut point = GridPoint::new();
        let key = |k: &str| format!("{FOREST_PARAM_PREFIX}{k}");
        point.insert(key("n_estimators"), ParamValue::Int(self.n_estimators as i64));
        point.insert(
            key("max_depth"),
            self.max_depth
                .map_or(ParamValue::Null, |d| ParamValue::Int(d as i64)),
        );
        point.insert(
            key("min_samples_split"),
            ParamValue::Int(self.min_samples_split as i64),
        );
        point.insert(
            key("min_samples_leaf"),
            ParamValue::Int(self.min_samples_leaf as i64),
        );
        point
    }

    pub fn forest_config(&self, seed: u64) -> RandomForestConfig {
        RandomForestConfig {
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: None,
            class_weight: ClassWeight::Balanced,
            bootstrap: true,
            seed,
        }
    }
}

fn positive_int(key: &str, value: &ParamValue) -> Result<usize> {
    let invalid = |reason: &str| EvalError::InvalidParameter {
        name: key.to_string(),
        reason: format!("{reason}, got {value}"),
    };
    match value {
        ParamValue::Int(i) if *i >= 0 => Ok(*i as usize),
        ParamValue::Float(f) if f.fract() == 0.0 && *f >= 0.0 => Ok(*f as usize),
        ParamValue::Int(_) | ParamValue::Float(_) => Err(invalid("expected a non-negative integer")),
        _ => Err(invalid("expected an integer")),
    }
}

/// Unfitted pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestPipeline {
    pub params: ForestParams,
    pub seed: u64,
}

impl Default for ForestPipeline {
    fn default() -> Self {
        Self::new(ForestParams::default())
    }
}

impl ForestPipeline {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            seed: DEFAULT_SEED,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Build from a search grid point
    pub fn from_grid_point(point: &GridPoint) -> Result<Self> {
        ForestParams::from_grid_point(point).map(Self::new)
    }
}

impl Estimator for ForestPipeline {
    type Model = FittedPipeline;

    fn name(&self) -> &str {
        "random_forest"
    }

    fn fit(&self, x: &FeatureMatrix, y: &[Label]) -> Result<FittedPipeline> {
        let imputer = MedianImputer::fit(x);
        let imputed = imputer.transform(x);
        let scaler = StandardScaler::fit(&imputed);
        let scaled = scaler.transform(&imputed);
        let forest = RandomForest::fit(&scaled, y, &self.params.forest_config(self.seed))?;
        Ok(FittedPipeline {
            params: self.params,
            imputer,
            scaler,
            forest,
        })
    }
}

/// Fitted pipeline; serializable as the persisted model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    params: ForestParams,
    imputer: MedianImputer,
    scaler: StandardScaler,
    forest: RandomForest,
}

impl FittedPipeline {
    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    pub fn n_features(&self) -> usize {
        self.forest.n_features()
    }

    /// Importances paired with names, sorted descending
    ///
    /// # Errors
    ///
    /// Returns an error if `names` does not match the fitted feature count.
    pub fn feature_importances(&self, names: &[String]) -> Result<Vec<FeatureImportance>> {
        if names.len() != self.n_features() {
            return Err(EvalError::InvalidInput(format!(
                "{} feature names for a model fitted on {} features",
                names.len(),
                self.n_features()
            )));
        }
        let mut out: Vec<FeatureImportance> = names
            .iter()
            .zip(self.forest.feature_importances())
            .map(|(feature, importance)| FeatureImportance {
                feature: feature.clone(),
                importance,
            })
            .collect();
        out.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        Ok(out)
    }

    fn prepare(&self, x: &FeatureMatrix) -> FeatureMatrix {
        self.scaler.transform(&self.imputer.transform(x))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Scorer for FittedPipeline {
    fn predict(&self, x: &FeatureMatrix) -> Vec<Label> {
        self.forest.predict(&self.prepare(x))
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Option<Vec<f64>> {
        self.forest.predict_proba(&self.prepare(x))
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.forest.n_features())
    }
}
