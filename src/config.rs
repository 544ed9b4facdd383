//! Study configuration
//!
//! A TOML file with optional `columns`, `forest`, `search`, `logistic` and
//! `output` sections. Every field has a default, so an empty file (or no file)
//! reproduces the standard study setup. Environment variables prefixed with
//! `TLX_` override file values, using `__` as the section separator
//! (e.g. `TLX_SEARCH__N_JOBS=4`).

use crate::dataset::ColumnSpec;
use crate::error::Result;
use crate::model::forest::DEFAULT_SEED;
use crate::model::{ForestParams, ForestPipeline, LogisticRegression};
use crate::search::{default_forest_grid, ParamGrid};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level study configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub columns: ColumnSpec,
    pub forest: ForestConfig,
    pub search: SearchConfig,
    pub logistic: LogisticRegression,
    pub output: OutputConfig,
}

/// Forest pipeline settings used when no search is run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        let params = ForestParams::default();
        Self {
            n_estimators: params.n_estimators,
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            seed: DEFAULT_SEED,
        }
    }
}

impl ForestConfig {
    pub fn params(&self) -> ForestParams {
        ForestParams {
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
        }
    }

    pub fn pipeline(&self) -> ForestPipeline {
        ForestPipeline::new(self.params()).with_seed(self.seed)
    }
}

/// Grouped grid search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Run the search before training the final model
    pub enabled: bool,
    /// Worker threads for grid points (0 = all cores)
    pub n_jobs: usize,
    pub grid: ParamGrid,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            n_jobs: 0,
            grid: default_forest_grid(),
        }
    }
}

/// Where result files are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
        }
    }
}

impl StudyConfig {
    /// Load configuration from a TOML file, applying `TLX_*` overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Defaults plus `TLX_*` environment overrides, for runs without a file
    pub fn from_env() -> Result<Self> {
        let config = Config::builder().add_source(env_source()).build()?;
        Ok(config.try_deserialize()?)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("TLX")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
