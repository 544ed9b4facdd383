//! Synheart TLX - Leave-one-user-out workload classification engine
//!
//! Predicts high vs. low subjective workload (NASA-TLX) from behavioral
//! features under a leave-one-user-out protocol: every participant is held out
//! once while models train on everyone else.
//!
//! ## Modules
//!
//! - **Evaluation core**: grouped cross-validation ([`cv`]), per-fold metrics
//!   ([`metrics`]), fold aggregation ([`aggregate`]), evaluation runners
//!   ([`evaluate`]) and the grouped hyperparameter search ([`search`])
//! - **Models**: majority baseline, logistic regression and the
//!   impute → scale → random forest pipeline ([`model`])
//! - **Study flows**: baselines and train + evaluate ([`pipeline`]), with
//!   configuration ([`config`]) and result files ([`report`])

pub mod aggregate;
pub mod config;
pub mod cv;
pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod search;
pub mod types;

pub use aggregate::{FoldAggregator, LouoReport};
pub use config::StudyConfig;
pub use cv::{leave_one_group_out, Fold, LeaveOneGroupOut};
pub use dataset::{ColumnSpec, Dataset, FeatureMatrix};
pub use error::{EvalError, Result};
pub use evaluate::{evaluate_baselines, evaluate_prefit, evaluate_refit, BaselineReports, LouoEvaluator};
pub use metrics::{evaluate_fold, roc_auc};
pub use model::{Estimator, FittedPipeline, ForestPipeline, Scorer};
pub use pipeline::{run_baselines, train_and_evaluate, TrainOptions, TrainedStudy};
pub use search::{default_forest_grid, GridPoint, GroupedGridSearch, ParamGrid, ParamValue};
pub use types::{FoldRecord, FoldScores, Label, Metric, MetricSummary, Misclassification};

/// Crate version recorded in run manifests
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name recorded in run manifests
pub const PRODUCER_NAME: &str = "synheart-tlx";
