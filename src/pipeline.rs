//! Study orchestration
//!
//! This module provides the high-level flows of a workload study:
//! - [`run_baselines`]: majority and logistic-regression baselines under LOUO;
//! - [`train_and_evaluate`]: optional grouped search, final forest pipeline fit
//!   on every row, LOUO evaluation and feature importances.
//!
//! Each flow returns plain result structs; [`ReportWriter`] persists them.

use crate::aggregate::LouoReport;
use crate::config::StudyConfig;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::evaluate::{evaluate_baselines, BaselineReports, LouoEvaluator};
use crate::model::{Estimator, FittedPipeline, ForestParams, ForestPipeline, LogisticRegression};
use crate::report::{ReportWriter, BEST_PARAMS_FILE, MODEL_FILE};
use crate::search::{BestParams, CandidateResult, GroupedGridSearch, ParamGrid};
use crate::types::FeatureImportance;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Name under which the forest pipeline is reported
pub const FOREST_MODEL_NAME: &str = "random_forest";

/// How the final model is scored under LOUO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    /// Score the model fitted on all rows against every held-out group
    #[default]
    Prefit,
    /// Refit the chosen configuration inside every fold
    Refit,
}

/// Grouped search settings for [`train_and_evaluate`]
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub grid: ParamGrid,
    pub n_jobs: usize,
}

/// Options for [`train_and_evaluate`]
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOptions {
    /// Pipeline used when no search runs; its seed is used by the search too
    pub forest: ForestPipeline,
    pub search: Option<SearchOptions>,
    pub evaluation: EvaluationMode,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            forest: ForestPipeline::default(),
            search: None,
            evaluation: EvaluationMode::Prefit,
        }
    }
}

impl TrainOptions {
    pub fn from_config(config: &StudyConfig) -> Self {
        Self {
            forest: config.forest.pipeline(),
            search: config.search.enabled.then(|| SearchOptions {
                grid: config.search.grid.clone(),
                n_jobs: config.search.n_jobs,
            }),
            evaluation: EvaluationMode::Prefit,
        }
    }
}

/// Search results kept alongside the trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSummary {
    pub best: BestParams,
    pub candidates: Vec<CandidateResult>,
}

/// Everything produced by [`train_and_evaluate`]
#[derive(Debug, Clone)]
pub struct TrainedStudy {
    pub model: FittedPipeline,
    pub params: ForestParams,
    pub search: Option<SearchSummary>,
    pub evaluation: LouoReport,
    pub importances: Vec<FeatureImportance>,
}

impl TrainedStudy {
    /// Write `rf_*` tables, importances, the model and (if searched) best params
    pub fn write(&self, writer: &mut ReportWriter) -> Result<()> {
        writer.louo_report("rf", &self.evaluation)?;
        writer.misclassifications("rf", &self.evaluation)?;
        writer.feature_importances(&self.importances)?;
        writer.json(MODEL_FILE, &self.model)?;
        if let Some(search) = &self.search {
            writer.json(BEST_PARAMS_FILE, &search.best)?;
        }
        Ok(())
    }
}

/// Evaluate both baselines under LOUO
pub fn run_baselines(dataset: &Dataset, logistic: &LogisticRegression) -> Result<BaselineReports> {
    info!(
        rows = dataset.n_rows(),
        features = dataset.feature_names().len(),
        groups = dataset.n_groups(),
        "running baselines"
    );
    evaluate_baselines(dataset, logistic)
}

/// Write `baseline_majority_*` and `baseline_logreg_*` tables
pub fn write_baselines(reports: &BaselineReports, writer: &mut ReportWriter) -> Result<()> {
    writer.louo_report("baseline_majority", &reports.majority)?;
    writer.louo_report("baseline_logreg", &reports.logistic)
}

/// Grouped grid search over forest pipelines
pub fn search_forest(
    dataset: &Dataset,
    options: &SearchOptions,
    seed: u64,
) -> Result<(FittedPipeline, SearchSummary)> {
    let outcome = GroupedGridSearch::new(options.grid.clone(), options.n_jobs).run(dataset, |point| {
        ForestPipeline::from_grid_point(point).map(|p| p.with_seed(seed))
    })?;
    let summary = SearchSummary {
        best: outcome.best_params_record(),
        candidates: outcome.candidates,
    };
    Ok((outcome.best_model, summary))
}

/// Fit the final forest pipeline on every row and evaluate it under LOUO
pub fn train_and_evaluate(dataset: &Dataset, options: &TrainOptions) -> Result<TrainedStudy> {
    let (model, search) = match &options.search {
        Some(search_options) => {
            let (model, summary) = search_forest(dataset, search_options, options.forest.seed)?;
            (model, Some(summary))
        }
        None => {
            info!(params = ?options.forest.params, "using default forest parameters");
            (options.forest.fit(dataset.features(), dataset.labels())?, None)
        }
    };
    let params = *model.params();

    let evaluator = LouoEvaluator::new();
    let evaluation = match options.evaluation {
        EvaluationMode::Prefit => evaluator.prefit(&model, FOREST_MODEL_NAME, dataset)?,
        EvaluationMode::Refit => {
            let estimator = ForestPipeline::new(params).with_seed(options.forest.seed);
            evaluator.refit(&estimator, dataset)?
        }
    };
    let importances = model.feature_importances(dataset.feature_names())?;

    Ok(TrainedStudy {
        model,
        params,
        search,
        evaluation,
        importances,
    })
}
