//! Leave-one-user-out evaluation runners
//!
//! Two modes share the same fold loop:
//! - **refit**: a fresh model is trained on every fold's training rows, with
//!   the fit-or-fallback policy absorbing training failures;
//! - **prefit**: an already fitted model scores every held-out group as-is.

use crate::aggregate::{FoldAggregator, LouoReport};
use crate::cv::{Fold, LeaveOneGroupOut};
use crate::dataset::Dataset;
use crate::error::{EvalError, Result};
use crate::model::{fit_or_fallback, Estimator, LogisticRegression, MajorityClassifier, Scorer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Runs leave-one-group-out evaluations over a dataset
#[derive(Debug, Clone, Copy, Default)]
pub struct LouoEvaluator {
    splitter: LeaveOneGroupOut,
}

impl LouoEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_splitter(splitter: LeaveOneGroupOut) -> Self {
        Self { splitter }
    }

    /// Folds for `dataset`, one per distinct group
    pub fn folds(&self, dataset: &Dataset) -> Result<Vec<Fold>> {
        self.splitter.split(dataset.groups())
    }

    /// Train a fresh model per fold and score the held-out group
    ///
    /// # Errors
    ///
    /// Fails only on input errors (fewer than two groups). Training failures
    /// fall back to a constant model and are listed in `fallback_folds`.
    pub fn refit<E: Estimator>(&self, estimator: &E, dataset: &Dataset) -> Result<LouoReport> {
        let folds = self.folds(dataset)?;
        info!(
            model = estimator.name(),
            folds = folds.len(),
            rows = dataset.n_rows(),
            "starting leave-one-user-out evaluation (refit)"
        );
        let report = refit_folds(estimator, dataset, &folds);
        log_summary(&report);
        Ok(report)
    }

    /// Score every held-out group with an already fitted model
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::InvalidInput`] when the model was fitted on a
    /// different number of features than `dataset` has.
    pub fn prefit<S: Scorer>(&self, model: &S, name: &str, dataset: &Dataset) -> Result<LouoReport> {
        let width = dataset.features().n_features();
        if let Some(expected) = model.n_features().filter(|&n| n != width) {
            return Err(EvalError::InvalidInput(format!(
                "model {name} was fitted on {expected} features, dataset has {width}"
            )));
        }
        let folds = self.folds(dataset)?;
        info!(
            model = name,
            folds = folds.len(),
            rows = dataset.n_rows(),
            "starting leave-one-user-out evaluation (prefit)"
        );
        let mut agg = FoldAggregator::new();
        for fold in &folds {
            let (x_test, y_test) = dataset.select(&fold.test);
            let pred = model.predict(&x_test);
            let score = model.score(&x_test);
            agg.push(
                fold.index,
                &fold.left_out,
                &y_test,
                &pred,
                score.as_deref(),
                false,
            );
        }
        let report = agg.finish(name);
        log_summary(&report);
        Ok(report)
    }
}

/// Refit loop over precomputed folds; shared with the grid search
pub(crate) fn refit_folds<E: Estimator>(
    estimator: &E,
    dataset: &Dataset,
    folds: &[Fold],
) -> LouoReport {
    let mut agg = FoldAggregator::new();
    for fold in folds {
        let (x_train, y_train) = dataset.select(&fold.train);
        let (x_test, y_test) = dataset.select(&fold.test);

        let outcome = fit_or_fallback(estimator, &x_train, &y_train);
        let pred = outcome.predict(&x_test);
        let score = outcome.score(&x_test);
        let record = agg.push(
            fold.index,
            &fold.left_out,
            &y_test,
            &pred,
            score.as_deref(),
            outcome.is_fallback(),
        );
        debug!(
            model = estimator.name(),
            fold = fold.index,
            left_out = %fold.left_out,
            test_rows = fold.test.len(),
            f1 = record.f1_pos,
            "fold evaluated"
        );
    }
    agg.finish(estimator.name())
}

fn log_summary(report: &LouoReport) {
    info!(
        model = %report.model,
        folds = report.n_folds(),
        fallback_folds = report.fallback_folds.len(),
        accuracy = report.summary.accuracy.mean,
        f1_pos = report.summary.f1_pos.mean,
        roc_auc = report.summary.roc_auc.mean,
        "evaluation complete"
    );
}

/// Majority and logistic-regression baseline reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineReports {
    pub majority: LouoReport,
    pub logistic: LouoReport,
}

/// Evaluate both baselines under leave-one-user-out
pub fn evaluate_baselines(dataset: &Dataset, logistic: &LogisticRegression) -> Result<BaselineReports> {
    let evaluator = LouoEvaluator::new();
    Ok(BaselineReports {
        majority: evaluator.refit(&MajorityClassifier, dataset)?,
        logistic: evaluator.refit(logistic, dataset)?,
    })
}

/// Refit evaluation with the default splitter
pub fn evaluate_refit<E: Estimator>(estimator: &E, dataset: &Dataset) -> Result<LouoReport> {
    LouoEvaluator::new().refit(estimator, dataset)
}

/// Prefit evaluation with the default splitter
pub fn evaluate_prefit<S: Scorer>(model: &S, name: &str, dataset: &Dataset) -> Result<LouoReport> {
    LouoEvaluator::new().prefit(model, name, dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::FeatureMatrix;
    use crate::model::{ConstantModel, ForestParams, ForestPipeline};
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn dataset(labels: Vec<u8>, groups: &[&str]) -> Dataset {
        let n = labels.len();
        let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
        Dataset::new(
            vec!["f".into()],
            FeatureMatrix::new(values, n, 1).unwrap(),
            labels,
            groups.iter().map(|g| g.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_majority_three_by_three() {
        let ds = dataset(
            vec![0, 1, 1, 0, 0, 1, 1, 1, 0],
            &["A", "A", "A", "B", "B", "B", "C", "C", "C"],
        );
        let report = evaluate_refit(&MajorityClassifier, &ds).unwrap();
        assert_eq!(report.n_folds(), 3);
        let left_out: Vec<&str> = report.folds.iter().map(|f| f.left_out.as_str()).collect();
        assert_eq!(left_out, vec!["A", "B", "C"]);

        // holding out A leaves [0,0,1,1,1,0]: a 3/3 tie, so majority 0
        assert_relative_eq!(report.folds[0].accuracy, 1.0 / 3.0);
        // holding out B leaves [0,1,1,1,1,0]: majority 1
        assert_relative_eq!(report.folds[1].accuracy, 1.0 / 3.0);
        assert!(report.fallback_folds.is_empty());
        // constant scores tie every pair
        assert_relative_eq!(report.folds[1].roc_auc, 0.5);
    }

    #[test]
    fn test_logistic_falls_back_on_single_class_training() {
        // training rows for held-out "A" are all 0
        let ds = dataset(vec![1, 1, 0, 0, 0, 0], &["A", "A", "B", "B", "C", "C"]);
        let report = evaluate_refit(&LogisticRegression::default(), &ds).unwrap();
        assert_eq!(report.fallback_folds, vec![0]);
        assert_eq!(report.folds[0].accuracy, 0.0);
        assert_eq!(report.folds[0].f1_pos, 0.0);
        assert!(report.folds[0].roc_auc.is_nan());
        assert_eq!(
            report.misclassifications.iter().filter(|m| m.fold == 0).count(),
            2
        );
    }

    #[test]
    fn test_prefit_does_not_refit() {
        let ds = dataset(vec![0, 1, 0, 1], &["1", "1", "2", "2"]);
        let report = evaluate_prefit(&ConstantModel::new(1), "const", &ds).unwrap();
        assert_eq!(report.model, "const");
        assert!(report.folds.iter().all(|f| f.recall_pos == 1.0));
        assert_eq!(report.misclassifications.len(), 2);
    }

    #[test]
    fn test_prefit_rejects_feature_count_mismatch() {
        let narrow = dataset(vec![0, 1, 0, 1], &["1", "1", "2", "2"]);
        let model = ForestPipeline::new(ForestParams {
            n_estimators: 5,
            ..ForestParams::default()
        })
        .fit(narrow.features(), narrow.labels())
        .unwrap();

        let wide = Dataset::new(
            vec!["f".into(), "g".into()],
            FeatureMatrix::from_rows(&[
                vec![0.0, 1.0],
                vec![1.0, 0.0],
                vec![2.0, 1.0],
                vec![3.0, 0.0],
            ])
            .unwrap(),
            vec![0, 1, 0, 1],
            vec!["1".into(), "1".into(), "2".into(), "2".into()],
        )
        .unwrap();
        assert!(matches!(
            evaluate_prefit(&model, "rf", &wide),
            Err(EvalError::InvalidInput(_))
        ));
        assert!(evaluate_prefit(&model, "rf", &narrow).is_ok());
        // models without a fixed input width are accepted
        assert!(evaluate_prefit(&ConstantModel::new(0), "const", &wide).is_ok());
    }

    #[test]
    fn test_single_group_is_input_error() {
        let ds = dataset(vec![0, 1], &["A", "A"]);
        assert!(matches!(
            evaluate_refit(&MajorityClassifier, &ds),
            Err(EvalError::InsufficientGroups(1))
        ));
    }

    #[test]
    fn test_baselines_report_both_models() {
        let ds = dataset(vec![0, 1, 0, 1, 0, 1], &["1", "1", "2", "2", "3", "3"]);
        let reports = evaluate_baselines(&ds, &LogisticRegression::default()).unwrap();
        assert_eq!(reports.majority.model, "majority");
        assert_eq!(reports.logistic.model, "logreg");
        assert_eq!(reports.logistic.n_folds(), 3);
    }
}
