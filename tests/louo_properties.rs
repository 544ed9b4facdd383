//! End-to-end and property tests for leave-one-user-out evaluation

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::HashSet;
use std::io::Write;

use synheart_tlx::model::{LogisticRegression, MajorityClassifier};
use synheart_tlx::{
    evaluate_refit, leave_one_group_out, ColumnSpec, Dataset, EvalError, FeatureMatrix,
    ForestPipeline, GroupedGridSearch, ParamGrid,
};

fn dataset_from(labels: Vec<u8>, groups: Vec<String>, features: Vec<Vec<f64>>) -> Dataset {
    let names = (0..features[0].len()).map(|i| format!("f{i}")).collect();
    Dataset::new(names, FeatureMatrix::from_rows(&features).unwrap(), labels, groups).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_folds_partition_rows(group_ids in prop::collection::vec(0u8..6, 2..60)) {
        let groups: Vec<String> = group_ids.iter().map(|g| format!("P{g}")).collect();
        let distinct: HashSet<&String> = groups.iter().collect();

        match leave_one_group_out(&groups) {
            Ok(folds) => {
                prop_assert_eq!(folds.len(), distinct.len());

                let mut tested = vec![0usize; groups.len()];
                for fold in &folds {
                    prop_assert_eq!(fold.train.len() + fold.test.len(), groups.len());
                    for &i in &fold.test {
                        prop_assert_eq!(&groups[i], &fold.left_out);
                        tested[i] += 1;
                    }
                    for &i in &fold.train {
                        prop_assert_ne!(&groups[i], &fold.left_out);
                    }
                }
                prop_assert!(tested.iter().all(|&c| c == 1));
            }
            Err(EvalError::InsufficientGroups(n)) => prop_assert_eq!(n, 1),
            Err(e) => prop_assert!(false, "unexpected error: {e}"),
        }
    }

    #[test]
    fn prop_splits_are_deterministic(group_ids in prop::collection::vec(0u16..500, 2..40)) {
        let groups: Vec<String> = group_ids.iter().map(|g| g.to_string()).collect();
        let a = leave_one_group_out(&groups);
        let b = leave_one_group_out(&groups);
        match (a, b) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(&a, &b);
                // numeric ids are held out in numeric order
                let ids: Vec<u16> = a.iter().map(|f| f.left_out.parse().unwrap()).collect();
                let mut sorted = ids.clone();
                sorted.sort_unstable();
                prop_assert_eq!(ids, sorted);
            }
            (Err(_), Err(_)) => {}
            _ => prop_assert!(false, "split outcome differed between runs"),
        }
    }

    #[test]
    fn prop_metrics_stay_in_range(
        labels in prop::collection::vec(0u8..2, 12),
        values in prop::collection::vec(-5.0f64..5.0, 12),
    ) {
        let groups: Vec<String> = (0..12).map(|i| (i % 3).to_string()).collect();
        let features = values.iter().map(|v| vec![*v]).collect();
        let ds = dataset_from(labels, groups, features);
        let report = evaluate_refit(&LogisticRegression::default(), &ds).unwrap();
        for fold in &report.folds {
            for v in [fold.accuracy, fold.precision_pos, fold.recall_pos, fold.f1_pos] {
                prop_assert!((0.0..=1.0).contains(&v));
            }
            prop_assert!(fold.roc_auc.is_nan() || (0.0..=1.0).contains(&fold.roc_auc));
        }
    }
}

#[test]
fn three_participants_majority_scenario() {
    let ds = dataset_from(
        vec![0, 1, 1, 0, 0, 1, 1, 1, 0],
        ["A", "A", "A", "B", "B", "B", "C", "C", "C"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        (0..9).map(|i| vec![i as f64]).collect(),
    );
    let report = evaluate_refit(&MajorityClassifier, &ds).unwrap();

    let left_out: Vec<&str> = report.folds.iter().map(|f| f.left_out.as_str()).collect();
    assert_eq!(left_out, vec!["A", "B", "C"]);
    let folds: Vec<usize> = report.folds.iter().map(|f| f.fold).collect();
    assert_eq!(folds, vec![0, 1, 2]);

    // training labels without A tie 3/3, so the smaller label (0) wins
    assert!((report.folds[0].accuracy - 1.0 / 3.0).abs() < 1e-12);
    assert_eq!(report.folds[0].recall_pos, 0.0);
    let total_tested: usize = report.folds.len() * 3;
    assert_eq!(total_tested, ds.n_rows());
}

#[test]
fn all_zero_training_fold_uses_fallback() {
    // holding out P1 leaves only zeros for training
    let ds = dataset_from(
        vec![1, 1, 0, 0, 0, 0, 0, 0],
        ["P1", "P1", "P2", "P2", "P3", "P3", "P4", "P4"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        (0..8).map(|i| vec![i as f64, (i % 3) as f64]).collect(),
    );
    let forest = ForestPipeline::default();
    let report = evaluate_refit(&forest, &ds).unwrap();

    assert!(report.fallback_folds.contains(&0));
    let first = &report.folds[0];
    assert_eq!(first.left_out, "P1");
    assert_eq!(first.accuracy, 0.0);
    assert_eq!(first.f1_pos, 0.0);
    assert!(first.roc_auc.is_nan());
    assert_eq!(report.n_folds(), 4);
}

#[test]
fn csv_to_report_end_to_end() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "participantId,task_id,tlx,typing_speed,error_rate").unwrap();
    let rows = [
        ("1", 20.0, 3.1, "0.01"),
        ("1", 75.0, 1.2, "0.09"),
        ("2", 30.0, 2.9, "n/a"),
        ("2", 80.0, 1.0, "0.11"),
        ("3", 10.0, 3.3, "0.02"),
        ("3", 65.0, 1.4, "0.08"),
    ];
    for (i, (p, tlx, speed, err)) in rows.iter().enumerate() {
        writeln!(file, "{p},t{i},{tlx},{speed},{err}").unwrap();
    }
    file.flush().unwrap();

    let ds = Dataset::from_csv_path(file.path(), &ColumnSpec::default()).unwrap();
    assert_eq!(ds.feature_names(), &["typing_speed".to_string(), "error_rate".to_string()]);
    assert_eq!(ds.labels(), &[0, 1, 0, 1, 0, 1]);
    assert!(ds.features().get(2, 1).is_nan());

    let report = evaluate_refit(&ForestPipeline::default(), &ds).unwrap();
    assert_eq!(report.n_folds(), 3);
    assert!(report.fallback_folds.is_empty());
    // the row with a missing error rate is imputed from its training fold
    assert!(report.summary.accuracy.mean >= 0.8);
}

#[test]
fn search_result_does_not_depend_on_worker_count() {
    let mut labels = Vec::new();
    let mut groups = Vec::new();
    let mut features = Vec::new();
    for g in 0..4 {
        for i in 0..6 {
            let label = u8::from(i % 2 == 0);
            let noise = ((g * 5 + i * 3) % 7) as f64 / 7.0;
            features.push(vec![f64::from(label) * 1.5 + noise, noise]);
            labels.push(label);
            groups.push(format!("u{g}"));
        }
    }
    let ds = dataset_from(labels, groups, features);
    let grid = ParamGrid::new()
        .with("rf__n_estimators", [5i64, 15])
        .with("rf__max_depth", [Some(1i64), None])
        .with("rf__min_samples_leaf", [1i64, 3]);

    let single = GroupedGridSearch::new(grid.clone(), 1)
        .run(&ds, ForestPipeline::from_grid_point)
        .unwrap();
    let parallel = GroupedGridSearch::new(grid, 4)
        .run(&ds, ForestPipeline::from_grid_point)
        .unwrap();

    assert_eq!(single.best_index, parallel.best_index);
    assert_eq!(single.best_params, parallel.best_params);
    assert_eq!(single.candidates, parallel.candidates);
    assert_eq!(single.best_model, parallel.best_model);

    let max = single
        .candidates
        .iter()
        .map(|c| c.mean_score)
        .fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(single.best_score, max);
    // no earlier candidate reaches the best score
    assert!(single.candidates[..single.best_index]
        .iter()
        .all(|c| c.mean_score < single.best_score));
}
