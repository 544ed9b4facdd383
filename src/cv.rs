//! Grouped cross-validation
//!
//! Leave-one-group-out splitting: every distinct group value (participant) is
//! held out exactly once, with all remaining rows used for training. Rows of the
//! held-out group never appear in that fold's training set.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One train/test partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    /// Fold number (0-indexed)
    pub index: usize,
    /// Group held out as the test set
    pub left_out: String,
    /// Training row indices (ascending)
    pub train: Vec<usize>,
    /// Test row indices (ascending)
    pub test: Vec<usize>,
}

/// Order in which groups are held out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOrder {
    /// Sorted unique values; numeric order when every id is an integer
    #[default]
    Sorted,
    /// Order of first appearance in the dataset
    FirstSeen,
}

/// Leave-one-group-out splitter
#[derive(Debug, Clone, Copy, Default)]
pub struct LeaveOneGroupOut {
    order: GroupOrder,
}

impl LeaveOneGroupOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_order(order: GroupOrder) -> Self {
        Self { order }
    }

    /// Distinct groups in hold-out order
    pub fn ordered_groups<S: AsRef<str>>(&self, groups: &[S]) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        let mut index: HashSet<&str> = HashSet::new();
        for g in groups {
            let g = g.as_ref();
            if index.insert(g) {
                seen.push(g.to_string());
            }
        }
        if self.order == GroupOrder::Sorted {
            sort_group_ids(&mut seen);
        }
        seen
    }

    /// Number of folds a split of `groups` would produce
    pub fn n_splits<S: AsRef<str>>(&self, groups: &[S]) -> usize {
        self.ordered_groups(groups).len()
    }

    /// Produce every fold
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::InsufficientGroups`] when fewer than two distinct
    /// groups are present.
    pub fn split<S: AsRef<str>>(&self, groups: &[S]) -> Result<Vec<Fold>> {
        let ordered = self.ordered_groups(groups);
        if ordered.len() < 2 {
            return Err(EvalError::InsufficientGroups(ordered.len()));
        }

        let folds = ordered
            .into_iter()
            .enumerate()
            .map(|(index, left_out)| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..groups.len()).partition(|&i| groups[i].as_ref() == left_out);
                Fold {
                    index,
                    left_out,
                    train,
                    test,
                }
            })
            .collect();
        Ok(folds)
    }
}

/// Convenience wrapper using the default (sorted) group order
pub fn leave_one_group_out<S: AsRef<str>>(groups: &[S]) -> Result<Vec<Fold>> {
    LeaveOneGroupOut::new().split(groups)
}

fn sort_group_ids(ids: &mut [String]) {
    let all_numeric = ids.iter().all(|g| g.trim().parse::<i64>().is_ok());
    if all_numeric {
        ids.sort_by_key(|g| g.trim().parse::<i64>().unwrap_or(i64::MAX));
    } else {
        ids.sort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn groups(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_three_participants_three_folds() {
        let g = groups(&["A", "A", "A", "B", "B", "B", "C", "C", "C"]);
        let folds = leave_one_group_out(&g).unwrap();
        assert_eq!(folds.len(), 3);
        for fold in &folds {
            assert_eq!(fold.test.len(), 3);
            assert_eq!(fold.train.len(), 6);
        }
        let left_out: Vec<&str> = folds.iter().map(|f| f.left_out.as_str()).collect();
        assert_eq!(left_out, vec!["A", "B", "C"]);
        assert_eq!(folds[1].test, vec![3, 4, 5]);
        assert_eq!(folds[1].train, vec![0, 1, 2, 6, 7, 8]);
    }

    #[test]
    fn test_interleaved_groups() {
        let g = groups(&["B", "A", "B", "A", "C"]);
        let folds = leave_one_group_out(&g).unwrap();
        assert_eq!(folds[0].left_out, "A");
        assert_eq!(folds[0].test, vec![1, 3]);
        assert_eq!(folds[2].left_out, "C");
        assert_eq!(folds[2].test, vec![4]);
    }

    #[test]
    fn test_numeric_ids_sorted_numerically() {
        let g = groups(&["10", "2", "1", "2"]);
        let order = LeaveOneGroupOut::new().ordered_groups(&g);
        assert_eq!(order, vec!["1", "2", "10"]);
    }

    #[test]
    fn test_first_seen_order() {
        let g = groups(&["10", "2", "1", "2"]);
        let order = LeaveOneGroupOut::with_order(GroupOrder::FirstSeen).ordered_groups(&g);
        assert_eq!(order, vec!["10", "2", "1"]);
    }

    #[test]
    fn test_single_group_rejected() {
        let g = groups(&["A", "A"]);
        let err = leave_one_group_out(&g).unwrap_err();
        assert!(matches!(err, EvalError::InsufficientGroups(1)));

        let empty: Vec<String> = Vec::new();
        assert!(matches!(
            leave_one_group_out(&empty).unwrap_err(),
            EvalError::InsufficientGroups(0)
        ));
    }

    #[test]
    fn test_split_is_deterministic() {
        let g = groups(&["x", "y", "x", "z", "y"]);
        let a = leave_one_group_out(&g).unwrap();
        let b = leave_one_group_out(&g).unwrap();
        assert_eq!(a, b);
    }
}
