//! Dataset preparation: from commit records to a training matrix
//!
//! Commits authored inside the prediction window (the last `ignored_days`
//! before the newest commit) are too young to have trustworthy labels. They
//! are excluded from training and form the prediction set instead.

use crate::metrics_table::CommitRecord;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum PrepareError {
    #[error("No commit metrics available")]
    NoCommits,

    #[error("No labelled commits with complete metrics before cutoff {cutoff}")]
    EmptyTrainingSet { cutoff: i64 },

    #[error(
        "With n_samples={n_samples} and test_size={test_size}, the resulting train set will be empty"
    )]
    EmptyTrainSplit { n_samples: usize, test_size: f64 },
}

pub type Result<T> = std::result::Result<T, PrepareError>;

/// Per-label row counts, serialized with the label values as keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCounts {
    #[serde(rename = "True")]
    pub buggy: usize,
    #[serde(rename = "False")]
    pub clean: usize,
}

impl LabelCounts {
    pub fn total(&self) -> usize {
        self.buggy + self.clean
    }
}

/// Feature matrix with aligned labels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    pub samples: Vec<Vec<f64>>,
    pub labels: Vec<bool>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn counts(&self) -> LabelCounts {
        let buggy = self.labels.iter().filter(|&&l| l).count();
        LabelCounts {
            buggy,
            clean: self.labels.len() - buggy,
        }
    }

    /// Rows carrying the given label
    pub fn rows_with_label(&self, label: bool) -> impl Iterator<Item = &Vec<f64>> {
        self.samples
            .iter()
            .zip(&self.labels)
            .filter(move |(_, &l)| l == label)
            .map(|(s, _)| s)
    }

    fn select(&self, indices: &[usize]) -> TrainingSet {
        TrainingSet {
            samples: indices.iter().map(|&i| self.samples[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

/// Start of the prediction window: newest author date minus `ignored_seconds`
pub fn prediction_cutoff(records: &[CommitRecord], ignored_seconds: i64) -> Result<i64> {
    records
        .iter()
        .map(|r| r.author_date)
        .max()
        .map(|latest| latest - ignored_seconds)
        .ok_or(PrepareError::NoCommits)
}

/// Build the training set
///
/// Drops rows with a missing feature or label and rows authored on or after
/// `cutoff`. If more than `max_rows` remain, keeps the `max_rows` most recent
/// (author date descending, ties in input order).
pub fn prepare(records: &[CommitRecord], cutoff: i64, max_rows: usize) -> Result<TrainingSet> {
    let mut kept: Vec<&CommitRecord> = records
        .iter()
        .filter(|r| r.is_complete() && r.author_date < cutoff)
        .collect();

    if kept.len() > max_rows {
        kept.sort_by(|a, b| b.author_date.cmp(&a.author_date));
        kept.truncate(max_rows);
    }

    if kept.is_empty() {
        return Err(PrepareError::EmptyTrainingSet { cutoff });
    }

    let mut set = TrainingSet::default();
    for record in kept {
        if let (Some(features), Some(label)) = (record.feature_vector(), record.label) {
            set.samples.push(features);
            set.labels.push(label);
        }
    }

    tracing::debug!(
        "Prepared {} training rows before cutoff {} ({} buggy)",
        set.len(),
        cutoff,
        set.counts().buggy
    );

    Ok(set)
}

/// Commits inside the prediction window, in input order
pub fn prediction_set(records: &[CommitRecord], cutoff: i64) -> Vec<CommitRecord> {
    records
        .iter()
        .filter(|r| r.author_date >= cutoff)
        .cloned()
        .collect()
}

/// Shuffle and split into (train, test)
///
/// The test part gets `ceil(test_size * n)` rows, the train part the rest.
pub fn train_test_split(
    set: &TrainingSet,
    test_size: f64,
    seed: u64,
) -> Result<(TrainingSet, TrainingSet)> {
    let n = set.len();
    let n_test = (test_size * n as f64).ceil() as usize;
    let n_train = n.saturating_sub(n_test);

    if n_train == 0 || n_test == 0 {
        return Err(PrepareError::EmptyTrainSplit {
            n_samples: n,
            test_size,
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut permutation: Vec<usize> = (0..n).collect();
    permutation.shuffle(&mut rng);

    let (test_idx, train_idx) = permutation.split_at(n_test);
    Ok((set.select(train_idx), set.select(test_idx)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, date: i64, value: Option<f64>, label: Option<bool>) -> CommitRecord {
        CommitRecord {
            commit_id: id.to_string(),
            author_date: date,
            metrics: vec![Some(1.0), value],
            label,
        }
    }

    #[test]
    fn test_prediction_cutoff() {
        let records = vec![
            record("a", 100, Some(1.0), Some(true)),
            record("b", 500, Some(1.0), Some(false)),
        ];
        assert_eq!(prediction_cutoff(&records, 50), Ok(450));
        assert_eq!(prediction_cutoff(&[], 50), Err(PrepareError::NoCommits));
    }

    #[test]
    fn test_prepare_filters_missing_and_recent() {
        let records = vec![
            record("ok", 10, Some(2.0), Some(true)),
            record("no-label", 11, Some(2.0), None),
            record("no-value", 12, None, Some(false)),
            record("at-cutoff", 100, Some(2.0), Some(false)),
            record("after", 150, Some(2.0), Some(false)),
            record("ok2", 20, Some(3.0), Some(false)),
        ];

        let set = prepare(&records, 100, 10).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.samples, vec![vec![1.0, 2.0], vec![1.0, 3.0]]);
        assert_eq!(set.labels, vec![true, false]);
        assert_eq!(set.counts(), LabelCounts { buggy: 1, clean: 1 });
    }

    #[test]
    fn test_prepare_keeps_most_recent_over_ceiling() {
        let records: Vec<_> = (0..10)
            .map(|i| record(&format!("c{}", i), i, Some(i as f64), Some(i % 2 == 0)))
            .collect();

        let set = prepare(&records, 1_000, 3).unwrap();
        assert_eq!(set.len(), 3);
        // Sorted by date descending before truncation
        let values: Vec<f64> = set.samples.iter().map(|s| s[1]).collect();
        assert_eq!(values, vec![9.0, 8.0, 7.0]);
    }

    #[test]
    fn test_prepare_empty_is_error() {
        let records = vec![record("late", 200, Some(1.0), Some(true))];
        assert_eq!(
            prepare(&records, 100, 10),
            Err(PrepareError::EmptyTrainingSet { cutoff: 100 })
        );
    }

    #[test]
    fn test_prediction_set() {
        let records = vec![
            record("old", 10, Some(1.0), Some(true)),
            record("edge", 100, None, None),
            record("new", 101, Some(1.0), None),
        ];
        let ids: Vec<_> = prediction_set(&records, 100)
            .into_iter()
            .map(|r| r.commit_id)
            .collect();
        assert_eq!(ids, vec!["edge", "new"]);
    }

    #[test]
    fn test_split_sizes_and_coverage() {
        let set = TrainingSet {
            samples: (0..25).map(|i| vec![i as f64]).collect(),
            labels: (0..25).map(|i| i % 3 == 0).collect(),
        };
        let (train, test) = train_test_split(&set, 0.1, 42).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 22);

        let mut all: Vec<f64> = train.samples.iter().chain(&test.samples).map(|s| s[0]).collect();
        all.sort_by(f64::total_cmp);
        assert_eq!(all, (0..25).map(|i| i as f64).collect::<Vec<_>>());

        // Labels travel with their rows
        for (s, l) in train.samples.iter().zip(&train.labels) {
            assert_eq!(*l, (s[0] as usize) % 3 == 0);
        }
    }

    #[test]
    fn test_split_is_seeded() {
        let set = TrainingSet {
            samples: (0..30).map(|i| vec![i as f64]).collect(),
            labels: vec![false; 30],
        };
        let a = train_test_split(&set, 0.1, 42).unwrap();
        let b = train_test_split(&set, 0.1, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_split_too_small() {
        let set = TrainingSet {
            samples: vec![vec![1.0]],
            labels: vec![true],
        };
        assert!(matches!(
            train_test_split(&set, 0.1, 42),
            Err(PrepareError::EmptyTrainSplit { n_samples: 1, .. })
        ));
        assert!(train_test_split(&TrainingSet::default(), 0.1, 42).is_err());
    }

    #[test]
    fn test_label_counts_json_keys() {
        let json = serde_json::to_string(&LabelCounts { buggy: 2, clean: 5 }).unwrap();
        assert_eq!(json, r#"{"True":2,"False":5}"#);
    }
}
