//! Prediction-only view of a fitted classifier
//!
//! Attribution and evaluation only ever ask a model for the probability that
//! a commit is buggy. [`RiskModel`] is that single capability; the in-memory
//! [`RandomForest`] and the exported [`PortableModel`] both provide it. The
//! portable model wraps the same serialized forest, so both give identical
//! results for identical rows.

use crate::forest::RandomForest;
use crate::persistence::PortableModel;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum InferenceError {
    #[error("Row {row} has {actual} features, model expects {expected}")]
    WidthMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Model has no trees")]
    EmptyModel,

    #[error("Corrupt model: {0}")]
    CorruptModel(String),
}

pub type Result<T> = std::result::Result<T, InferenceError>;

/// Probability-of-buggy oracle over feature rows in schema column order
///
/// Missing feature values are passed as `NaN`.
pub trait RiskModel {
    /// Row width the model was trained on
    fn n_features(&self) -> usize;

    /// One probability in [0, 1] per input row, same order as `rows`
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>>;

    /// Convenience wrapper for a single row
    fn predict_one(&self, row: &[f64]) -> Result<f64> {
        let mut out = self.predict(&[row.to_vec()])?;
        out.pop()
            .ok_or_else(|| InferenceError::CorruptModel("no prediction returned".to_string()))
    }
}

fn check_widths(rows: &[Vec<f64>], expected: usize) -> Result<()> {
    match rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
        Some((row, r)) => Err(InferenceError::WidthMismatch {
            row,
            expected,
            actual: r.len(),
        }),
        None => Ok(()),
    }
}

impl RiskModel for RandomForest {
    fn n_features(&self) -> usize {
        RandomForest::n_features(self)
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        if !self.is_fitted() {
            return Err(InferenceError::EmptyModel);
        }
        check_widths(rows, RandomForest::n_features(self))?;
        self.probabilities(rows)
            .map_err(|e| InferenceError::CorruptModel(e.to_string()))
    }
}

impl RiskModel for PortableModel {
    fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        let width = self.forest.n_features();
        if width != self.feature_names.len() {
            return Err(InferenceError::CorruptModel(format!(
                "forest expects {} features but {} are named",
                width,
                self.feature_names.len()
            )));
        }
        self.forest.predict(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::HyperParameters;
    use crate::persistence::ModelMetadata;

    fn forest() -> RandomForest {
        let samples: Vec<Vec<f64>> = (0..30)
            .map(|i| vec![(i % 6) as f64, ((i * 5) % 7) as f64, (i % 2) as f64])
            .collect();
        let labels: Vec<bool> = samples.iter().map(|s| s[0] + s[2] > 4.0).collect();
        let params = HyperParameters {
            n_estimators: 12,
            random_state: Some(3),
            ..HyperParameters::default()
        };
        RandomForest::fit(&samples, &labels, &params).unwrap()
    }

    fn names() -> Vec<String> {
        vec!["a".into(), "b".into(), "c".into()]
    }

    #[test]
    fn test_portable_matches_in_memory_bitwise() {
        let forest = forest();
        let portable = PortableModel::from_forest(&forest, &names(), ModelMetadata::new(30));

        let rows: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![i as f64 * 0.13, (i % 9) as f64, (i % 3) as f64 - 0.5])
            .collect();
        let a = forest.predict(&rows).unwrap();
        let b = portable.predict(&rows).unwrap();

        assert_eq!(a.len(), rows.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_predict_one() {
        let forest = forest();
        let row = vec![5.0, 1.0, 1.0];
        let all = forest.predict(&[row.clone()]).unwrap();
        assert_eq!(forest.predict_one(&row).unwrap(), all[0]);
    }

    #[test]
    fn test_width_mismatch() {
        let forest = forest();
        let err = forest.predict(&[vec![1.0, 2.0, 3.0], vec![1.0]]).unwrap_err();
        assert_eq!(
            err,
            InferenceError::WidthMismatch {
                row: 1,
                expected: 3,
                actual: 1
            }
        );

        let portable = PortableModel::from_forest(&forest, &names(), ModelMetadata::new(30));
        assert!(portable.predict(&[vec![1.0; 4]]).is_err());
    }

    #[test]
    fn test_nan_row_is_scored() {
        let forest = forest();
        let p = forest
            .predict(&[vec![f64::NAN, 1.0, f64::NAN], vec![5.0, 1.0, 1.0]])
            .unwrap();
        assert_eq!(p.len(), 2);
        assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_misnamed_portable_model() {
        let mut portable = PortableModel::from_forest(&forest(), &names(), ModelMetadata::new(30));
        portable.feature_names.pop();
        assert!(matches!(
            portable.predict(&[vec![0.0; 2]]),
            Err(InferenceError::CorruptModel(_))
        ));
    }
}
