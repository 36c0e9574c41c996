//! Random forest classifier for buggy-commit prediction
//!
//! Thin wrapper over aprender's [`RandomForestClassifier`] that speaks the
//! crate's row format (`Vec<f64>` per commit, `bool` labels) and keeps the
//! hyper-parameters and feature importances next to the fitted ensemble.
//!
//! The forest probability of a row is the fraction of trees voting buggy.
//! Features are handed to aprender as `f32`.

use aprender::primitives::Matrix;
use aprender::tree::RandomForestClassifier;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForestError {
    #[error("Cannot fit on an empty training set")]
    EmptyInput,

    #[error("Got {samples} samples but {labels} labels")]
    LengthMismatch { samples: usize, labels: usize },

    #[error("Sample {row} has {actual} features, expected {expected}")]
    InconsistentWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid hyper-parameter: {0}")]
    InvalidParameter(String),

    #[error("Classifier error: {0}")]
    Classifier(String),
}

pub type Result<T> = std::result::Result<T, ForestError>;

/// Forest hyper-parameters
///
/// Unknown keys in a `--params` object are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperParameters {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum tree depth (root at depth 0), unlimited when `None`
    pub max_depth: Option<usize>,
    /// Seed for reproducible forests
    pub random_state: Option<u64>,
}

impl Default for HyperParameters {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            random_state: None,
        }
    }
}

impl HyperParameters {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(ForestError::InvalidParameter(
                "n_estimators must be >= 1".to_string(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(ForestError::InvalidParameter(
                "max_depth must be >= 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    fn classifier(&self) -> RandomForestClassifier {
        let mut classifier = RandomForestClassifier::new(self.n_estimators);
        if let Some(depth) = self.max_depth {
            classifier = classifier.with_max_depth(depth);
        }
        if let Some(seed) = self.random_state {
            classifier = classifier.with_random_state(seed);
        }
        classifier
    }
}

/// Row-major `f32` matrix from equal-width rows
fn to_matrix(rows: &[Vec<f64>], width: usize) -> Result<Matrix<f32>> {
    let data: Vec<f32> = rows
        .iter()
        .flat_map(|row| row.iter().map(|&v| v as f32))
        .collect();
    Matrix::from_vec(rows.len(), width, data).map_err(|e| ForestError::Classifier(e.to_string()))
}

/// Fitted random forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    classifier: RandomForestClassifier,
    n_features: usize,
    params: HyperParameters,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    /// Fit a forest on `samples` (rows of equal width) and binary `labels`
    pub fn fit(samples: &[Vec<f64>], labels: &[bool], params: &HyperParameters) -> Result<Self> {
        params.validate()?;

        if samples.is_empty() {
            return Err(ForestError::EmptyInput);
        }
        if samples.len() != labels.len() {
            return Err(ForestError::LengthMismatch {
                samples: samples.len(),
                labels: labels.len(),
            });
        }

        let n_features = samples[0].len();
        if let Some((row, sample)) = samples
            .iter()
            .enumerate()
            .find(|(_, s)| s.len() != n_features)
        {
            return Err(ForestError::InconsistentWidth {
                row,
                expected: n_features,
                actual: sample.len(),
            });
        }

        let x = to_matrix(samples, n_features)?;
        let y: Vec<usize> = labels.iter().map(|&buggy| usize::from(buggy)).collect();

        let mut classifier = params.classifier();
        classifier
            .fit(&x, &y)
            .map_err(|e| ForestError::Classifier(e.to_string()))?;

        let feature_importances = classifier
            .feature_importances()
            .map(|imp| imp.into_iter().map(f64::from).collect())
            .unwrap_or_else(|| vec![0.0; n_features]);

        Ok(RandomForest {
            classifier,
            n_features,
            params: params.clone(),
            feature_importances,
        })
    }

    /// Probability of the positive class per row
    ///
    /// Rows must already have `n_features` columns. A forest trained on a
    /// single clean class has no positive column and scores every row 0.
    pub fn probabilities(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter()
            .map(|row| {
                let x = to_matrix(std::slice::from_ref(row), self.n_features)?;
                let proba = self.classifier.predict_proba(&x);
                Ok(if proba.n_cols() > 1 {
                    f64::from(proba.get(0, 1))
                } else {
                    0.0
                })
            })
            .collect()
    }

    /// False for a deserialized forest without trees
    pub fn is_fitted(&self) -> bool {
        self.classifier.feature_importances().is_some()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.params.n_estimators
    }

    pub fn params(&self) -> &HyperParameters {
        &self.params
    }

    /// Normalised impurity-decrease importance per feature (sums to 1 when
    /// any tree split)
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}
