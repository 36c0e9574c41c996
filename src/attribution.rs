//! Per-dimension risk attribution
//!
//! Decomposes a commit's predicted risk into contributions of the schema's
//! dimensions, relative to a baseline (median) commit.
//!
//! # Algorithm Overview
//!
//! For every commit and every dimension `D`:
//!
//! 1. Copy the commit's row and reset every feature outside `D` to the
//!    baseline value, so only `D` varies.
//! 2. The raw lift of `D` is `(p_D - p_base) / p_base`, where `p_D` is the
//!    model's probability for the modified row and `p_base` the probability
//!    of the baseline commit (`medians_score`).
//!
//! The raw lifts of a commit are shifted by `|min(min_lift, 0)|` so none is
//! negative, then rescaled so they sum to the commit's own score:
//! `contribution_D = adjusted_D / sum(adjusted) * score`.
//!
//! A zero `medians_score` or a zero adjusted total makes every contribution
//! of the affected commit 0. Any non-finite contribution is replaced by 0.
//!
//! The model is a black box: only [`RiskModel::predict`] is used, so any
//! backend can be attributed without access to its internals.

use crate::inference::{InferenceError, RiskModel};
use crate::metrics_table::CommitRecord;
use crate::schema::FeatureSchema;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum AttributionError {
    #[error("Baseline has {actual} values, schema has {expected} features")]
    BaselineWidth { expected: usize, actual: usize },

    #[error("Baseline is missing feature '{0}'")]
    MissingBaselineFeature(String),

    #[error("Commit '{commit}' has {actual} features, schema has {expected}")]
    RowWidth {
        commit: String,
        expected: usize,
        actual: usize,
    },

    #[error("Model returned {actual} predictions for {expected} rows")]
    PredictionCount { expected: usize, actual: usize },

    #[error("Model prediction failed: {0}")]
    Inference(#[from] InferenceError),
}

pub type Result<T> = std::result::Result<T, AttributionError>;

/// Reference commit: one value per schema feature
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineVector {
    names: Vec<String>,
    values: Vec<f64>,
}

impl BaselineVector {
    /// Baseline from values in schema column order
    pub fn new(schema: &FeatureSchema, values: Vec<f64>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(AttributionError::BaselineWidth {
                expected: schema.len(),
                actual: values.len(),
            });
        }
        Ok(Self {
            names: schema.features().to_vec(),
            values,
        })
    }

    /// Baseline from a feature-name map; extra keys are ignored
    pub fn from_map(schema: &FeatureSchema, map: &HashMap<String, f64>) -> Result<Self> {
        let values = schema
            .features()
            .iter()
            .map(|f| {
                map.get(f)
                    .copied()
                    .ok_or_else(|| AttributionError::MissingBaselineFeature(f.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(schema, values)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, feature: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == feature)
            .map(|i| self.values[i])
    }
}

impl Serialize for BaselineVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.names.iter().zip(&self.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Risk score of one commit and its per-dimension decomposition
#[derive(Debug, Clone, PartialEq)]
pub struct AttributionResult {
    pub commit_id: String,
    /// Model probability that the commit is buggy
    pub score: f64,
    /// (dimension, contribution) in schema dimension order
    pub contributions: Vec<(String, f64)>,
}

impl AttributionResult {
    pub fn contribution(&self, dimension: &str) -> Option<f64> {
        self.contributions
            .iter()
            .find(|(d, _)| d == dimension)
            .map(|(_, v)| *v)
    }

    /// Sum of all dimension contributions
    pub fn total(&self) -> f64 {
        self.contributions.iter().map(|(_, v)| v).sum()
    }
}

/// Serialized flat: `{<dimension>: value, ..., "score": s, "commit_id": id}`
impl Serialize for AttributionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.contributions.len() + 2))?;
        for (dimension, value) in &self.contributions {
            map.serialize_entry(dimension, value)?;
        }
        map.serialize_entry("score", &self.score)?;
        map.serialize_entry("commit_id", &self.commit_id)?;
        map.end()
    }
}

/// Shift raw lifts to be non-negative and rescale them to sum to `score`
///
/// NaN lifts are skipped when taking the minimum and the total. A zero total
/// yields all-zero contributions, and non-finite contributions become 0.
pub fn redistribute(raw_lifts: &[f64], score: f64) -> Vec<f64> {
    let min_raw = raw_lifts
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))));

    // All-NaN rows have no defined minimum; the shift is undefined too
    let shift = match min_raw {
        Some(m) if m > 0.0 => 0.0,
        Some(m) => m.abs(),
        None => f64::NAN,
    };

    let adjusted: Vec<f64> = raw_lifts.iter().map(|v| v + shift).collect();
    let total: f64 = adjusted.iter().filter(|v| !v.is_nan()).sum();

    if total == 0.0 {
        return vec![0.0; raw_lifts.len()];
    }

    adjusted
        .iter()
        .map(|a| finite_or_zero(a / total * score))
        .collect()
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Attribution over a fixed model, schema and baseline
pub struct AttributionEngine<'a, M: RiskModel + ?Sized> {
    model: &'a M,
    schema: &'a FeatureSchema,
    baseline: &'a BaselineVector,
    medians_score: f64,
    masks: Vec<Vec<bool>>,
}

impl<'a, M: RiskModel + ?Sized> AttributionEngine<'a, M> {
    /// `medians_score` is the model's probability for `baseline`, computed by
    /// the caller once per baseline
    pub fn new(
        model: &'a M,
        schema: &'a FeatureSchema,
        baseline: &'a BaselineVector,
        medians_score: f64,
    ) -> Result<Self> {
        if baseline.values().len() != schema.len() {
            return Err(AttributionError::BaselineWidth {
                expected: schema.len(),
                actual: baseline.values().len(),
            });
        }

        let masks = (0..schema.dimensions().len())
            .map(|d| schema.dimension_mask(d))
            .collect();

        Ok(Self {
            model,
            schema,
            baseline,
            medians_score,
            masks,
        })
    }

    /// Attribute a batch of commits; output order matches input order
    pub fn attribute(&self, commits: &[CommitRecord]) -> Result<Vec<AttributionResult>> {
        let rows = commits
            .iter()
            .map(|c| self.feature_row(c))
            .collect::<Result<Vec<_>>>()?;

        let scores = self.predict_checked(&rows)?;

        // raw[d][i]: lift of dimension d for commit i
        let mut raw = Vec::with_capacity(self.masks.len());
        let mut scratch: Vec<Vec<f64>> = Vec::with_capacity(rows.len());
        for mask in &self.masks {
            scratch.clear();
            scratch.extend(rows.iter().map(|row| self.hold_at_baseline(row, mask)));

            let predicted = self.predict_checked(&scratch)?;
            raw.push(
                predicted
                    .iter()
                    .map(|p| (p - self.medians_score) / self.medians_score)
                    .collect::<Vec<f64>>(),
            );
        }

        let results = commits
            .iter()
            .enumerate()
            .map(|(i, commit)| {
                let score = finite_or_zero(scores[i]);
                let lifts: Vec<f64> = raw.iter().map(|per_dim| per_dim[i]).collect();

                let contributions = if self.medians_score == 0.0 {
                    vec![0.0; lifts.len()]
                } else {
                    redistribute(&lifts, score)
                };

                AttributionResult {
                    commit_id: commit.commit_id.clone(),
                    score,
                    contributions: self
                        .schema
                        .dimension_names()
                        .map(str::to_string)
                        .zip(contributions)
                        .collect(),
                }
            })
            .collect();

        Ok(results)
    }

    /// Copy of `row` with every feature outside the mask set to the baseline
    fn hold_at_baseline(&self, row: &[f64], mask: &[bool]) -> Vec<f64> {
        row.iter()
            .zip(mask)
            .zip(self.baseline.values())
            .map(|((&value, &keep), &base)| if keep { value } else { base })
            .collect()
    }

    /// Model input for a commit; missing metrics become `NaN`
    fn feature_row(&self, commit: &CommitRecord) -> Result<Vec<f64>> {
        if commit.metrics.len() != self.schema.len() {
            return Err(AttributionError::RowWidth {
                commit: commit.commit_id.clone(),
                expected: self.schema.len(),
                actual: commit.metrics.len(),
            });
        }
        if commit.metrics.iter().any(Option::is_none) {
            tracing::debug!("Commit {} has missing metrics", commit.commit_id);
        }

        Ok(commit
            .metrics
            .iter()
            .map(|value| value.unwrap_or(f64::NAN))
            .collect())
    }

    fn predict_checked(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        let predicted = self.model.predict(rows)?;
        if predicted.len() != rows.len() {
            return Err(AttributionError::PredictionCount {
                expected: rows.len(),
                actual: predicted.len(),
            });
        }
        Ok(predicted)
    }
}
