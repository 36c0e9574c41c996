//! JSON output payload of the build and predict actions
//!
//! One [`ModelOutput`] is produced per invocation. Stage failures are recorded
//! under `error` and every field computed before the failure stays populated.

use crate::attribution::AttributionResult;
use crate::dataset::LabelCounts;
use crate::evaluation::ClassificationReport;
use crate::forest::HyperParameters;
use crate::status::PredictionStatus;
use crate::trainer::ModelMedians;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Pipeline stage a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    #[serde(rename = "quantile calculation")]
    QuantileCalculation,
    #[serde(rename = "data preparation")]
    DataPreparation,
    #[serde(rename = "data splitting")]
    DataSplitting,
    #[serde(rename = "model building")]
    ModelBuilding,
    #[serde(rename = "model exporting")]
    ModelExporting,
    #[serde(rename = "predicting")]
    Predicting,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::QuantileCalculation => "quantile calculation",
            Stage::DataPreparation => "data preparation",
            Stage::DataSplitting => "data splitting",
            Stage::ModelBuilding => "model building",
            Stage::ModelExporting => "model exporting",
            Stage::Predicting => "predicting",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

/// Dataset sizing counts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataPoints {
    /// Commit rows fetched
    pub all: usize,
    pub train: LabelCounts,
    pub test: LabelCounts,
    /// Rows inside the prediction window
    pub predict: usize,
}

/// Feature importances keyed by feature name, in schema order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureImportance(pub Vec<(String, f64)>);

impl Serialize for FeatureImportance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelReport {
    /// Portable model format
    pub format: String,
    pub params: HyperParameters,
    pub feature_importance: FeatureImportance,
    /// Model probability for the all-rows median commit
    pub medians_score: f64,
    #[serde(flatten)]
    pub classification: ClassificationReport,
}

impl ModelReport {
    /// Weighted F1, the model quality figure used for status and confidence
    pub fn weighted_f1(&self) -> f64 {
        self.classification.weighted_avg.f1_score
    }
}

/// `{ "<q>": { column: value } }`
pub type QuantileTable = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Quantiles {
    pub commit: QuantileTable,
    pub file: QuantileTable,
    pub developer: QuantileTable,
}

/// Result of one build or predict invocation
#[derive(Debug, Clone, Serialize)]
pub struct ModelOutput {
    pub is_built: bool,
    pub is_predicted: bool,
    pub status: PredictionStatus,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StageError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_points: Option<DataPoints>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_report: Option<ModelReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medians: Option<ModelMedians>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantiles: Option<Quantiles>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Vec<AttributionResult>>,
}

impl ModelOutput {
    pub fn new() -> Self {
        Self {
            is_built: false,
            is_predicted: false,
            status: PredictionStatus::UnknownState,
            confidence: 0.0,
            error: None,
            data_points: None,
            model_report: None,
            medians: None,
            quantiles: None,
            prediction: None,
        }
    }

    /// Record a stage failure
    pub fn fail(&mut self, stage: Stage, error: impl fmt::Display) {
        let message = error.to_string();
        tracing::warn!("Stage '{}' failed: {}", stage, message);
        self.error = Some(StageError { stage, message });
    }

    /// Evaluate and attach `status` and `confidence`
    pub fn finish(mut self) -> Self {
        let (status, confidence) = crate::status::assess(&self);
        self.status = status;
        self.confidence = confidence;
        self
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for ModelOutput {
    fn default() -> Self {
        Self::new()
    }
}
