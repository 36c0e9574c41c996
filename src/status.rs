//! Prediction status of a finished invocation

use crate::output::{ModelOutput, Stage};
use serde::{Deserialize, Serialize};

/// Fewest training rows a trustworthy model is built from
pub const MIN_TRAINING_ROWS: usize = 50;
/// Fewest rows of either class
pub const MIN_CLASS_ROWS: usize = 10;
/// Accepted range for the buggy share of training rows
pub const BALANCE_RANGE: (f64, f64) = (0.10, 0.90);
/// Weighted F1 below which the model is considered low quality
pub const MIN_WEIGHTED_F1: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Ok,
    /// Predictions come from a previously exported model
    LastModel,
    FailDataPreparing,
    LowTrainingData,
    ClassUnbalanced,
    FailTraining,
    LowModelQuality,
    FailPredicting,
    UnknownState,
}

/// Status and confidence (weighted F1, 0 without a report)
pub fn assess(output: &ModelOutput) -> (PredictionStatus, f64) {
    let confidence = output
        .model_report
        .as_ref()
        .map_or(0.0, |r| r.weighted_f1());
    (status_of(output), confidence)
}

fn status_of(output: &ModelOutput) -> PredictionStatus {
    if !output.is_built && output.is_predicted {
        return PredictionStatus::LastModel;
    }

    let Some(points) = &output.data_points else {
        return PredictionStatus::FailDataPreparing;
    };

    let train = points.train.total();
    if train < MIN_TRAINING_ROWS {
        return PredictionStatus::LowTrainingData;
    }

    let balance = points.train.buggy as f64 / train as f64;
    if balance < BALANCE_RANGE.0
        || balance > BALANCE_RANGE.1
        || points.train.buggy < MIN_CLASS_ROWS
        || points.train.clean < MIN_CLASS_ROWS
    {
        return PredictionStatus::ClassUnbalanced;
    }

    let Some(report) = &output.model_report else {
        return PredictionStatus::FailTraining;
    };

    if report.weighted_f1() < MIN_WEIGHTED_F1 {
        return PredictionStatus::LowModelQuality;
    }

    if let Some(error) = &output.error {
        match error.stage {
            Stage::DataPreparation | Stage::DataSplitting => {
                return PredictionStatus::FailDataPreparing
            }
            Stage::ModelBuilding | Stage::ModelExporting => return PredictionStatus::FailTraining,
            Stage::Predicting => return PredictionStatus::FailPredicting,
            Stage::QuantileCalculation => {}
        }
    }

    if output.is_built && output.is_predicted {
        return PredictionStatus::Ok;
    }

    PredictionStatus::UnknownState
}
