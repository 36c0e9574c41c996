//! Build and predict actions
//!
//! Both actions always return a [`ModelOutput`]. A failing stage is recorded
//! in the payload and stops the action; everything computed before it is
//! kept.

use crate::attribution::{AttributionEngine, BaselineVector};
use crate::collector::{Collector, MetricsSource};
use crate::config::PipelineConfig;
use crate::dataset;
use crate::evaluation;
use crate::forest::HyperParameters;
use crate::inference::RiskModel;
use crate::output::{DataPoints, FeatureImportance, ModelOutput, ModelReport, Stage, StageError};
use crate::persistence::{self, ModelMetadata, PersistenceOptions, PortableModel};
use crate::schema::FeatureSchema;
use crate::trainer::{self, ModelMedians};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;

/// Portable model format reported in the model report
pub const MODEL_FORMAT: &str = "apr";

/// Tag an error with the stage it happened in
trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, StageError>;
}

impl<T, E: Display> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, StageError> {
        self.map_err(|e| StageError {
            stage,
            message: e.to_string(),
        })
    }
}

pub struct Pipeline {
    schema: FeatureSchema,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(schema: FeatureSchema, config: PipelineConfig) -> Self {
        Self { schema, config }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Train, export and evaluate a model, then attribute the newest commits
    pub fn build<S: MetricsSource>(
        &self,
        collector: &mut Collector<S>,
        params: &HyperParameters,
        model_path: &Path,
    ) -> ModelOutput {
        let mut output = ModelOutput::new();
        if let Err(error) = self.run_build(collector, params, model_path, &mut output) {
            output.fail(error.stage, error.message);
        }
        output.finish()
    }

    /// Attribute job commits with a previously exported model
    pub fn predict<S: MetricsSource>(
        &self,
        collector: &Collector<S>,
        model_path: &Path,
        medians: &HashMap<String, f64>,
        medians_score: f64,
    ) -> ModelOutput {
        let mut output = ModelOutput::new();
        if let Err(error) = self.run_predict(collector, model_path, medians, medians_score, &mut output)
        {
            output.fail(error.stage, error.message);
        }
        output.finish()
    }

    fn run_build<S: MetricsSource>(
        &self,
        collector: &mut Collector<S>,
        params: &HyperParameters,
        model_path: &Path,
        output: &mut ModelOutput,
    ) -> Result<(), StageError> {
        output.quantiles = Some(
            collector
                .metrics_quantiles()
                .at(Stage::QuantileCalculation)?,
        );

        let table = collector
            .all_commit_metrics(true)
            .at(Stage::DataPreparation)?;
        collector.invalidate();

        let records = table
            .commit_records(&self.schema)
            .at(Stage::DataPreparation)?;
        let cutoff = dataset::prediction_cutoff(&records, self.config.ignored_seconds())
            .at(Stage::DataPreparation)?;

        let prepared = dataset::prepare(&records, cutoff, self.config.max_training_rows)
            .at(Stage::DataPreparation)?;
        let medians = ModelMedians::compute(&self.schema, &prepared).at(Stage::DataPreparation)?;
        output.medians = Some(medians.clone());

        let (train, test) =
            dataset::train_test_split(&prepared, self.config.test_size, self.config.split_seed)
                .at(Stage::DataSplitting)?;

        let to_predict = dataset::prediction_set(&records, cutoff);
        output.data_points = Some(DataPoints {
            all: table.len(),
            train: train.counts(),
            test: test.counts(),
            predict: to_predict.len(),
        });

        let forest = trainer::fit(&train, params).map_err(|e| StageError {
            stage: Stage::ModelBuilding,
            message: format!("{} ({:?})", e, e),
        })?;
        output.is_built = true;

        let portable = self
            .export(
                PortableModel::from_forest(
                    &forest,
                    self.schema.features(),
                    ModelMetadata::new(train.len()),
                ),
                model_path,
            )
            .at(Stage::ModelExporting)?;

        // Evaluation runs on the re-loaded model, the artifact predict uses
        let classification = evaluation::evaluate(&portable, &test, self.config.decision_threshold)
            .at(Stage::ModelExporting)?;
        let medians_score = portable
            .predict_one(medians.all.values())
            .at(Stage::ModelExporting)?;

        output.model_report = Some(ModelReport {
            format: MODEL_FORMAT.to_string(),
            params: portable.forest.params().clone(),
            feature_importance: FeatureImportance(
                portable
                    .feature_names
                    .iter()
                    .cloned()
                    .zip(portable.feature_importances().iter().copied())
                    .collect(),
            ),
            medians_score,
            classification,
        });

        let baseline = BaselineVector::new(&self.schema, medians.all.values().to_vec())
            .at(Stage::Predicting)?;
        let engine = AttributionEngine::new(&portable, &self.schema, &baseline, medians_score)
            .at(Stage::Predicting)?;
        output.prediction = Some(engine.attribute(&to_predict).at(Stage::Predicting)?);
        output.is_predicted = true;

        Ok(())
    }

    fn run_predict<S: MetricsSource>(
        &self,
        collector: &Collector<S>,
        model_path: &Path,
        medians: &HashMap<String, f64>,
        medians_score: f64,
        output: &mut ModelOutput,
    ) -> Result<(), StageError> {
        let records = collector
            .job_commit_metrics()
            .at(Stage::Predicting)?
            .commit_records(&self.schema)
            .at(Stage::Predicting)?;

        let model = persistence::load_model(model_path).at(Stage::Predicting)?;
        model
            .ensure_features(self.schema.features())
            .at(Stage::Predicting)?;
        tracing::info!("{}", persistence::model_status_line(&model));

        let baseline = BaselineVector::from_map(&self.schema, medians).at(Stage::Predicting)?;
        let engine = AttributionEngine::new(&model, &self.schema, &baseline, medians_score)
            .at(Stage::Predicting)?;
        output.prediction = Some(engine.attribute(&records).at(Stage::Predicting)?);
        output.is_predicted = true;

        Ok(())
    }

    /// Save the model, then load it back
    fn export(
        &self,
        model: PortableModel,
        model_path: &Path,
    ) -> persistence::Result<PortableModel> {
        let options = PersistenceOptions::new()
            .with_name("faultline")
            .with_description(format!(
                "Random forest over {} commit metrics",
                self.schema.len()
            ));
        persistence::save_model(&model, model_path, options)?;
        tracing::info!("Exported model to {}", model_path.display());

        let loaded = persistence::load_model(model_path)?;
        loaded.ensure_features(self.schema.features())?;
        Ok(loaded)
    }
}
