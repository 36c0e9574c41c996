//! Model fitting and baseline statistics

use crate::dataset::TrainingSet;
use crate::forest::{ForestError, HyperParameters, RandomForest};
use crate::schema::FeatureSchema;
use crate::stats;
use anyhow::Result;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Fit a random forest on a training set
pub fn fit(set: &TrainingSet, params: &HyperParameters) -> std::result::Result<RandomForest, ForestError> {
    params.validate()?;
    tracing::info!(
        "Fitting forest: {} trees on {} rows",
        params.n_estimators,
        set.len()
    );
    RandomForest::fit(&set.samples, &set.labels, params)
}

/// Per-feature medians in schema column order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMedians {
    names: Vec<String>,
    values: Vec<f64>,
}

impl FeatureMedians {
    /// Column medians of `rows`, skipping NaN; an empty column yields 0
    pub fn from_rows<'a, I>(schema: &FeatureSchema, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Vec<f64>>,
    {
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); schema.len()];
        for row in rows {
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(*value);
            }
        }

        let values = columns
            .into_iter()
            .map(|c| Ok(stats::median_skip_missing(c.into_iter().map(Some))?.unwrap_or(0.0)))
            .collect::<Result<Vec<f64>>>()?;

        Ok(Self {
            names: schema.features().to_vec(),
            values,
        })
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

impl Serialize for FeatureMedians {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.names.iter().zip(&self.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Baseline medians over all prepared rows and per label
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ModelMedians {
    pub all: FeatureMedians,
    pub buggy: FeatureMedians,
    pub clean: FeatureMedians,
}

impl ModelMedians {
    pub fn compute(schema: &FeatureSchema, set: &TrainingSet) -> Result<Self> {
        Ok(Self {
            all: FeatureMedians::from_rows(schema, &set.samples)?,
            buggy: FeatureMedians::from_rows(schema, set.rows_with_label(true))?,
            clean: FeatureMedians::from_rows(schema, set.rows_with_label(false))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::RiskModel;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(["x", "y"], [("d1", vec!["x"]), ("d2", vec!["y"])]).unwrap()
    }

    fn set() -> TrainingSet {
        TrainingSet {
            samples: vec![
                vec![1.0, 10.0],
                vec![2.0, 20.0],
                vec![3.0, 30.0],
                vec![4.0, 40.0],
                vec![5.0, f64::NAN],
            ],
            labels: vec![true, true, false, false, false],
        }
    }

    #[test]
    fn test_medians_per_label() {
        let medians = ModelMedians::compute(&schema(), &set()).unwrap();

        assert_eq!(medians.all.values(), &[3.0, 25.0]);
        assert_eq!(medians.buggy.values(), &[1.5, 15.0]);
        assert_eq!(medians.clean.values(), &[4.0, 35.0]);
        assert_eq!(medians.all.get("y"), Some(25.0));
        assert_eq!(medians.all.get("z"), None);
    }

    #[test]
    fn test_empty_class_medians_are_zero() {
        let set = TrainingSet {
            samples: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            labels: vec![false, false],
        };
        let medians = ModelMedians::compute(&schema(), &set).unwrap();
        assert_eq!(medians.buggy.values(), &[0.0, 0.0]);
        assert_eq!(medians.clean.values(), &[2.0, 3.0]);
    }

    #[test]
    fn test_medians_serialize_in_schema_order() {
        let medians = ModelMedians::compute(&schema(), &set()).unwrap();
        let json = serde_json::to_string(&medians.all).unwrap();
        assert_eq!(json, r#"{"x":3.0,"y":25.0}"#);
    }

    #[test]
    fn test_fit_uses_params() {
        let samples: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let labels: Vec<bool> = (0..40).map(|i| i >= 20).collect();
        let params = HyperParameters {
            n_estimators: 5,
            random_state: Some(1),
            ..HyperParameters::default()
        };

        let forest = fit(&TrainingSet { samples, labels }, &params).unwrap();
        assert_eq!(forest.n_trees(), 5);
        assert!(forest.predict_one(&[35.0, 1.0]).unwrap() > 0.5);
    }

    #[test]
    fn test_fit_rejects_invalid_params() {
        let params = HyperParameters {
            n_estimators: 0,
            ..HyperParameters::default()
        };
        assert!(fit(&set(), &params).is_err());
    }
}
