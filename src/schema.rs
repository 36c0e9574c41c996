//! Feature schema: the commit metrics a model is trained on and their
//! grouping into attribution dimensions.
//!
//! Every feature belongs to exactly one dimension. The feature list order is
//! the column order of every feature matrix handed to a model; the dimension
//! order is the key order of attribution output.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Label column in commit metric tables
pub const LABEL_COLUMN: &str = "buggy";
/// Author date column (unix seconds)
pub const DATE_COLUMN: &str = "author_date";
/// Commit identifier column
pub const ID_COLUMN: &str = "commit_id";

/// Errors raised while constructing a schema
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Feature '{0}' is declared more than once")]
    DuplicateFeature(String),

    #[error("Dimension '{0}' is declared more than once")]
    DuplicateDimension(String),

    #[error("Dimension '{0}' has no features")]
    EmptyDimension(String),

    #[error("Dimension '{dimension}' references undeclared feature '{feature}'")]
    UnknownFeature { dimension: String, feature: String },

    #[error("Feature '{feature}' belongs to both '{first}' and '{second}'")]
    FeatureInMultipleDimensions {
        feature: String,
        first: String,
        second: String,
    },

    #[error("Feature '{0}' does not belong to any dimension")]
    UnassignedFeature(String),
}

/// A named group of features
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub features: Vec<String>,
}

/// Immutable, validated feature schema
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    features: Vec<String>,
    dimensions: Vec<Dimension>,
    feature_index: HashMap<String, usize>,
    /// Owning dimension index per feature, aligned with `features`
    owner: Vec<usize>,
}

impl FeatureSchema {
    /// Build a schema from the ordered feature list and the dimension groups
    ///
    /// Fails if any feature is duplicated, unassigned or assigned twice, or if
    /// a dimension names a feature that is not declared.
    pub fn new<F, D, N>(features: F, dimensions: D) -> Result<Self, SchemaError>
    where
        F: IntoIterator,
        F::Item: Into<String>,
        D: IntoIterator<Item = (N, Vec<&'static str>)>,
        N: Into<String>,
    {
        let dims = dimensions
            .into_iter()
            .map(|(name, feats)| Dimension {
                name: name.into(),
                features: feats.into_iter().map(str::to_string).collect(),
            })
            .collect();
        Self::from_parts(features.into_iter().map(Into::into).collect(), dims)
    }

    /// Build a schema from owned parts
    pub fn from_parts(
        features: Vec<String>,
        dimensions: Vec<Dimension>,
    ) -> Result<Self, SchemaError> {
        let mut feature_index = HashMap::with_capacity(features.len());
        for (i, feature) in features.iter().enumerate() {
            if feature_index.insert(feature.clone(), i).is_some() {
                return Err(SchemaError::DuplicateFeature(feature.clone()));
            }
        }

        let mut owner: Vec<Option<usize>> = vec![None; features.len()];
        let mut seen_dims = HashSet::new();

        for (d, dimension) in dimensions.iter().enumerate() {
            if !seen_dims.insert(dimension.name.as_str()) {
                return Err(SchemaError::DuplicateDimension(dimension.name.clone()));
            }
            if dimension.features.is_empty() {
                return Err(SchemaError::EmptyDimension(dimension.name.clone()));
            }

            for feature in &dimension.features {
                let idx = *feature_index
                    .get(feature)
                    .ok_or_else(|| SchemaError::UnknownFeature {
                        dimension: dimension.name.clone(),
                        feature: feature.clone(),
                    })?;

                if let Some(prev) = owner[idx] {
                    // Same dimension listing a feature twice is still a duplicate
                    return Err(SchemaError::FeatureInMultipleDimensions {
                        feature: feature.clone(),
                        first: dimensions[prev].name.clone(),
                        second: dimension.name.clone(),
                    });
                }
                owner[idx] = Some(d);
            }
        }

        let owner = owner
            .into_iter()
            .enumerate()
            .map(|(i, o)| o.ok_or_else(|| SchemaError::UnassignedFeature(features[i].clone())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            features,
            dimensions,
            feature_index,
            owner,
        })
    }

    /// The just-in-time defect prediction schema (experience, history, size, diffusion)
    pub fn commit_default() -> Result<Self, SchemaError> {
        let features = [
            "exp", "rexp", "sexp", "ndev", "nuc", "age", "la", "ld", "lt", "ns", "nd", "nf",
            "entropy",
        ];
        let dimensions = [
            ("experience", vec!["exp", "rexp", "sexp"]),
            ("history", vec!["ndev", "nuc", "age"]),
            ("size", vec!["la", "ld", "lt"]),
            ("diffusion", vec!["ns", "nd", "nf", "entropy"]),
        ];

        Self::new(features, dimensions)
    }

    /// All features in column order
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Dimensions in declared order
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Dimension names in declared order
    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.iter().map(|d| d.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Column index of a feature
    pub fn index_of(&self, feature: &str) -> Option<usize> {
        self.feature_index.get(feature).copied()
    }

    /// Ordered feature list of a dimension
    pub fn dimension_features(&self, dimension: &str) -> Option<&[String]> {
        self.dimensions
            .iter()
            .find(|d| d.name == dimension)
            .map(|d| d.features.as_slice())
    }

    /// Name of the dimension owning a feature
    pub fn dimension_of(&self, feature: &str) -> Option<&str> {
        self.index_of(feature)
            .map(|i| self.dimensions[self.owner[i]].name.as_str())
    }

    /// Column mask for a dimension index: `true` where the column belongs to it
    pub fn dimension_mask(&self, dimension_idx: usize) -> Vec<bool> {
        self.owner.iter().map(|&d| d == dimension_idx).collect()
    }
}
