//! Portable model export
//!
//! A fitted forest is wrapped in a [`PortableModel`] and persisted with
//! aprender's `.apr` format. The portable model is what the `predict` action
//! loads later, so it carries everything inference needs: feature names in
//! column order and the fitted forest itself.

use crate::forest::RandomForest;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during model persistence operations
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to save model: {0}")]
    SaveError(String),

    #[error("Failed to load model: {0}")]
    LoadError(String),

    #[error("Model file not found: {0}")]
    FileNotFound(String),

    #[error("Model features {found:?} do not match expected {expected:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for model persistence operations
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Metadata for a persisted model
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelMetadata {
    /// Faultline version that created this model
    pub faultline_version: String,
    /// When the model was trained (unix seconds)
    pub trained_at: String,
    /// Number of samples used for training
    pub training_samples: usize,
    /// Optional description
    pub description: Option<String>,
}

impl ModelMetadata {
    /// Create new metadata with current timestamp
    pub fn new(training_samples: usize) -> Self {
        Self {
            faultline_version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: unix_timestamp(),
            training_samples,
            description: None,
        }
    }

    /// Add a description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

fn unix_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", duration.as_secs())
}

/// Serializable, self-contained forest
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PortableModel {
    /// Feature names in column order
    pub feature_names: Vec<String>,
    /// The fitted forest
    pub forest: RandomForest,
    /// Model metadata
    pub metadata: ModelMetadata,
}

impl PortableModel {
    pub fn from_forest(
        forest: &RandomForest,
        feature_names: &[String],
        metadata: ModelMetadata,
    ) -> Self {
        Self {
            feature_names: feature_names.to_vec(),
            forest: forest.clone(),
            metadata,
        }
    }

    /// Importance per feature, aligned with `feature_names`
    pub fn feature_importances(&self) -> &[f64] {
        self.forest.feature_importances()
    }

    /// Fail unless the model was trained on exactly `features`, in order
    pub fn ensure_features(&self, features: &[String]) -> Result<()> {
        if self.feature_names != features {
            return Err(PersistenceError::FeatureMismatch {
                expected: features.to_vec(),
                found: self.feature_names.clone(),
            });
        }
        Ok(())
    }
}

/// Options for saving models
#[derive(Debug, Clone)]
pub struct PersistenceOptions {
    /// Enable compression (default: true)
    pub compress: bool,
    /// Model name
    pub name: Option<String>,
    /// Model description
    pub description: Option<String>,
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self {
            compress: true,
            name: None,
            description: None,
        }
    }
}

impl PersistenceOptions {
    /// Create new options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set compression
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Set model name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set model description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Save a portable model to .apr format, creating parent directories
pub fn save_model(
    model: &PortableModel,
    path: impl AsRef<Path>,
    options: PersistenceOptions,
) -> Result<()> {
    use aprender::format::{save, Compression, ModelType, SaveOptions};

    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let compression = if options.compress {
        Compression::ZstdDefault
    } else {
        Compression::None
    };

    let mut save_options = SaveOptions::new().with_compression(compression);

    if let Some(name) = options.name {
        save_options = save_options.with_name(name);
    }
    if let Some(desc) = options.description {
        save_options = save_options.with_description(desc);
    }

    tracing::debug!(
        "Saving model with {} trees to {}",
        model.forest.n_trees(),
        path.display()
    );

    save(model, ModelType::RandomForest, path, save_options)
        .map_err(|e| PersistenceError::SaveError(e.to_string()))
}

/// Load a portable model from .apr format
pub fn load_model(path: impl AsRef<Path>) -> Result<PortableModel> {
    use aprender::format::{load, ModelType};

    if !path.as_ref().exists() {
        return Err(PersistenceError::FileNotFound(
            path.as_ref().display().to_string(),
        ));
    }

    let model = load::<PortableModel>(path.as_ref(), ModelType::RandomForest)
        .map_err(|e| PersistenceError::LoadError(e.to_string()))?;
    if !model.forest.is_fitted() {
        return Err(PersistenceError::LoadError(
            "model contains no fitted trees".to_string(),
        ));
    }
    Ok(model)
}

/// Generate a status line for model information
pub fn model_status_line(model: &PortableModel) -> String {
    format!(
        "model: faultline v{}, {} trees, trained with {} samples",
        model.metadata.faultline_version,
        model.forest.n_trees(),
        model.metadata.training_samples
    )
}
