// Configuration for the build/predict pipeline
//
// Defaults reproduce the production pipeline; a TOML file may override any
// subset of the fields.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for dataset preparation, splitting and evaluation
///
/// # Example
/// ```
/// use faultline::config::PipelineConfig;
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.max_training_rows, 10_000);
/// assert_eq!(config.ignored_days, 90);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ceiling on training rows; the most recent rows are kept
    pub max_training_rows: usize,

    /// Size of the prediction window in days
    ///
    /// Commits authored within this many days of the newest commit have not
    /// had time to receive bug-fixing commits, so their labels are not
    /// trusted. They are excluded from training and form the prediction set.
    pub ignored_days: i64,

    /// Share of prepared rows held out for evaluation
    pub test_size: f64,

    /// Seed for the train/test shuffle
    pub split_seed: u64,

    /// Quantile steps reported for commit, file and developer metrics
    pub quantile_steps: Vec<f64>,

    /// Probability at or above which a commit is classified buggy
    pub decision_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_training_rows: 10_000,
            ignored_days: 90,
            test_size: 0.1,
            split_seed: 42,
            quantile_steps: vec![0.5, 0.75, 0.9],
            decision_threshold: 0.5,
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Seconds before the newest commit at which the prediction window starts
    pub fn ignored_seconds(&self) -> i64 {
        self.ignored_days * 86_400
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_training_rows == 0 {
            return Err(ConfigError::Invalid(
                "max_training_rows must be >= 1".to_string(),
            ));
        }

        if self.ignored_days < 0 {
            return Err(ConfigError::Invalid(format!(
                "ignored_days must be non-negative, got {}",
                self.ignored_days
            )));
        }

        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }

        if let Some(q) = self
            .quantile_steps
            .iter()
            .find(|q| !(0.0..=1.0).contains(*q))
        {
            return Err(ConfigError::Invalid(format!(
                "quantile steps must be in [0, 1], got {}",
                q
            )));
        }

        if !(0.0..=1.0).contains(&self.decision_threshold) {
            return Err(ConfigError::Invalid(format!(
                "decision_threshold must be in [0, 1], got {}",
                self.decision_threshold
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_training_rows, 10_000);
        assert_eq!(config.test_size, 0.1);
        assert_eq!(config.split_seed, 42);
        assert_eq!(config.quantile_steps, vec![0.5, 0.75, 0.9]);
        assert_eq!(config.ignored_seconds(), 90 * 86_400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ignored_days = 30\ntest_size = 0.2").unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.ignored_days, 30);
        assert_eq!(config.test_size, 0.2);
        assert_eq!(config.max_training_rows, 10_000);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            PipelineConfig::from_file("/nonexistent/faultline.toml"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "test_size = \"lots\"").unwrap();
        assert!(matches!(
            PipelineConfig::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_invalid_values() {
        let mut config = PipelineConfig::default();
        config.test_size = 1.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.max_training_rows = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.quantile_steps = vec![0.5, 1.5];
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.decision_threshold = -0.1;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.ignored_days = -1;
        assert!(config.validate().is_err());
    }
}
