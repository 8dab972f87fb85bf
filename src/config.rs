//! Optional TOML configuration for training runs.
//!
//! Every key has a default, so a missing `cvd-forest.toml` yields the stock
//! run: `data/ess_model_ready.csv` in, `models/rf_cvd.pkl` out, 300 trees.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::split::SplitOptions;
use crate::ml::forest::ForestOptions;
use crate::project::{self, ProjectPaths};

/// Default target column.
pub const TARGET_COLUMN: &str = "cvd_any";

/// Errors that may occur while loading the training configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML parse error.
        source: toml::de::Error,
    },
    /// A value parsed but is outside its allowed range.
    #[error("Invalid config value for {key}: {reason}")]
    InvalidValue {
        /// Dotted key name.
        key: &'static str,
        /// Human-readable constraint.
        reason: String,
    },
}

/// Full training configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    pub data: DataConfig,
    pub split: SplitOptions,
    pub forest: ForestOptions,
    pub output: OutputConfig,
}

/// Dataset location and target column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub path: PathBuf,
    pub target: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(project::DATA_FILE),
            target: TARGET_COLUMN.to_string(),
        }
    }
}

/// Output artifact locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub model_path: PathBuf,
    pub metrics_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(project::MODEL_FILE),
            metrics_path: PathBuf::from(project::METRICS_FILE),
        }
    }
}

impl TrainConfig {
    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data.target.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "data.target",
                reason: "must not be empty".to_string(),
            });
        }
        let fraction = self.split.test_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "split.test_fraction",
                reason: format!("must be in (0, 1), got {fraction}"),
            });
        }
        if self.forest.n_trees == 0 {
            return Err(ConfigError::InvalidValue {
                key: "forest.n_trees",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.forest.min_samples_leaf == 0 {
            return Err(ConfigError::InvalidValue {
                key: "forest.min_samples_leaf",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.forest.min_samples_split < 2 {
            return Err(ConfigError::InvalidValue {
                key: "forest.min_samples_split",
                reason: "must be at least 2".to_string(),
            });
        }
        Ok(())
    }

    /// Resolve every relative path in the config against the project root.
    pub fn resolved(mut self, paths: &ProjectPaths) -> Self {
        self.data.path = paths.resolve(&self.data.path);
        self.output.model_path = paths.resolve(&self.output.model_path);
        self.output.metrics_path = paths.resolve(&self.output.metrics_path);
        self
    }
}

/// Load `cvd-forest.toml` from the project root, returning defaults if missing.
///
/// Relative paths in the result are resolved against the project root.
pub fn load_or_default(paths: &ProjectPaths) -> Result<TrainConfig, ConfigError> {
    let config = load_from(&paths.config_file())?;
    config.validate()?;
    Ok(config.resolved(paths))
}

fn load_from(path: &Path) -> Result<TrainConfig, ConfigError> {
    if !path.exists() {
        return Ok(TrainConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::forest::MaxFeatures;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_stock_run() {
        let dir = tempdir().unwrap();
        let paths = ProjectPaths::new(dir.path());
        let config = load_or_default(&paths).unwrap();
        assert_eq!(config.data.path, dir.path().join("data/ess_model_ready.csv"));
        assert_eq!(config.data.target, "cvd_any");
        assert_eq!(config.split.test_fraction, 0.2);
        assert_eq!(config.split.seed, 42);
        assert_eq!(config.forest.n_trees, 300);
        assert_eq!(config.forest.max_depth, None);
        assert_eq!(config.forest.min_samples_leaf, 5);
        assert_eq!(config.forest.max_features, MaxFeatures::Sqrt);
        assert_eq!(config.output.model_path, dir.path().join("models/rf_cvd.pkl"));
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(project::CONFIG_FILE_NAME),
            "[forest]\nn_trees = 25\nmax_depth = 6\nmax_features = \"log2\"\n\n[output]\nmodel_path = \"/tmp/out.pkl\"\n",
        )
        .unwrap();
        let config = load_or_default(&ProjectPaths::new(dir.path())).unwrap();
        assert_eq!(config.forest.n_trees, 25);
        assert_eq!(config.forest.max_depth, Some(6));
        assert_eq!(config.forest.max_features, MaxFeatures::Log2);
        assert_eq!(config.forest.min_samples_leaf, 5);
        assert_eq!(config.output.model_path, PathBuf::from("/tmp/out.pkl"));
        assert_eq!(config.split.seed, 42);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(project::CONFIG_FILE_NAME),
            "[forest]\nn_estimators = 10\n",
        )
        .unwrap();
        let err = load_or_default(&ProjectPaths::new(dir.path())).unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn out_of_range_fraction_is_rejected() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(project::CONFIG_FILE_NAME),
            "[split]\ntest_fraction = 1.5\n",
        )
        .unwrap();
        let err = load_or_default(&ProjectPaths::new(dir.path())).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "split.test_fraction",
                ..
            }
        ));
    }
}
