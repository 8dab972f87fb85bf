//! Project directory helpers anchored to the crate root.
//!
//! Training inputs and outputs live beside the crate: the dataset under
//! `data/`, fitted models under `models/`, run logs under `logs/`. Tests
//! build a [`ProjectPaths`] over a temporary directory instead.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Default dataset location relative to the project root.
pub const DATA_FILE: &str = "data/ess_model_ready.csv";
/// Default model output location relative to the project root.
pub const MODEL_FILE: &str = "models/rf_cvd.pkl";
/// Default metrics snapshot location relative to the project root.
pub const METRICS_FILE: &str = "models/rf_cvd.metrics.json";
/// Optional configuration file name at the project root.
pub const CONFIG_FILE_NAME: &str = "cvd-forest.toml";
const LOGS_DIR_NAME: &str = "logs";

/// Errors that can occur while preparing project directories.
#[derive(Debug, Error)]
pub enum ProjectDirError {
    /// Failed to create a project directory.
    #[error("Failed to create directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Root-relative locations used by a training run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    /// Anchor paths at an explicit root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Anchor paths at the crate directory this binary was built from.
    pub fn from_manifest_dir() -> Self {
        Self::new(env!("CARGO_MANIFEST_DIR"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a possibly relative path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Return the logs directory, creating it if needed.
    pub fn logs_dir(&self) -> Result<PathBuf, ProjectDirError> {
        let path = self.root.join(LOGS_DIR_NAME);
        std::fs::create_dir_all(&path).map_err(|source| ProjectDirError::CreateDir {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
