//! Run configuration for the mining pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::deps::BulkPaths;

/// Main configuration. Persisted as JSON in the user config directory;
/// command-line flags override individual fields per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sliding window size in days; `None` keeps every event in range.
    pub window_days: Option<i64>,

    /// Chronologically sorted pull-request datasets (NDJSON).
    pub pr_datasets: Vec<PathBuf>,

    /// Chronologically sorted issue datasets (NDJSON).
    pub issue_datasets: Vec<PathBuf>,

    /// Number of chunk workers.
    pub workers: usize,

    /// Where the merged output dataset is written.
    pub output_path: PathBuf,

    /// Scratch directory for chunk files and per-chunk outputs.
    pub temp_path: PathBuf,

    /// Quick-load cache for the project dependency map.
    pub dependency_cache_path: PathBuf,

    /// Bulk CSV sources the dependency cache is rebuilt from.
    pub bulk_projects_path: PathBuf,
    pub bulk_dependencies_path: PathBuf,
    pub bulk_repository_dependencies_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ecomine");

        Self {
            window_days: Some(90),
            pr_datasets: Vec::new(),
            issue_datasets: Vec::new(),
            workers: 4,
            output_path: data_dir.join("predictors.csv"),
            temp_path: data_dir.join("chunks"),
            dependency_cache_path: data_dir.join("dependency_map.json"),
            bulk_projects_path: data_dir.join("bulk").join("projects.csv"),
            bulk_dependencies_path: data_dir.join("bulk").join("dependencies.csv"),
            bulk_repository_dependencies_path: data_dir
                .join("bulk")
                .join("repository_dependencies.csv"),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when no file exists yet.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ecomine")
            .join("config.json")
    }

    /// Ensure the scratch and output directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.temp_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        if let Some(parent) = self.output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        Ok(())
    }

    pub fn bulk_paths(&self) -> BulkPaths {
        BulkPaths {
            projects: self.bulk_projects_path.clone(),
            dependencies: self.bulk_dependencies_path.clone(),
            repository_dependencies: self.bulk_repository_dependencies_path.clone(),
        }
    }

    pub fn window_duration(&self) -> Option<chrono::Duration> {
        self.window_days.map(chrono::Duration::days)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
}
