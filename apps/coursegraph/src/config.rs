//! # Application Configuration
//!
//! `coursegraph.toml`, with a `[store]` section handed straight to the core
//! and a `[backup]` section owned by the app:
//!
//! ```toml
//! [store]
//! path = "coursegraph.redb"
//! page_size = 500
//! dedup = "symmetric_per_type"
//!
//! [store.retry]
//! max_attempts = 3
//!
//! [backup]
//! dir = "backups"
//! safety_backup_before_restore = true
//! ```

use coursegraph_core::{GraphError, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "coursegraph.toml";

/// Subdirectory of the backup dir receiving pre-restore safety backups.
pub const SAFETY_BACKUP_SUBDIR: &str = "before_restore";

/// Where backups go and whether restore takes one first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub dir: PathBuf,
    pub safety_backup_before_restore: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("backups"),
            safety_backup_before_restore: true,
        }
    }
}

impl BackupConfig {
    #[must_use]
    pub fn safety_dir(&self) -> PathBuf {
        self.dir.join(SAFETY_BACKUP_SUBDIR)
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub backup: BackupConfig,
}

impl AppConfig {
    /// Parse a TOML document. Missing sections and keys take defaults.
    pub fn from_toml(text: &str) -> Result<Self, GraphError> {
        toml::from_str(text).map_err(|e| GraphError::SerializationError(format!("config: {e}")))
    }

    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Without one, `coursegraph.toml` in the
    /// working directory is used when present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, GraphError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !path.exists() {
            if required {
                return Err(GraphError::IoError(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|e| {
            GraphError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Apply command-line overrides on top of file values.
    #[must_use]
    pub fn with_database(mut self, database: Option<PathBuf>) -> Self {
        if let Some(path) = database {
            self.store.path = path;
        }
        self
    }
}
