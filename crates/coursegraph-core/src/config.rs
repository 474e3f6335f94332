//! # Store Configuration
//!
//! Explicit configuration passed to constructors. There is no process-wide
//! configuration state; callers build a `StoreConfig` (usually from the app's
//! TOML file) and hand it down.

use crate::primitives::DEFAULT_PAGE_SIZE;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How relationship deduplication treats direction and type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupMode {
    /// Only an edge with the same type and the same direction is a duplicate.
    Directed,
    /// An edge with the same type in either direction is a duplicate.
    #[default]
    SymmetricPerType,
    /// Any edge between the pair, of any type, in either direction.
    Pairwise,
}

/// Configuration of the graph store and the engine operating on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the redb database file.
    pub path: PathBuf,
    /// Identifier recorded in backup metadata. Derived from `path` when unset.
    pub uri: Option<String>,
    /// Records fetched per page when exporting.
    pub page_size: usize,
    pub dedup: DedupMode,
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("coursegraph.redb"),
            uri: None,
            page_size: DEFAULT_PAGE_SIZE,
            dedup: DedupMode::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Configuration for the database file at `path` with default settings.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// The store identifier written into backups.
    #[must_use]
    pub fn store_uri(&self) -> String {
        self.uri
            .clone()
            .unwrap_or_else(|| format!("redb://{}", self.path.display()))
    }

    /// Page size, never zero.
    #[must_use]
    pub fn effective_page_size(&self) -> usize {
        self.page_size.max(1)
    }
}
