//! # Backup Files
//!
//! Timestamped JSON backups in a directory, listed newest first.

use chrono::{DateTime, Local};
use coursegraph_core::{GraphError, Snapshot, primitives::MAX_SNAPSHOT_SIZE};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File name prefix shared by every backup.
pub const BACKUP_PREFIX: &str = "graph_backup_";

/// `graph_backup_YYYYMMDD_HHMMSS.json` for the given instant.
#[must_use]
pub fn backup_file_name(at: DateTime<Local>) -> String {
    format!("{BACKUP_PREFIX}{}.json", at.format("%Y%m%d_%H%M%S"))
}

/// Write `snapshot` into `dir` under a fresh timestamped name.
///
/// Creates `dir` if needed. Never overwrites an existing backup.
pub fn write_backup(dir: &Path, snapshot: &Snapshot) -> Result<PathBuf, GraphError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        GraphError::IoError(format!("Cannot create backup dir '{}': {}", dir.display(), e))
    })?;

    let name = backup_file_name(Local::now());
    let mut path = dir.join(&name);
    let mut n = 1;
    while path.exists() {
        path = dir.join(name.replace(".json", &format!("_{n}.json")));
        n += 1;
    }

    let json = snapshot.to_json_pretty()?;
    std::fs::write(&path, json)
        .map_err(|e| GraphError::IoError(format!("Write backup '{}': {}", path.display(), e)))?;

    tracing::info!(
        path = %path.display(),
        nodes = snapshot.node_count(),
        edges = snapshot.edge_count(),
        "backup written"
    );
    Ok(path)
}

/// Read and validate a backup file.
pub fn read_backup(path: &Path) -> Result<Snapshot, GraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| GraphError::IoError(format!("Cannot read '{}': {}", path.display(), e)))?;
    if metadata.len() > MAX_SNAPSHOT_SIZE as u64 {
        return Err(GraphError::MalformedSnapshot(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_SNAPSHOT_SIZE
        )));
    }

    let text = std::fs::read_to_string(path)
        .map_err(|e| GraphError::IoError(format!("Read '{}': {}", path.display(), e)))?;
    Snapshot::from_json(&text)
}

/// One backup found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// `None` when the file could not be read as a backup.
    pub created_at: Option<String>,
    pub nodes: Option<usize>,
    pub edges: Option<usize>,
}

/// Backups in `dir`, newest first. A missing directory has none.
pub fn list_backups(dir: &Path) -> Result<Vec<BackupEntry>, GraphError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| GraphError::IoError(format!("Cannot list '{}': {}", dir.display(), e)))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(".json"))
        })
        .collect();
    // The timestamp in the name sorts chronologically.
    paths.sort();
    paths.reverse();

    Ok(paths.into_iter().map(describe).collect())
}

fn describe(path: PathBuf) -> BackupEntry {
    let size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    match read_backup(&path) {
        Ok(snapshot) => BackupEntry {
            size_bytes,
            created_at: Some(snapshot.metadata.created_at.clone()),
            nodes: Some(snapshot.node_count()),
            edges: Some(snapshot.edge_count()),
            path,
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable backup");
            BackupEntry {
                path,
                size_bytes,
                created_at: None,
                nodes: None,
                edges: None,
            }
        }
    }
}
