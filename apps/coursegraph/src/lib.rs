//! # coursegraph (application library)
//!
//! CLI definitions, configuration loading and backup file handling, exposed
//! as a library so they can be tested without spawning the binary.

pub mod backup;
pub mod cli;
pub mod config;

pub use config::{AppConfig, BackupConfig};
