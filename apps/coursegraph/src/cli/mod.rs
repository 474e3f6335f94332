//! # coursegraph CLI Module
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `status` - Show node and relationship counts
//! - `create-course` - Create a course or fill in its description
//! - `ingest` - Load chapter analyses into a course
//! - `summarize` - Apply all-chapter concept summaries
//! - `show` - Show one concept with its mentions and relationships
//! - `stats` - Concept coverage per course
//! - `export` - Write the graph (or one course) to a JSON file
//! - `backup` / `list-backups` / `restore` - Backup management
//! - `clear` - Delete every node and relationship

mod commands;

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use coursegraph_core::GraphError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// coursegraph - course knowledge graph
///
/// Courses, chapters and concepts, merged idempotently from per-chapter
/// analyses, with natural-key backup and restore.
#[derive(Parser, Debug)]
#[command(name = "coursegraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the graph database (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Path to the configuration file (default: ./coursegraph.toml if present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Replace an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Show graph status
    Status,

    /// Create a course, or set its description if it has none
    CreateCourse {
        /// Course name
        name: String,

        /// Course description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Ingest chapter analysis files (JSON, repaired when damaged)
    Ingest {
        /// Course the chapters belong to
        #[arg(short, long)]
        course: String,

        /// Chapter analysis files, ingested in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Do not add RELATES_TO links to sparse chapters
        #[arg(long)]
        no_densify: bool,
    },

    /// Apply concept summaries (one object or an array) to a course
    Summarize {
        /// Course the concepts belong to
        #[arg(short, long)]
        course: String,

        /// Summary file
        file: PathBuf,
    },

    /// Show a concept
    Show {
        /// Concept name
        name: String,
    },

    /// Concept coverage statistics
    Stats {
        /// Restrict to one course
        #[arg(short, long)]
        course: Option<String>,
    },

    /// Export the graph, or one course, to a JSON file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export only this course and its neighbourhood
        #[arg(short, long)]
        course: Option<String>,
    },

    /// Write a timestamped backup into the backup directory
    Backup,

    /// List backups, newest first
    ListBackups,

    /// Replace the graph with the contents of a backup
    Restore {
        /// Backup file
        file: PathBuf,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,

        /// Do not back up the current graph first
        #[arg(long)]
        no_safety_backup: bool,
    },

    /// Delete every node and relationship
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), GraphError> {
    let config = AppConfig::load(cli.config.as_deref())?.with_database(cli.database);
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&config, force),
        Some(Commands::Status) => cmd_status(&config, json_mode),
        Some(Commands::CreateCourse { name, description }) => {
            cmd_create_course(&config, &name, &description)
        }
        Some(Commands::Ingest {
            course,
            files,
            no_densify,
        }) => cmd_ingest(&config, json_mode, &course, &files, !no_densify),
        Some(Commands::Summarize { course, file }) => {
            cmd_summarize(&config, json_mode, &course, &file)
        }
        Some(Commands::Show { name }) => cmd_show(&config, json_mode, &name),
        Some(Commands::Stats { course }) => cmd_stats(&config, json_mode, course.as_deref()),
        Some(Commands::Export { output, course }) => {
            cmd_export(&config, &output, course.as_deref())
        }
        Some(Commands::Backup) => cmd_backup(&config).map(|_| ()),
        Some(Commands::ListBackups) => cmd_list_backups(&config, json_mode),
        Some(Commands::Restore {
            file,
            force,
            no_safety_backup,
        }) => cmd_restore(&config, json_mode, &file, force, !no_safety_backup),
        Some(Commands::Clear { force }) => cmd_clear(&config, force),
        None => {
            // No subcommand - show status by default
            cmd_status(&config, json_mode)
        }
    }
}
