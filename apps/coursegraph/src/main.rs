//! # coursegraph
//!
//! The command-line front end of the course knowledge graph.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                apps/coursegraph (THE BINARY)              │
//! │                                                           │
//! │  ┌─────────────┐   ┌──────────────┐   ┌───────────────┐   │
//! │  │    CLI      │   │   Config     │   │   Backups     │   │
//! │  │   (clap)    │   │   (toml)     │   │  (files)      │   │
//! │  └──────┬──────┘   └──────┬───────┘   └───────┬───────┘   │
//! │         └─────────────────┼───────────────────┘           │
//! │                           ▼                               │
//! │                  ┌──────────────────┐                     │
//! │                  │ coursegraph-core │                     │
//! │                  │   (THE ENGINE)   │                     │
//! │                  └──────────────────┘                     │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! coursegraph ingest --course "Chemistry" chapter1.json chapter2.json
//! coursegraph stats --course "Chemistry"
//! coursegraph backup
//! coursegraph restore backups/graph_backup_20250101_120000.json
//! ```

use clap::Parser;
use coursegraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // COURSEGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("COURSEGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "coursegraph=info,coursegraph_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
