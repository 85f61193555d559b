//! gatesync CLI
//!
//! Replicates documents from a sync gateway into a local store and exits
//! when the session ends.
//!
//! ```text
//! gatesync --username alice --password secret --channels orders invoices
//! ```
//!
//! Exit codes: `0` when the session ended cleanly, `1` on a configuration,
//! store or session error, `2` on invalid usage.

mod commands;

use clap::Parser;
use commands::sync;
use gatesync_engine::{SyncRequest, DEFAULT_PROPERTIES_FILE};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Pull documents from a sync gateway into a local store.
#[derive(Parser)]
#[command(name = "gatesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Sync gateway user
    #[arg(short, long)]
    username: String,

    /// Sync gateway password
    #[arg(short, long)]
    password: String,

    /// Channels to replicate
    #[arg(short, long, required = true, num_args = 1.., value_delimiter = ',')]
    channels: Vec<String>,

    /// Properties file
    #[arg(long, default_value = DEFAULT_PROPERTIES_FILE)]
    config: PathBuf,

    /// Replication direction: Pull, Push or "Pull and Push"
    #[arg(short, long)]
    mode: Option<String>,

    /// Keep replicating after catching up
    #[arg(long)]
    continuous: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options = sync::SyncOptions {
        request: SyncRequest::new(cli.username, cli.password, cli.channels),
        config_path: cli.config,
        mode: cli.mode,
        continuous: cli.continuous,
    };

    match sync::run(options) {
        Ok(outcome) => {
            if let Some(status) = outcome.final_status {
                info!("Final status: {}", status);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
