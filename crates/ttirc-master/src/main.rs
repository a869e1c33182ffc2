// ABOUTME: ttirc-master CLI entry point.
// ABOUTME: Parses flags, sets up logging, and runs the connection supervisor.

use clap::Parser;
use std::path::PathBuf;
use ttirc_master::{run_master, MasterOptions};

#[derive(Parser)]
#[command(name = "ttirc-master")]
#[command(about = "Keeps one IRC session running per active ttirc connection")]
struct Cli {
    /// Settings namespace (reads ~/.config/ttirc/NODE/master.toml)
    #[arg(long, env = "TTIRC_NODE")]
    node: Option<String>,

    /// Path to configuration file (overrides --node)
    #[arg(long, env = "TTIRC_MASTER_CONFIG")]
    config: Option<PathBuf>,

    /// Run the configuration wizard before starting
    #[arg(long)]
    configure: bool,

    /// Reset stored connection state and exit
    #[arg(long)]
    cleanup: bool,

    /// Run sessions in-process (true) or as child processes (false)
    #[arg(long, value_name = "BOOL")]
    native: Option<bool>,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "TTIRC_MASTER_LOG")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match &cli.log_file {
        Some(path) => ttirc_log::init_file(path),
        None => ttirc_log::init(),
    }

    run_master(MasterOptions {
        config_path: cli.config,
        node: cli.node,
        configure: cli.configure,
        cleanup_only: cli.cleanup,
        native: cli.native,
    })
    .await
}
