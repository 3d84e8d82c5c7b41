//! Castline CLI - Headless front-end for the playback controller
//!
//! Features:
//! - Channel catalog listing with comma-separated search
//! - Manifest probing (quality menu, DRM coverage)
//! - Headless playback with quality pinning and status watching

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod catalog;
mod commands;
mod output;

/// Castline CLI - Adaptive stream playback from the terminal
#[derive(Parser)]
#[command(name = "castline")]
#[command(author = "Castline Contributors")]
#[command(version)]
#[command(about = "Browse channel catalogs and drive the adaptive playback controller", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Controller configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the in-memory engine instead of fetching manifests
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog entries
    List {
        /// Catalog file (JSON array of sources)
        #[arg(short, long)]
        catalog: PathBuf,

        /// Comma-separated terms matched against name and category
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Load a manifest and show its quality menu
    Probe {
        /// URL to manifest
        manifest: String,

        /// ClearKey pair as KID:KEY (hex), repeatable
        #[arg(short = 'k', long = "clear-key", value_name = "KID:KEY")]
        clear_keys: Vec<String>,
    },

    /// Play a catalog entry headlessly
    Play {
        /// Catalog file (JSON array of sources)
        #[arg(short, long)]
        catalog: PathBuf,

        /// Entry id or name
        channel: String,

        /// Quality label to pin ("1080p", "720p", ...) or "auto"
        #[arg(short, long, default_value = "auto")]
        quality: String,

        /// Seconds to keep the session alive while watching status (0 = exit after load)
        #[arg(short, long, default_value = "0")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    castline_core::init();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::List { catalog, search } => {
            commands::list(&catalog, search.as_deref(), &cli.format)?;
        }
        Commands::Probe { manifest, clear_keys } => {
            commands::probe(&manifest, &clear_keys, config, cli.dry_run, &cli.format).await?;
        }
        Commands::Play { catalog, channel, quality, duration } => {
            commands::play(&catalog, &channel, &quality, duration, config, cli.dry_run, &cli.format).await?;
        }
    }

    Ok(())
}
