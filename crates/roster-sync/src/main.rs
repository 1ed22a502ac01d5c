//! roster-sync: Fold device-cached player histories into the remote store.
//!
//! Uses the same roster-history core as the app, with JSON files standing in
//! for the device cache and the remote store.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use roster_history::{EventBus, PlayerTag, SyncOrchestrator};
use roster_sync::{Config, JsonDirCache, JsonFileStore, Overrides};

#[derive(Parser, Debug)]
#[command(name = "roster-sync")]
#[command(about = "Reconcile cached player histories with the remote store")]
struct Args {
    /// Directory of cached player records (one JSON file per player)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// JSON file holding the remote store
    #[arg(long, global = true)]
    remote: Option<PathBuf>,

    /// Clan tag whose records are synced
    #[arg(long, global = true)]
    clan: Option<String>,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Stream sync progress events to stderr as JSON lines
    #[arg(long)]
    events: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge every cached record into the remote store
    Sync,
    /// Show the merged record for one player without writing anything
    Preview {
        /// Player tag, with or without the leading '#'
        player_tag: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,roster_history=debug,roster_sync=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::resolve(Overrides {
        cache_dir: args.cache_dir,
        remote_path: args.remote,
        clan_tag: args.clan,
    })?;

    info!("Cache directory: {:?}", config.cache_dir);
    info!("Remote store: {:?}", config.remote_path);

    let mut bus = EventBus::new();
    if args.events {
        bus.subscribe(|event| match serde_json::to_string(event) {
            Ok(line) => eprintln!("{}", line),
            Err(e) => warn!("Failed to encode event {:?}: {}", event, e),
        });
    }

    let orchestrator = SyncOrchestrator::new(
        JsonDirCache::new(config.cache_dir.clone()),
        JsonFileStore::new(config.remote_path.clone()),
    )
    .with_events(bus);

    match args.command {
        Command::Sync => {
            info!("Syncing clan {}", config.clan_tag);
            let report = orchestrator.sync_all(&config.clan_tag).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                bail!("{} of {} record(s) failed to sync", report.failed.len(), report.attempted());
            }
        }
        Command::Preview { player_tag } => {
            let tag: PlayerTag = player_tag.parse()?;
            let merged = orchestrator.preview(&config.clan_tag, &tag).await?;
            println!("{}", serde_json::to_string_pretty(&merged)?);
        }
    }

    Ok(())
}
