#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use std::path::PathBuf;

use clap::Parser;
use queue_relay::{logging, Relay, RelayConfig};

/// Relays messages from source queues to sets of destination queues
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// The path to the configuration file (TOML, or JSON with a `.json` extension)
    #[arg(long, env = "QUEUE_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Load and print the configuration, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init();

    let config_path = find_config_file(args.config)?;
    let config = RelayConfig::load(&config_path)?;

    if args.check {
        println!("Configuration file: {}", config_path.display());
        println!("{config}");
        return Ok(());
    }

    let routes = config.routes.len();
    let reports = Relay::from_config(config).await.run().await?;

    let failed = reports
        .iter()
        .filter(|report| report.termination.is_failure())
        .count();

    if routes > 0 && failed == routes {
        anyhow::bail!("All {routes} route(s) have failed, nothing left to relay");
    }

    Ok(())
}

/// Find the configuration file using the following precedence:
/// 1. `--config` (or the `QUEUE_RELAY_CONFIG` environment variable)
/// 2. ./queue-relay.toml (current working directory)
/// 3. /etc/queue-relay/queue-relay.toml (system-wide config)
fn find_config_file(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("Configuration file does not exist: {}", path.display());
    }

    let default_paths = [
        PathBuf::from("./queue-relay.toml"),
        PathBuf::from("/etc/queue-relay/queue-relay.toml"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config / QUEUE_RELAY_CONFIG\n{paths_tried}"
    )
}
