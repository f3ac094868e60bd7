//! BizSync snapshot merge tool
//!
//! Merges two serialized versions of one record, as the sync engine would
//! when a remote version arrives, and reports how they related.
//!
//! Usage:
//!   bizsync-merge local.json remote.json --node laptop-01 --output merged.json
//!
//! The merged record goes to `--output` or stdout; the conflict record, if
//! any, goes to stderr.

use std::path::PathBuf;
use anyhow::{Context, Result};
use bizsync_cli::{load_config, merge_files, write_merged};
use bizsync_types::NodeId;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "bizsync-merge")]
#[command(about = "Merge two BizSync record snapshots")]
struct Args {
    /// Snapshot stored on this device
    local: PathBuf,

    /// Snapshot received from another device
    remote: PathBuf,

    /// Node id that owns the merged counters and sets
    #[arg(short, long)]
    node: Option<String>,

    /// Resolver configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the merged record here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = load_config(args.config.as_deref())?;
    debug!(?config, "resolver config loaded");
    let node = args
        .node
        .as_deref()
        .map(NodeId::parse)
        .transpose()
        .context("Invalid --node")?;

    let report = merge_files(&args.local, &args.remote, node.as_ref(), config)?;
    info!(order = ?report.order, "snapshots merged");
    write_merged(&report, args.output.as_deref())?;

    if let Some(conflict) = &report.conflict {
        let json = serde_json::to_string_pretty(conflict)
            .context("Failed to encode conflict record")?;
        eprintln!("{json}");
    }
    Ok(())
}
