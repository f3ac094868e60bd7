//! File handling behind the `bizsync-merge` binary.

use anyhow::{Context, Result, bail};
use bizsync_crdt::CausalOrder;
use bizsync_model::{ConflictRecord, ConflictResolver, CrdtRecord, ResolverConfig};
use bizsync_types::NodeId;
use std::{collections::BTreeMap, fs, path::Path};
use tracing::{debug, info};

/// Result of merging two record snapshots.
#[derive(Debug, Clone)]
pub struct MergeReport {
    pub merged: CrdtRecord,
    pub order: CausalOrder,
    pub field_orders: BTreeMap<String, CausalOrder>,
    pub conflict: Option<ConflictRecord>,
}

/// Loads a resolver configuration, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<ResolverConfig> {
    let Some(path) = path else {
        return Ok(ResolverConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid resolver config in {}", path.display()))
}

/// Reads one `CrdtRecord` snapshot.
pub fn read_record(path: &Path) -> Result<CrdtRecord> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    CrdtRecord::from_json(&text)
        .with_context(|| format!("Failed to decode snapshot {}", path.display()))
}

/// Merges two decoded snapshots. With `node`, the merged counters and sets
/// are re-homed to that node.
pub fn merge_records(
    local: &CrdtRecord,
    remote: &CrdtRecord,
    node: Option<&NodeId>,
    config: ResolverConfig,
) -> Result<MergeReport> {
    if local.id() != remote.id() {
        bail!(
            "Snapshots describe different entities: {} and {}",
            local.id(),
            remote.id()
        );
    }

    let resolution = ConflictResolver::new(config)
        .resolve(local, remote)
        .context("Failed to resolve snapshots")?;
    let order = resolution.order();
    let field_orders = resolution.field_orders().clone();
    let (merged, conflict) = resolution.into_parts();
    let merged = match node {
        Some(node) => merged.with_node(node),
        None => merged,
    };

    if let Some(record) = &conflict {
        info!(
            entity = %merged.id(),
            conflict_type = ?record.conflict_type,
            fields = record.concurrent_fields.len(),
            "conflict recorded"
        );
    } else {
        debug!(entity = %merged.id(), ?order, "merged without conflict record");
    }

    Ok(MergeReport {
        merged,
        order,
        field_orders,
        conflict,
    })
}

/// Reads both snapshot files and merges them.
pub fn merge_files(
    local: &Path,
    remote: &Path,
    node: Option<&NodeId>,
    config: ResolverConfig,
) -> Result<MergeReport> {
    let local = read_record(local)?;
    let remote = read_record(remote)?;
    merge_records(&local, &remote, node, config)
}

/// Writes the merged record as pretty JSON, to `path` or to stdout.
pub fn write_merged(report: &MergeReport, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(&report.merged)
        .context("Failed to encode merged record")?;
    match path {
        Some(path) => fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}
