//! Implementation of the `stack history` command.

use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use stackdecl_lib::snapshot::SnapshotMetadata;

use super::Context;
use crate::output::{format_timestamp, now_secs, print_info, print_json, print_success, print_warning};

#[derive(Serialize)]
struct HistoryOutput {
  snapshots: Vec<HistoryItem>,
  current: Option<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pruned: Vec<String>,
}

#[derive(Serialize)]
struct HistoryItem {
  #[serde(flatten)]
  metadata: SnapshotMetadata,
  is_current: bool,
}

/// List snapshots newest first, optionally pruning old ones.
///
/// The current snapshot is never pruned.
pub fn cmd_history(ctx: &Context, prune: Option<Duration>) -> Result<()> {
  let store = &ctx.store;
  let current_id = store.current_id()?;

  let mut pruned = Vec::new();
  if let Some(older_than) = prune {
    let cutoff = now_secs().saturating_sub(older_than.as_secs());
    for snapshot in store.list()? {
      if snapshot.created_at > cutoff || current_id.as_ref() == Some(&snapshot.id) {
        continue;
      }
      match store.delete_snapshot(&snapshot.id) {
        Ok(()) => {
          debug!(id = %snapshot.id, "pruned snapshot");
          pruned.push(snapshot.id);
        }
        Err(e) => print_warning(&format!("Failed to delete snapshot {}: {}", snapshot.id, e)),
      }
    }
  }

  let mut snapshots = store.list()?;
  snapshots.reverse();

  if ctx.output.is_json() {
    let items = snapshots
      .into_iter()
      .map(|metadata| HistoryItem {
        is_current: current_id.as_ref() == Some(&metadata.id),
        metadata,
      })
      .collect();
    return print_json(&HistoryOutput {
      snapshots: items,
      current: current_id,
      pruned,
    });
  }

  if !pruned.is_empty() {
    print_success(&format!("Pruned {} snapshot(s)", pruned.len()));
  }

  if snapshots.is_empty() {
    print_info("No snapshots found");
    return Ok(());
  }

  for snapshot in &snapshots {
    let marker = if current_id.as_ref() == Some(&snapshot.id) {
      " (current)"
    } else {
      ""
    };
    let program = snapshot.program.as_deref().unwrap_or("-");
    println!(
      "{}{} - {} {} ({} resources)",
      snapshot.id,
      marker,
      format_timestamp(snapshot.created_at),
      program,
      snapshot.resource_count
    );
  }

  print_info(&format!("{} snapshot(s) total", snapshots.len()));

  Ok(())
}
