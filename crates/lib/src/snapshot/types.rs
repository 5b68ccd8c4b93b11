use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::provider::Outputs;
use crate::resource::{ResourceType, Urn};
use crate::util::hash::ObjectHash;

/// Index format version this build reads and writes.
pub const SNAPSHOT_INDEX_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
  #[error("failed to create snapshot directory: {0}")]
  CreateDir(#[source] std::io::Error),

  #[error("failed to read snapshot: {0}")]
  Read(#[source] std::io::Error),

  #[error("failed to write snapshot: {0}")]
  Write(#[source] std::io::Error),

  #[error("failed to parse snapshot: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize snapshot: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("snapshot not found: {0}")]
  NotFound(String),

  #[error("unsupported snapshot index version {0} (expected {SNAPSHOT_INDEX_VERSION})")]
  UnsupportedVersion(u32),
}

/// Recorded state of one provisioned resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
  pub urn: Urn,
  #[serde(rename = "type")]
  pub rtype: ResourceType,
  pub name: String,
  pub inputs: Value,
  pub inputs_hash: ObjectHash,
  pub outputs: Outputs,
  #[serde(default)]
  pub dependencies: BTreeSet<Urn>,
}

/// The state of a stack after an apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub id: String,
  pub created_at: u64,
  pub stack: String,
  #[serde(default)]
  pub program: Option<String>,
  #[serde(default)]
  pub resources: BTreeMap<Urn, ResourceState>,
  #[serde(default)]
  pub exports: BTreeMap<String, Value>,
}

impl Snapshot {
  pub fn new(id: String, stack: impl Into<String>, program: Option<String>) -> Self {
    Self {
      id,
      created_at: now_secs(),
      stack: stack.into(),
      program,
      resources: BTreeMap::new(),
      exports: BTreeMap::new(),
    }
  }

  pub fn to_metadata(&self) -> SnapshotMetadata {
    SnapshotMetadata {
      id: self.id.clone(),
      created_at: self.created_at,
      program: self.program.clone(),
      resource_count: self.resources.len(),
    }
  }
}

/// Summary of a snapshot kept in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
  pub id: String,
  pub created_at: u64,
  #[serde(default)]
  pub program: Option<String>,
  pub resource_count: usize,
}

/// The list of snapshots of one stack plus the current pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotIndex {
  pub version: u32,
  pub snapshots: Vec<SnapshotMetadata>,
  pub current: Option<String>,
}

impl Default for SnapshotIndex {
  fn default() -> Self {
    Self::new()
  }
}

impl SnapshotIndex {
  pub fn new() -> Self {
    Self {
      version: SNAPSHOT_INDEX_VERSION,
      snapshots: Vec::new(),
      current: None,
    }
  }

  /// Insert or replace an entry, keeping entries ordered by creation time.
  pub fn add(&mut self, metadata: SnapshotMetadata) {
    self.snapshots.retain(|s| s.id != metadata.id);
    let pos = self
      .snapshots
      .iter()
      .position(|s| s.created_at > metadata.created_at)
      .unwrap_or(self.snapshots.len());
    self.snapshots.insert(pos, metadata);
  }

  /// Remove an entry. Clears the current pointer if it pointed there.
  pub fn remove(&mut self, id: &str) {
    self.snapshots.retain(|s| s.id != id);
    if self.current.as_deref() == Some(id) {
      self.current = None;
    }
  }

  pub fn len(&self) -> usize {
    self.snapshots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.snapshots.is_empty()
  }
}

fn now_secs() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0)
}

static ID_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A new snapshot ID: millisecond timestamp plus a process-local counter.
pub fn generate_snapshot_id() -> String {
  let millis = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis())
    .unwrap_or(0);
  let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed) % 0x10000;
  format!("{millis:x}{seq:04x}")
}
