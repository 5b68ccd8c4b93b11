//! Types for the provisioning driver.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::deferred::DeferredError;
use crate::graph::DeclareError;
use crate::provider::{Outputs, ProviderError};
use crate::resource::{ResourceType, Urn};
use crate::snapshot::{Snapshot, SnapshotError};

/// What the driver does with one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
  Create,
  Update,
  /// Delete, then create.
  Replace,
  Delete,
  Same,
}

impl Operation {
  pub fn as_str(&self) -> &'static str {
    match self {
      Operation::Create => "create",
      Operation::Update => "update",
      Operation::Replace => "replace",
      Operation::Delete => "delete",
      Operation::Same => "same",
    }
  }

  pub fn is_change(&self) -> bool {
    !matches!(self, Operation::Same)
  }
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Errors that can occur while applying or destroying a stack.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// The declaration pass failed.
  #[error("declaration failed: {0}")]
  Declare(#[from] DeclareError),

  #[error("snapshot error: {0}")]
  Snapshot(#[from] SnapshotError),

  /// Cycle detected in the dependency graph.
  #[error("dependency cycle detected")]
  CycleDetected,

  /// An input of the resource failed to resolve.
  #[error("input of {urn} failed: {source}")]
  Input {
    urn: Urn,
    #[source]
    source: DeferredError,
  },

  /// An input was still unknown when the resource was due.
  #[error("input of {urn} is still unknown")]
  UnresolvedInput { urn: Urn },

  #[error("failed to hash inputs of {urn}: {source}")]
  Hash {
    urn: Urn,
    #[source]
    source: serde_json::Error,
  },

  /// The provider rejected or failed the resource.
  #[error("provisioning failed: {0}")]
  Provisioning(#[from] ProviderError),

  /// The provider did not report every declared output attribute.
  #[error("{urn} did not report outputs: {}", attrs.join(", "))]
  MissingOutput { urn: Urn, attrs: Vec<String> },

  /// An export failed to resolve.
  #[error("export failed: {0}")]
  Export(#[source] DeferredError),

  /// A provisioning task panicked or was cancelled.
  #[error("task failed for {urn}: {message}")]
  Task { urn: Urn, message: String },
}

/// Options for apply and destroy.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
  /// Compute the operations without calling the provider or saving state.
  pub dry_run: bool,

  /// Maximum number of concurrent provider calls.
  pub parallelism: usize,
}

impl Default for ApplyOptions {
  fn default() -> Self {
    Self {
      dry_run: false,
      parallelism: num_cpus(),
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// The planned or performed change to one resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceChange {
  pub urn: Urn,
  #[serde(rename = "type")]
  pub rtype: ResourceType,
  pub operation: Operation,
  /// Inputs, with placeholders for values not known yet.
  pub inputs: Value,
  /// Outputs after the change, if known.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub outputs: Option<Outputs>,
}

/// What stopped a run, and why.
#[derive(Debug)]
pub struct NodeFailure {
  /// The failing resource. `None` when an export failed.
  pub urn: Option<Urn>,
  pub error: ExecuteError,
}

/// Result of an apply or destroy.
#[derive(Debug)]
pub struct ApplyResult {
  pub stack: String,
  pub program: Option<String>,
  pub dry_run: bool,

  /// Declared resources in declaration order, then deletions.
  pub changes: Vec<ResourceChange>,

  /// Resolved exports. Unknown values are placeholders.
  pub exports: BTreeMap<String, Value>,

  /// The saved snapshot. `None` for a dry run or when nothing was recorded.
  pub snapshot: Option<Snapshot>,

  /// Set when a resource failed and the run stopped.
  pub failure: Option<NodeFailure>,
}

impl ApplyResult {
  pub fn is_success(&self) -> bool {
    self.failure.is_none()
  }

  /// Number of changes per operation.
  pub fn counts(&self) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for change in &self.changes {
      *counts.entry(change.operation.as_str()).or_insert(0) += 1;
    }
    counts
  }

  pub fn count(&self, operation: Operation) -> usize {
    self.changes.iter().filter(|c| c.operation == operation).count()
  }
}
