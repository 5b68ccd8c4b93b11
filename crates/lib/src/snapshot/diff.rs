//! Diff computation between a declared graph and the recorded state.
//!
//! Only identity is compared here: which URNs are new, which are kept and
//! which are gone. Whether a kept resource changed is decided per node by
//! the driver once its inputs are known.

use std::collections::BTreeSet;

use crate::resource::Urn;

use super::types::Snapshot;

/// URN-level difference between desired and current state.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StateDiff {
  /// Declared, not in the snapshot.
  pub added: Vec<Urn>,

  /// Declared and in the snapshot.
  pub retained: Vec<Urn>,

  /// In the snapshot, no longer declared.
  pub removed: Vec<Urn>,
}

impl StateDiff {
  /// Returns true if the set of resources is unchanged.
  pub fn is_empty(&self) -> bool {
    self.added.is_empty() && self.removed.is_empty()
  }
}

/// Compute the diff between the declared URNs and the current snapshot.
///
/// `desired` keeps its order in `added` and `retained`. `removed` follows
/// the snapshot's URN order.
pub fn compute_diff(desired: &[Urn], current: Option<&Snapshot>) -> StateDiff {
  let mut diff = StateDiff::default();

  let recorded: BTreeSet<&Urn> = current.map(|s| s.resources.keys().collect()).unwrap_or_default();
  let declared: BTreeSet<&Urn> = desired.iter().collect();

  for urn in desired {
    if recorded.contains(urn) {
      diff.retained.push(urn.clone());
    } else {
      diff.added.push(urn.clone());
    }
  }

  diff.removed = recorded.difference(&declared).map(|urn| (*urn).clone()).collect();

  diff
}
