//! Recorded stack state.

mod diff;
mod storage;
mod types;

pub use diff::{StateDiff, compute_diff};
pub use storage::SnapshotStore;
pub use types::{
  ResourceState, SNAPSHOT_INDEX_VERSION, Snapshot, SnapshotError, SnapshotIndex, SnapshotMetadata,
  generate_snapshot_id,
};
