//! On-disk snapshot history of one stack.
//!
//! ```text
//! stacks/<stack>/snapshots/
//! ├── index.json    # SnapshotIndex: ordered metadata + current pointer
//! └── <id>.json     # one Snapshot per apply or destroy
//! ```
//!
//! Every file is written to a `.tmp` sibling first and renamed into place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{ConfigError, validate_stack_name};
use crate::platform::paths::snapshots_dir;

use super::types::{SNAPSHOT_INDEX_VERSION, Snapshot, SnapshotError, SnapshotIndex, SnapshotMetadata};

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone)]
pub struct SnapshotStore {
  base_path: PathBuf,
}

impl SnapshotStore {
  pub fn new(base_path: PathBuf) -> Self {
    Self { base_path }
  }

  /// The store of `stack` under the data directory.
  ///
  /// Fails for names that would escape `stacks/`.
  pub fn for_stack(stack: &str) -> Result<Self, ConfigError> {
    validate_stack_name(stack)?;
    Ok(Self::new(snapshots_dir(stack)))
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  /// Read and parse `file`, or `None` if it does not exist.
  fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>, SnapshotError> {
    match fs::read_to_string(self.base_path.join(file)) {
      Ok(content) => serde_json::from_str(&content).map(Some).map_err(SnapshotError::Parse),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(SnapshotError::Read(e)),
    }
  }

  fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), SnapshotError> {
    fs::create_dir_all(&self.base_path).map_err(SnapshotError::CreateDir)?;

    let target = self.base_path.join(file);
    let staging = self.base_path.join(format!("{file}.tmp"));
    let content = serde_json::to_string_pretty(value).map_err(SnapshotError::Serialize)?;
    fs::write(&staging, content).map_err(SnapshotError::Write)?;
    fs::rename(&staging, &target).map_err(SnapshotError::Write)
  }

  /// The index, empty when nothing was saved yet.
  pub fn load_index(&self) -> Result<SnapshotIndex, SnapshotError> {
    let Some(index) = self.read_json::<SnapshotIndex>(INDEX_FILE)? else {
      return Ok(SnapshotIndex::new());
    };
    if index.version != SNAPSHOT_INDEX_VERSION {
      return Err(SnapshotError::UnsupportedVersion(index.version));
    }
    Ok(index)
  }

  pub fn current_id(&self) -> Result<Option<String>, SnapshotError> {
    Ok(self.load_index()?.current)
  }

  /// The snapshot the index points at, `None` before the first apply.
  pub fn load_current(&self) -> Result<Option<Snapshot>, SnapshotError> {
    self.current_id()?.map(|id| self.load_snapshot(&id)).transpose()
  }

  pub fn load_snapshot(&self, id: &str) -> Result<Snapshot, SnapshotError> {
    self
      .read_json(&format!("{id}.json"))?
      .ok_or_else(|| SnapshotError::NotFound(id.to_string()))
  }

  /// Record `snapshot` and make it the current state of the stack.
  ///
  /// The snapshot file lands before the index points at it.
  pub fn save_and_set_current(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    self.write_json(&format!("{}.json", snapshot.id), snapshot)?;

    let mut index = self.load_index()?;
    index.add(snapshot.to_metadata());
    index.current = Some(snapshot.id.clone());
    self.write_json(INDEX_FILE, &index)
  }

  /// Metadata of every recorded snapshot, oldest first.
  pub fn list(&self) -> Result<Vec<SnapshotMetadata>, SnapshotError> {
    Ok(self.load_index()?.snapshots)
  }

  /// Forget a snapshot. Deleting an unknown ID is not an error.
  pub fn delete_snapshot(&self, id: &str) -> Result<(), SnapshotError> {
    if let Err(e) = fs::remove_file(self.base_path.join(format!("{id}.json")))
      && e.kind() != io::ErrorKind::NotFound
    {
      return Err(SnapshotError::Write(e));
    }

    let mut index = self.load_index()?;
    index.remove(id);
    self.write_json(INDEX_FILE, &index)
  }
}
