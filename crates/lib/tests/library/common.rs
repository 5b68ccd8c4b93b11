use std::sync::Arc;

use stackdecl_lib::config::StackConfig;
use stackdecl_lib::execute::{self, ApplyOptions, ApplyResult};
use stackdecl_lib::program::Program;
use stackdecl_lib::programs;
use stackdecl_lib::provider::SimulatedProvider;
use stackdecl_lib::snapshot::SnapshotStore;
use tempfile::TempDir;

pub const STACK: &str = "dev";

/// A snapshot store in a scratch directory.
pub struct TestStore {
  _dir: TempDir,
  pub store: SnapshotStore,
}

impl TestStore {
  pub fn new() -> Self {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path().join("snapshots"));
    Self { _dir: dir, store }
  }
}

pub fn provider() -> Arc<SimulatedProvider> {
  Arc::new(SimulatedProvider::new(STACK, &StackConfig::default()).unwrap())
}

pub fn program(name: &str) -> &'static Program {
  programs::lookup(name).unwrap()
}

pub async fn apply_with(
  program: &Program,
  config: StackConfig,
  provider: Arc<SimulatedProvider>,
  store: &SnapshotStore,
  dry_run: bool,
) -> ApplyResult {
  let options = ApplyOptions {
    dry_run,
    parallelism: 4,
  };
  execute::apply(program, STACK, config, provider, store, &options).await.unwrap()
}

pub async fn apply(program: &Program, provider: Arc<SimulatedProvider>, store: &SnapshotStore) -> ApplyResult {
  apply_with(program, StackConfig::default(), provider, store, false).await
}
