//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own temporary `STACKDECL_HOME`.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// Write a file relative to the temp directory and return its path.
  pub fn write_file(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
  }

  /// Snapshot directory of a stack.
  pub fn snapshots_path(&self, stack: &str) -> PathBuf {
    self.temp.path().join("stacks").join(stack).join("snapshots")
  }

  /// Get a Command for the stack binary with isolated state.
  pub fn stack_cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("stack");
    cmd.env("STACKDECL_HOME", self.temp.path()).env_remove("RUST_LOG");
    cmd
  }

  /// Run a command with `-o json`, assert success and parse stdout.
  pub fn json(&self, args: &[&str]) -> Value {
    let output = self.stack_cmd().args(args).args(["-o", "json"]).output().unwrap();
    assert!(
      output.status.success(),
      "{:?} failed: {}",
      args,
      String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
  }
}
