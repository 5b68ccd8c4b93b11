use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn history_lists_newest_first_with_current_marker() {
  let env = TestEnv::new();
  env.json(&["up", "buckets"]);
  env.json(&["up", "federation"]);

  let history = env.json(&["history"]);
  let snapshots = history["snapshots"].as_array().unwrap();
  assert_eq!(snapshots.len(), 2);
  assert_eq!(snapshots[0]["program"], "federation");
  assert_eq!(snapshots[0]["is_current"], true);
  assert_eq!(snapshots[1]["is_current"], false);
  assert_eq!(history["current"], snapshots[0]["id"]);
}

#[test]
fn history_text_marks_current() {
  let env = TestEnv::new();
  env.json(&["up", "buckets"]);

  env
    .stack_cmd()
    .arg("history")
    .assert()
    .success()
    .stdout(predicate::str::contains("(current)"))
    .stdout(predicate::str::contains("buckets (2 resources)"));
}

#[test]
fn prune_keeps_current_snapshot() {
  let env = TestEnv::new();
  env.json(&["up", "buckets"]);
  env.json(&["up", "federation"]);

  let history = env.json(&["history", "--prune", "0s"]);
  let snapshots = history["snapshots"].as_array().unwrap();
  assert_eq!(snapshots.len(), 1);
  assert_eq!(snapshots[0]["program"], "federation");
  assert_eq!(history["pruned"].as_array().unwrap().len(), 1);
}
