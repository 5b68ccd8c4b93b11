use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn up_reports_creates_then_nothing_to_change() {
  let env = TestEnv::new();

  let first = env.json(&["up", "federation"]);
  assert_eq!(first["summary"]["create"], 5);
  assert!(first.get("failure").is_none());

  let second = env.json(&["up", "federation"]);
  assert_eq!(second["summary"]["same"], 5);
  assert!(second["summary"].get("create").is_none());
}

#[test]
fn exports_match_provider_outputs() {
  let env = TestEnv::new();

  let report = env.json(&["up", "buckets"]);
  let s3 = report["changes"]
    .as_array()
    .unwrap()
    .iter()
    .find(|c| c["urn"] == "aws:s3/Bucket::my-bucket")
    .unwrap();
  assert_eq!(report["exports"]["bucket_name"], s3["outputs"]["id"]);

  let exports = env.json(&["output"]);
  assert_eq!(exports, report["exports"]);
}

#[test]
fn stack_config_file_sets_stack_and_project() {
  let env = TestEnv::new();
  let config = env.write_file(
    "prod.yaml",
    "stack: prod\nconfig:\n  gcp:project: acme-prod\n  gcp:zone: europe-west1-b\n",
  );

  let report = env.json(&["--config", config.to_str().unwrap(), "up", "compute"]);
  assert_eq!(report["stack"], "prod");

  let instance = report["changes"]
    .as_array()
    .unwrap()
    .iter()
    .find(|c| c["urn"] == "gcp:compute/Instance::web")
    .unwrap();
  assert_eq!(instance["inputs"]["zone"], "europe-west1-b");
  assert_eq!(
    instance["inputs"]["service_account"]["email"],
    "compute-runner@acme-prod.iam.gserviceaccount.com"
  );
  assert!(env.snapshots_path("prod").join("index.json").exists());
}

#[test]
fn stack_flag_overrides_config_file() {
  let env = TestEnv::new();
  let config = env.write_file("c.yaml", "stack: prod\n");

  let report = env.json(&["--config", config.to_str().unwrap(), "--stack", "qa", "up", "buckets"]);
  assert_eq!(report["stack"], "qa");
  assert!(env.snapshots_path("qa").join("index.json").exists());
}

#[test]
fn default_stack_config_is_read_from_state_directory() {
  let env = TestEnv::new();
  env.write_file("stacks/dev/config.yaml", "config:\n  gcp:machineType: n2-standard-4\n");

  let report = env.json(&["preview", "compute"]);
  let instance = report["changes"]
    .as_array()
    .unwrap()
    .iter()
    .find(|c| c["urn"] == "gcp:compute/Instance::web")
    .unwrap();
  assert_eq!(instance["inputs"]["machine_type"], "n2-standard-4");
}

#[test]
fn invalid_config_value_fails_the_run() {
  let env = TestEnv::new();
  let config = env.write_file("bad.yaml", "config:\n  gcp:zone: 5\n");

  env
    .stack_cmd()
    .args(["--config", config.to_str().unwrap(), "up", "compute"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("gcp:zone"));

  assert!(!env.snapshots_path("dev").join("index.json").exists());
}

#[test]
fn switching_programs_deletes_old_resources() {
  let env = TestEnv::new();
  env.json(&["up", "federation"]);

  let report = env.json(&["up", "buckets"]);
  assert_eq!(report["summary"]["delete"], 5);
  assert_eq!(report["summary"]["create"], 2);
}

#[test]
fn verbose_flag_enables_info_logs() {
  let env = TestEnv::new();

  env
    .stack_cmd()
    .args(["-v", "up", "buckets"])
    .assert()
    .success()
    .stderr(predicate::str::contains("apply complete"));
}

#[test]
fn stack_names_cannot_leave_the_state_directory() {
  let env = TestEnv::new();
  let absolute = env.temp.path().join("elsewhere");

  for stack in ["../escape", absolute.to_str().unwrap()] {
    env
      .stack_cmd()
      .args(["--stack", stack, "up", "buckets"])
      .assert()
      .failure()
      .stderr(predicate::str::contains("invalid stack name"));
  }

  let config = env.write_file("c.yaml", "stack: ../from-config\n");
  env
    .stack_cmd()
    .args(["--config", config.to_str().unwrap(), "up", "buckets"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid stack name"));

  assert!(!env.temp.path().join("escape").exists());
  assert!(!env.temp.path().join("from-config").exists());
  assert!(!absolute.exists());
  assert!(!env.temp.path().join("stacks").exists());
}
