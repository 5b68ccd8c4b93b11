//! Tests for execute::destroy.

use stackdecl_lib::config::StackConfig;
use stackdecl_lib::execute::{self, ApplyOptions, Operation};
use stackdecl_lib::provider::SimulatedProvider;
use stackdecl_lib::provider::simulated::ProviderCall;
use stackdecl_lib::resource::{ResourceType, Urn};
use std::sync::Arc;

use super::common::*;

#[tokio::test]
async fn destroy_deletes_everything_dependents_first() {
  let env = TestStore::new();
  apply(program("federation"), provider(), &env.store).await;

  let provider = provider();
  let result = execute::destroy(STACK, provider.clone(), &env.store, &ApplyOptions::default())
    .await
    .unwrap();

  assert!(result.is_success());
  assert_eq!(result.count(Operation::Delete), 5);
  assert_eq!(result.program.as_deref(), Some("federation"));

  let calls = provider.calls();
  assert_eq!(
    calls.first(),
    Some(&ProviderCall::Delete(Urn::new(
      ResourceType::AwsIamRolePolicyAttachment,
      "federation-read"
    )))
  );

  let snapshot = env.store.load_current().unwrap().unwrap();
  assert!(snapshot.resources.is_empty());
  assert!(snapshot.exports.is_empty());
}

#[tokio::test]
async fn destroy_without_state_is_a_no_op() {
  let env = TestStore::new();
  let provider = provider();

  let result = execute::destroy(STACK, provider.clone(), &env.store, &ApplyOptions::default())
    .await
    .unwrap();

  assert!(result.changes.is_empty());
  assert!(result.snapshot.is_none());
  assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn failed_delete_keeps_remaining_resources() {
  let env = TestStore::new();
  apply(program("buckets"), provider(), &env.store).await;

  let gcs = Urn::new(ResourceType::GcpStorageBucket, "my-bucket");
  let provider = Arc::new(
    SimulatedProvider::new(STACK, &StackConfig::default())
      .unwrap()
      .with_failure(gcs.clone()),
  );
  let result = execute::destroy(STACK, provider.clone(), &env.store, &ApplyOptions::default())
    .await
    .unwrap();

  assert_eq!(result.failure.as_ref().and_then(|f| f.urn.as_ref()), Some(&gcs));

  let snapshot = env.store.load_current().unwrap().unwrap();
  assert_eq!(snapshot.resources.keys().cloned().collect::<Vec<_>>(), vec![gcs]);
  assert!(snapshot.exports.contains_key("bucket_name"));
}

#[tokio::test]
async fn dry_run_destroy_lists_deletions_only() {
  let env = TestStore::new();
  apply(program("buckets"), provider(), &env.store).await;
  let before = env.store.list().unwrap().len();

  let provider = provider();
  let options = ApplyOptions {
    dry_run: true,
    parallelism: 2,
  };
  let result = execute::destroy(STACK, provider.clone(), &env.store, &options).await.unwrap();

  assert_eq!(result.count(Operation::Delete), 2);
  assert!(provider.calls().is_empty());
  assert_eq!(env.store.list().unwrap().len(), before);
}
