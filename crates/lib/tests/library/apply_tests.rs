//! Tests for execute::apply.

use serde_json::json;
use stackdecl_lib::config::StackConfig;
use stackdecl_lib::execute::{ExecuteError, Operation};
use stackdecl_lib::graph::DeclareError;
use stackdecl_lib::program::{Program, Stack};
use stackdecl_lib::provider::SimulatedProvider;
use stackdecl_lib::provider::simulated::ProviderCall;
use stackdecl_lib::resource::{PropertyBag, ResourceType, Urn};
use std::sync::Arc;

use super::common::*;

fn located_bucket(stack: &mut Stack) -> Result<(), DeclareError> {
  let location = stack.config().get_or("location", "US")?.to_string();
  let bucket = stack.declare(
    ResourceType::GcpStorageBucket,
    "assets",
    PropertyBag::new().with("location", location),
  )?;
  stack.export("url", bucket.string("url")?);
  Ok(())
}

const LOCATED_BUCKET: Program = Program {
  name: "located-bucket",
  description: "one bucket whose location comes from config",
  declare: located_bucket,
};

fn rejected_trust_policy(stack: &mut Stack) -> Result<(), DeclareError> {
  let account = stack.declare(
    ResourceType::GcpServiceAccount,
    "federation",
    PropertyBag::new().with("account_id", "aws-federation"),
  )?;
  let policy = account
    .string("unique_id")?
    .try_transform(|id| Err::<String, _>(format!("no trust policy for {id}")));
  stack.declare(
    ResourceType::AwsIamRole,
    "federation-role",
    PropertyBag::new().with("assume_role_policy", policy),
  )?;
  Ok(())
}

const REJECTED_TRUST_POLICY: Program = Program {
  name: "rejected-trust-policy",
  description: "a role whose policy transform fails",
  declare: rejected_trust_policy,
};

fn classed_bucket(stack: &mut Stack) -> Result<(), DeclareError> {
  let storage_class = stack.config().get_or("storageClass", "STANDARD")?.to_string();
  let bucket = stack.declare(
    ResourceType::GcpStorageBucket,
    "archive",
    PropertyBag::new()
      .with("location", "US")
      .with("storage_class", storage_class),
  )?;
  stack.export("url", bucket.string("url")?);
  Ok(())
}

const CLASSED_BUCKET: Program = Program {
  name: "classed-bucket",
  description: "one bucket whose storage class comes from config",
  declare: classed_bucket,
};

fn unreadable_export(stack: &mut Stack) -> Result<(), DeclareError> {
  let account = stack.declare(
    ResourceType::GcpServiceAccount,
    "reader",
    PropertyBag::new().with("account_id", "export-reader"),
  )?;
  let audience = account
    .string("unique_id")?
    .try_transform(|id| Err::<String, _>(format!("audience {id} is not exportable")));
  stack.export("audience", audience);
  Ok(())
}

const UNREADABLE_EXPORT: Program = Program {
  name: "unreadable-export",
  description: "an export whose transform fails",
  declare: unreadable_export,
};

fn nearline() -> StackConfig {
  StackConfig::new().with("storageClass", "NEARLINE")
}

mod buckets {
  use super::*;

  #[tokio::test]
  async fn creates_both_buckets_and_keeps_last_export() {
    let env = TestStore::new();
    let provider = provider();

    let result = apply(program("buckets"), provider.clone(), &env.store).await;

    assert!(result.is_success());
    assert_eq!(result.count(Operation::Create), 2);

    let s3 = Urn::new(ResourceType::AwsS3Bucket, "my-bucket");
    let s3_change = result.changes.iter().find(|c| c.urn == s3).unwrap();
    let s3_id = s3_change.outputs.as_ref().unwrap()["id"].clone();
    assert_eq!(result.exports["bucket_name"], s3_id);
    assert!(s3_id.as_str().unwrap().starts_with("my-bucket-"));

    let snapshot = env.store.load_current().unwrap().unwrap();
    assert_eq!(snapshot.resources.len(), 2);
    assert_eq!(snapshot.exports, result.exports);
    assert_eq!(snapshot.program.as_deref(), Some("buckets"));
  }

  #[tokio::test]
  async fn second_apply_changes_nothing() {
    let env = TestStore::new();

    let first = apply(program("buckets"), provider(), &env.store).await;
    let provider = provider();
    let second = apply(program("buckets"), provider.clone(), &env.store).await;

    assert!(second.is_success());
    assert_eq!(second.count(Operation::Same), 2);
    assert!(provider.calls().is_empty());
    assert_eq!(second.exports, first.exports);
    assert_eq!(env.store.list().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn dry_run_calls_nothing_and_saves_nothing() {
    let env = TestStore::new();
    let provider = provider();

    let result = apply_with(program("buckets"), StackConfig::default(), provider.clone(), &env.store, true).await;

    assert!(result.dry_run);
    assert_eq!(result.count(Operation::Create), 2);
    assert!(result.snapshot.is_none());
    assert!(provider.calls().is_empty());
    assert!(env.store.load_current().unwrap().is_none());

    let exported = result.exports["bucket_name"].as_str().unwrap();
    assert!(exported.starts_with("$${"), "unexpected export: {exported}");
  }
}

mod federation {
  use super::*;

  #[tokio::test]
  async fn trust_policy_names_service_account() {
    let env = TestStore::new();

    let result = apply(program("federation"), provider(), &env.store).await;
    assert!(result.is_success(), "failure: {:?}", result.failure);
    assert_eq!(result.count(Operation::Create), 5);

    let unique_id = result.exports["service_account_unique_id"].as_str().unwrap().to_string();
    let role = Urn::new(ResourceType::AwsIamRole, "federation-role");
    let role_change = result.changes.iter().find(|c| c.urn == role).unwrap();
    let policy: serde_json::Value =
      serde_json::from_str(role_change.inputs["assume_role_policy"].as_str().unwrap()).unwrap();

    assert_eq!(
      policy["Statement"][0]["Condition"]["StringEquals"]["accounts.google.com:aud"],
      json!(unique_id)
    );
    assert_eq!(
      result.exports["role_arn"],
      role_change.outputs.as_ref().unwrap()["arn"]
    );
  }

  #[tokio::test]
  async fn dependencies_are_created_first() {
    let env = TestStore::new();
    let provider = provider();

    apply(program("federation"), provider.clone(), &env.store).await;

    let calls = provider.calls();
    let position = |urn: Urn| calls.iter().position(|c| *c == ProviderCall::Create(urn.clone())).unwrap();
    let account = position(Urn::new(ResourceType::GcpServiceAccount, "federation"));
    let role = position(Urn::new(ResourceType::AwsIamRole, "federation-role"));
    let policy = position(Urn::new(ResourceType::AwsIamPolicy, "federation-read"));
    let attachment = position(Urn::new(ResourceType::AwsIamRolePolicyAttachment, "federation-read"));

    assert!(account < role);
    assert!(role < attachment);
    assert!(policy < attachment);
  }

  #[tokio::test]
  async fn dry_run_previews_unknown_inputs() {
    let env = TestStore::new();

    let result = apply_with(program("federation"), StackConfig::default(), provider(), &env.store, true).await;

    let attachment = Urn::new(ResourceType::AwsIamRolePolicyAttachment, "federation-read");
    let change = result.changes.iter().find(|c| c.urn == attachment).unwrap();
    assert_eq!(change.inputs["role"], json!("$${output:aws:iam/Role::federation-role.name}"));
    assert!(change.outputs.is_none());
  }

  #[tokio::test]
  async fn failure_stops_after_its_wave() {
    let env = TestStore::new();
    let account = Urn::new(ResourceType::GcpServiceAccount, "federation");
    let provider = Arc::new(
      SimulatedProvider::new(STACK, &StackConfig::default())
        .unwrap()
        .with_failure(account.clone()),
    );

    let result = apply(program("federation"), provider.clone(), &env.store).await;

    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.urn.as_ref(), Some(&account));
    assert!(matches!(failure.error, ExecuteError::Provisioning(_)));

    // The bucket shares the failing wave and still gets created
    let data = Urn::new(ResourceType::AwsS3Bucket, "federation-data");
    assert_eq!(provider.calls(), vec![ProviderCall::Create(data.clone())]);

    let snapshot = env.store.load_current().unwrap().unwrap();
    assert_eq!(snapshot.resources.keys().cloned().collect::<Vec<_>>(), vec![data]);
    assert!(snapshot.exports.is_empty());
  }
}

mod transforms {
  use super::*;

  #[tokio::test]
  async fn failed_transform_fails_dependent_resource() {
    let env = TestStore::new();
    let provider = provider();

    let result = apply(&REJECTED_TRUST_POLICY, provider.clone(), &env.store).await;

    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.urn, Some(Urn::new(ResourceType::AwsIamRole, "federation-role")));
    assert!(
      failure.error.to_string().contains("no trust policy for 1"),
      "unexpected error: {}",
      failure.error
    );

    let account = Urn::new(ResourceType::GcpServiceAccount, "federation");
    assert_eq!(provider.calls(), vec![ProviderCall::Create(account.clone())]);
    let snapshot = env.store.load_current().unwrap().unwrap();
    assert!(snapshot.resources.contains_key(&account));
  }
}

mod exports {
  use super::*;

  #[tokio::test]
  async fn failed_export_is_not_blamed_on_a_resource() {
    let env = TestStore::new();

    let result = apply(&UNREADABLE_EXPORT, provider(), &env.store).await;

    let failure = result.failure.as_ref().unwrap();
    assert!(failure.urn.is_none());
    assert!(matches!(failure.error, ExecuteError::Export(_)));
    assert!(failure.error.to_string().contains("is not exportable"), "{}", failure.error);

    let account = Urn::new(ResourceType::GcpServiceAccount, "reader");
    let snapshot = env.store.load_current().unwrap().unwrap();
    assert!(snapshot.resources.contains_key(&account));
    assert!(snapshot.exports.is_empty());
  }
}

mod changes {
  use super::*;

  #[tokio::test]
  async fn changed_plain_property_updates_in_place() {
    let env = TestStore::new();
    let urn = Urn::new(ResourceType::GcpStorageBucket, "archive");
    let first = apply(&CLASSED_BUCKET, provider(), &env.store).await;
    let before = env.store.load_current().unwrap().unwrap().resources[&urn].clone();

    let provider = provider();
    let result = apply_with(&CLASSED_BUCKET, nearline(), provider.clone(), &env.store, false).await;

    assert!(result.is_success(), "failure: {:?}", result.failure);
    assert_eq!(result.changes[0].operation, Operation::Update);
    assert_eq!(provider.calls(), vec![ProviderCall::Update(urn.clone())]);
    assert_eq!(result.changes[0].outputs.as_ref().unwrap()["id"], before.outputs["id"]);
    assert_eq!(result.exports, first.exports);

    let after = env.store.load_current().unwrap().unwrap().resources[&urn].clone();
    assert_eq!(after.inputs["storage_class"], json!("NEARLINE"));
    assert_ne!(after.inputs_hash, before.inputs_hash);
    assert_eq!(after.outputs["id"], before.outputs["id"]);

    let third = apply_with(&CLASSED_BUCKET, nearline(), super::provider(), &env.store, false).await;
    assert_eq!(third.changes[0].operation, Operation::Same);
  }

  #[tokio::test]
  async fn failed_update_keeps_previous_state() {
    let env = TestStore::new();
    let urn = Urn::new(ResourceType::GcpStorageBucket, "archive");
    let first = apply(&CLASSED_BUCKET, provider(), &env.store).await;
    let before = env.store.load_current().unwrap().unwrap();

    let provider = Arc::new(
      SimulatedProvider::new(STACK, &StackConfig::default())
        .unwrap()
        .with_failure(urn.clone()),
    );
    let result = apply_with(&CLASSED_BUCKET, nearline(), provider.clone(), &env.store, false).await;

    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.urn.as_ref(), Some(&urn));
    assert!(matches!(failure.error, ExecuteError::Provisioning(_)));
    assert_eq!(result.changes[0].operation, Operation::Update);
    assert!(provider.calls().is_empty());

    let after = env.store.load_current().unwrap().unwrap();
    assert_ne!(after.id, before.id);
    assert_eq!(after.resources[&urn], before.resources[&urn]);
    assert_eq!(after.exports, first.exports);

    // The recorded inputs are still the old ones, so a retry updates again
    let retry = apply_with(&CLASSED_BUCKET, nearline(), super::provider(), &env.store, false).await;
    assert_eq!(retry.changes[0].operation, Operation::Update);
  }

  #[tokio::test]
  async fn changed_location_replaces_bucket() {
    let env = TestStore::new();
    apply(&LOCATED_BUCKET, provider(), &env.store).await;

    let provider = provider();
    let config = StackConfig::new().with("location", "EU");
    let result = apply_with(&LOCATED_BUCKET, config, provider.clone(), &env.store, false).await;

    let urn = Urn::new(ResourceType::GcpStorageBucket, "assets");
    assert_eq!(result.changes[0].operation, Operation::Replace);
    assert_eq!(
      provider.calls(),
      vec![ProviderCall::Delete(urn.clone()), ProviderCall::Create(urn.clone())]
    );

    let snapshot = env.store.load_current().unwrap().unwrap();
    assert_eq!(snapshot.resources[&urn].outputs["location"], json!("EU"));
  }

  #[tokio::test]
  async fn undeclared_resources_are_deleted_dependents_first() {
    let env = TestStore::new();
    apply(program("federation"), provider(), &env.store).await;

    let provider = provider();
    let result = apply(program("buckets"), provider.clone(), &env.store).await;

    assert!(result.is_success());
    assert_eq!(result.count(Operation::Create), 2);
    assert_eq!(result.count(Operation::Delete), 5);

    let calls = provider.calls();
    let deleted = |urn: Urn| calls.iter().position(|c| *c == ProviderCall::Delete(urn.clone())).unwrap();
    let attachment = deleted(Urn::new(ResourceType::AwsIamRolePolicyAttachment, "federation-read"));
    let role = deleted(Urn::new(ResourceType::AwsIamRole, "federation-role"));
    let account = deleted(Urn::new(ResourceType::GcpServiceAccount, "federation"));
    assert!(attachment < role);
    assert!(role < account);

    let snapshot = env.store.load_current().unwrap().unwrap();
    assert_eq!(snapshot.resources.len(), 2);
    assert!(!snapshot.exports.contains_key("role_arn"));
  }
}
