//! Built-in programs.

use crate::graph::DeclareError;
use crate::policy::{GOOGLE_AUDIENCE_KEY, PolicyDocument, Statement, web_identity_trust_policy};
use crate::program::{Program, ProgramError, Stack};
use crate::resource::{PropertyBag, ResourceType};

static PROGRAMS: [Program; 3] = [
  Program {
    name: "buckets",
    description: "A GCP storage bucket and an AWS S3 bucket",
    declare: buckets,
  },
  Program {
    name: "federation",
    description: "GCP service account trusted by an AWS IAM role",
    declare: federation,
  },
  Program {
    name: "compute",
    description: "GCP compute instance running as a dedicated service account",
    declare: compute,
  },
];

pub fn registry() -> &'static [Program] {
  &PROGRAMS
}

pub fn lookup(name: &str) -> Result<&'static Program, ProgramError> {
  PROGRAMS
    .iter()
    .find(|p| p.name == name)
    .ok_or_else(|| ProgramError::NotFound(name.to_string()))
}

/// Both buckets export `bucket_name`; the S3 bucket's id is the one kept.
fn buckets(stack: &mut Stack) -> Result<(), DeclareError> {
  let bucket = stack.declare(
    ResourceType::GcpStorageBucket,
    "my-bucket",
    PropertyBag::new().with("location", "US"),
  )?;
  stack.export("bucket_name", bucket.string("url")?);

  let bucket = stack.declare(ResourceType::AwsS3Bucket, "my-bucket", PropertyBag::new())?;
  stack.export("bucket_name", bucket.id());

  Ok(())
}

fn federation(stack: &mut Stack) -> Result<(), DeclareError> {
  let account = stack.declare(
    ResourceType::GcpServiceAccount,
    "federation",
    PropertyBag::new()
      .with("account_id", "aws-federation")
      .with("display_name", "AWS federation"),
  )?;

  let unique_id = account.string("unique_id")?;
  let trust_policy = unique_id.try_transform(|id| {
    web_identity_trust_policy("accounts.google.com", GOOGLE_AUDIENCE_KEY, &id).to_json_string()
  });

  let role = stack.declare(
    ResourceType::AwsIamRole,
    "federation-role",
    PropertyBag::new()
      .with("assume_role_policy", trust_policy)
      .with("description", "Assumed by the GCP federation service account"),
  )?;

  let data = stack.declare(ResourceType::AwsS3Bucket, "federation-data", PropertyBag::new())?;
  let read_policy = data.string("arn")?.try_transform(|arn| {
    PolicyDocument::new(vec![
      Statement::allow()
        .sid("ReadFederationData")
        .action("s3:GetObject")
        .action("s3:ListBucket")
        .resource(arn.clone())
        .resource(format!("{arn}/*")),
    ])
    .to_json_string()
  });

  let policy = stack.declare(
    ResourceType::AwsIamPolicy,
    "federation-read",
    PropertyBag::new().with("policy", read_policy),
  )?;

  stack.declare(
    ResourceType::AwsIamRolePolicyAttachment,
    "federation-read",
    PropertyBag::new()
      .with("role", role.string("name")?)
      .with("policy_arn", policy.string("arn")?),
  )?;

  stack.export("service_account_email", account.string("email")?);
  stack.export("service_account_unique_id", unique_id);
  stack.export("role_arn", role.string("arn")?);
  stack.export("data_bucket", data.id());

  Ok(())
}

fn compute(stack: &mut Stack) -> Result<(), DeclareError> {
  let zone = stack.config().get_or("gcp:zone", "us-central1-a")?.to_string();
  let machine_type = stack.config().get_or("gcp:machineType", "e2-micro")?.to_string();

  let account = stack.declare(
    ResourceType::GcpServiceAccount,
    "compute-runner",
    PropertyBag::new()
      .with("account_id", "compute-runner")
      .with("display_name", "Compute instance runner"),
  )?;

  let instance = stack.declare(
    ResourceType::GcpComputeInstance,
    "web",
    PropertyBag::new()
      .with("machine_type", machine_type)
      .with("zone", zone)
      .with(
        "boot_disk",
        PropertyBag::new().with(
          "initialize_params",
          PropertyBag::new().with("image", "debian-cloud/debian-12"),
        ),
      )
      .with(
        "network_interfaces",
        vec![PropertyBag::new().with("network", "default")],
      )
      .with(
        "service_account",
        PropertyBag::new()
          .with("email", account.string("email")?)
          .with("scopes", vec!["https://www.googleapis.com/auth/cloud-platform"]),
      ),
  )?;

  stack.export("instance_name", instance.string("name")?);
  stack.export("internal_ip", instance.string("network_ip")?);

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::StackConfig;
  use crate::resource::Urn;
  use serde_json::json;
  use std::collections::BTreeSet;

  #[test]
  fn lookup_known_and_unknown() {
    assert_eq!(lookup("buckets").unwrap().name, "buckets");
    assert!(matches!(lookup("nope"), Err(ProgramError::NotFound(name)) if name == "nope"));
    assert_eq!(registry().len(), 3);
  }

  #[test]
  fn buckets_declares_same_name_on_both_clouds() {
    let stack = lookup("buckets").unwrap().run("dev", StackConfig::new()).unwrap();
    let urns: Vec<String> = stack.graph().intents().iter().map(|i| i.urn.to_string()).collect();
    assert_eq!(urns, vec!["gcp:storage/Bucket::my-bucket", "aws:s3/Bucket::my-bucket"]);
    assert_eq!(stack.exports().len(), 1);
    assert_eq!(
      stack.exports().resolve().unwrap()["bucket_name"],
      json!("$${output:aws:s3/Bucket::my-bucket.id}")
    );
  }

  #[test]
  fn federation_role_depends_on_service_account() {
    let stack = lookup("federation").unwrap().run("dev", StackConfig::new()).unwrap();
    let graph = stack.graph();
    assert_eq!(graph.len(), 5);

    let role = graph
      .intent(&Urn::new(ResourceType::AwsIamRole, "federation-role"))
      .unwrap();
    assert_eq!(
      role.dependencies(),
      BTreeSet::from([Urn::new(ResourceType::GcpServiceAccount, "federation")])
    );

    let attachment = graph
      .intent(&Urn::new(ResourceType::AwsIamRolePolicyAttachment, "federation-read"))
      .unwrap();
    assert_eq!(attachment.dependencies().len(), 2);
  }

  #[test]
  fn compute_reads_zone_from_config() {
    let config = StackConfig::new().with("gcp:zone", "europe-west1-b");
    let stack = lookup("compute").unwrap().run("dev", config).unwrap();
    let instance = stack
      .graph()
      .intent(&Urn::new(ResourceType::GcpComputeInstance, "web"))
      .unwrap();
    assert_eq!(instance.properties.preview()["zone"], json!("europe-west1-b"));
    assert_eq!(
      instance.properties.preview()["service_account"]["email"],
      json!("$${output:gcp:serviceaccount/Account::compute-runner.email}")
    );
  }
}
