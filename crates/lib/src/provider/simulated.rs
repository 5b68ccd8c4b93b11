//! A deterministic, in-process stand-in for GCP and AWS.
//!
//! Identifiers are derived from a hash of the stack name and the URN, so the
//! same program applied to the same stack always yields the same outputs.
//! Inputs are checked the way the provider schema would check them.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{ConfigError, StackConfig};
use crate::consts::AUTONAME_SUFFIX_LEN;
use crate::resource::{ResourceType, Urn};
use crate::util::hash::hash_bytes;

use super::{ExistingResource, Outputs, Provider, ProviderError, ResourceRequest};

pub const DEFAULT_GCP_PROJECT: &str = "demo-project";
pub const DEFAULT_AWS_ACCOUNT: &str = "123456789012";
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// A provider call, recorded for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
  Create(Urn),
  Update(Urn),
  Delete(Urn),
}

#[derive(Debug)]
pub struct SimulatedProvider {
  stack: String,
  project: String,
  account_id: String,
  region: String,
  failures: BTreeSet<Urn>,
  calls: Mutex<Vec<ProviderCall>>,
}

impl SimulatedProvider {
  /// Reads `gcp:project`, `aws:accountId` and `aws:region`, with defaults.
  pub fn new(stack: &str, config: &StackConfig) -> Result<Self, ConfigError> {
    Ok(Self {
      stack: stack.to_string(),
      project: config.get_or("gcp:project", DEFAULT_GCP_PROJECT)?.to_string(),
      account_id: config.get_or("aws:accountId", DEFAULT_AWS_ACCOUNT)?.to_string(),
      region: config.get_or("aws:region", DEFAULT_AWS_REGION)?.to_string(),
      failures: BTreeSet::new(),
      calls: Mutex::new(Vec::new()),
    })
  }

  /// Make every call for `urn` fail.
  pub fn with_failure(mut self, urn: Urn) -> Self {
    self.failures.insert(urn);
    self
  }

  /// Calls made so far, in completion order.
  pub fn calls(&self) -> Vec<ProviderCall> {
    self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  fn record(&self, call: ProviderCall) {
    self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
  }

  fn check_failure(&self, urn: &Urn) -> Result<(), ProviderError> {
    if self.failures.contains(urn) {
      return Err(ProviderError::Failed {
        urn: urn.clone(),
        message: "simulated provider failure".to_string(),
      });
    }
    Ok(())
  }

  fn seed(&self, urn: &Urn) -> String {
    hash_bytes(format!("{}/{}", self.stack, urn).as_bytes())
  }

  fn autoname(&self, request: &ResourceRequest) -> String {
    let seed = self.seed(&request.urn);
    format!("{}-{}", request.name, &seed[..AUTONAME_SUFFIX_LEN])
  }

  /// The explicit `key` input, or an autoname.
  fn physical_name(&self, request: &ResourceRequest, key: &str) -> Result<String, ProviderError> {
    Ok(match request.input_str(key)? {
      Some(name) => name.to_string(),
      None => self.autoname(request),
    })
  }

  fn provision(&self, request: &ResourceRequest) -> Result<Outputs, ProviderError> {
    self.check_failure(&request.urn)?;
    if !request.inputs.is_object() {
      return Err(ProviderError::InvalidProperty {
        urn: request.urn.clone(),
        property: "*".to_string(),
        reason: "inputs must be an object".to_string(),
      });
    }

    let seed = self.seed(&request.urn);
    let outputs = match request.rtype {
      ResourceType::GcpStorageBucket => {
        let location = request.require_str("location")?.to_uppercase();
        let id = self.physical_name(request, "name")?;
        json!({
          "id": id,
          "name": id,
          "url": format!("gs://{id}"),
          "self_link": format!("https://www.googleapis.com/storage/v1/b/{id}"),
          "location": location,
        })
      }
      ResourceType::GcpServiceAccount => {
        let account_id = request.require_str("account_id")?;
        validate_account_id(request, account_id)?;
        let email = format!("{account_id}@{}.iam.gserviceaccount.com", self.project);
        let id = format!("projects/{}/serviceAccounts/{email}", self.project);
        json!({
          "id": id,
          "name": id,
          "email": email,
          "unique_id": format!("1{}", digits(&seed, 20)),
          "account_id": account_id,
        })
      }
      ResourceType::GcpComputeInstance => {
        request.require_str("machine_type")?;
        request.require("boot_disk")?;
        let zone = request.require_str("zone")?;
        let name = self.physical_name(request, "name")?;
        let path = format!("projects/{}/zones/{zone}/instances/{name}", self.project);
        json!({
          "id": path,
          "name": name,
          "instance_id": format!("1{}", digits(&seed, 18)),
          "self_link": format!("https://www.googleapis.com/compute/v1/{path}"),
          "network_ip": internal_ip(&seed),
          "zone": zone,
        })
      }
      ResourceType::AwsS3Bucket => {
        let id = self.physical_name(request, "bucket")?;
        let region = request.input_str("region")?.unwrap_or(self.region.as_str());
        json!({
          "id": id,
          "bucket": id,
          "arn": format!("arn:aws:s3:::{id}"),
          "bucket_domain_name": format!("{id}.s3.amazonaws.com"),
          "region": region,
        })
      }
      ResourceType::AwsIamRole => {
        validate_policy(request, "assume_role_policy")?;
        let name = self.physical_name(request, "name")?;
        json!({
          "id": name,
          "name": name,
          "arn": format!("arn:aws:iam::{}:role/{name}", self.account_id),
          "unique_id": format!("AROA{}", seed[..17].to_uppercase()),
        })
      }
      ResourceType::AwsIamPolicy => {
        validate_policy(request, "policy")?;
        let name = self.physical_name(request, "name")?;
        let arn = format!("arn:aws:iam::{}:policy/{name}", self.account_id);
        json!({
          "id": arn,
          "name": name,
          "arn": arn,
          "policy_id": format!("ANPA{}", seed[..17].to_uppercase()),
        })
      }
      ResourceType::AwsIamRolePolicyAttachment => {
        let role = request.require_str("role")?;
        let policy_arn = request.require_str("policy_arn")?;
        if !policy_arn.starts_with("arn:aws:iam::") {
          return Err(ProviderError::InvalidProperty {
            urn: request.urn.clone(),
            property: "policy_arn".to_string(),
            reason: format!("'{policy_arn}' is not an IAM policy ARN"),
          });
        }
        json!({
          "id": format!("{role}-{}", &seed[..AUTONAME_SUFFIX_LEN]),
          "role": role,
          "policy_arn": policy_arn,
        })
      }
    };

    match outputs {
      Value::Object(map) => Ok(map.into_iter().collect()),
      _ => Ok(Outputs::new()),
    }
  }
}

#[async_trait]
impl Provider for SimulatedProvider {
  async fn create(&self, request: ResourceRequest) -> Result<Outputs, ProviderError> {
    debug!(urn = %request.urn, "simulated create");
    let outputs = self.provision(&request)?;
    self.record(ProviderCall::Create(request.urn));
    Ok(outputs)
  }

  async fn update(&self, request: ResourceRequest, current: ExistingResource) -> Result<Outputs, ProviderError> {
    debug!(urn = %request.urn, "simulated update");
    let mut outputs = self.provision(&request)?;
    // Identity survives an in-place update
    if let Some(id) = current.outputs.get("id") {
      outputs.insert("id".to_string(), id.clone());
    }
    self.record(ProviderCall::Update(request.urn));
    Ok(outputs)
  }

  async fn delete(&self, resource: ExistingResource) -> Result<(), ProviderError> {
    debug!(urn = %resource.urn, "simulated delete");
    self.check_failure(&resource.urn)?;
    self.record(ProviderCall::Delete(resource.urn));
    Ok(())
  }
}

/// Decimal digits derived from a hex seed.
fn digits(seed: &str, count: usize) -> String {
  seed
    .chars()
    .cycle()
    .take(count)
    .map(|c| char::from(b'0' + (c.to_digit(16).unwrap_or(0) % 10) as u8))
    .collect()
}

fn internal_ip(seed: &str) -> String {
  let octet = |range: std::ops::Range<usize>| u8::from_str_radix(&seed[range], 16).unwrap_or(0);
  format!("10.128.{}.{}", octet(0..2), 2 + octet(2..4) % 253)
}

fn validate_account_id(request: &ResourceRequest, account_id: &str) -> Result<(), ProviderError> {
  let valid_len = (6..=30).contains(&account_id.len());
  let starts_with_letter = account_id.chars().next().is_some_and(|c| c.is_ascii_lowercase());
  let valid_chars = account_id
    .chars()
    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
  if valid_len && starts_with_letter && valid_chars && !account_id.ends_with('-') {
    return Ok(());
  }
  Err(ProviderError::InvalidProperty {
    urn: request.urn.clone(),
    property: "account_id".to_string(),
    reason: format!("'{account_id}' must be 6-30 lowercase letters, digits or hyphens, starting with a letter"),
  })
}

/// Policy properties are JSON strings holding a document with a `Statement`.
fn validate_policy(request: &ResourceRequest, key: &str) -> Result<(), ProviderError> {
  let raw = request.require_str(key)?;
  let invalid = |reason: String| ProviderError::InvalidProperty {
    urn: request.urn.clone(),
    property: key.to_string(),
    reason,
  };
  let document: Value = serde_json::from_str(raw).map_err(|e| invalid(format!("not valid JSON: {e}")))?;
  match document.get("Statement") {
    Some(Value::Array(_)) | Some(Value::Object(_)) => Ok(()),
    _ => Err(invalid("policy document has no Statement".to_string())),
  }
}
