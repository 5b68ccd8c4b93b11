//! Resource vocabulary and property bags.
//!
//! [`ResourceType`] is the fixed set of resource kinds the declarator knows
//! about, each with the output attributes its provider reports. A
//! [`PropertyBag`] holds the declared inputs of one resource. Any property
//! may be a literal or a [`Deferred`] value read from another resource.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::deferred::{Deferred, DeferredError, DeferredState};
use crate::placeholder::{self, Placeholder};

/// The cloud a resource type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
  Gcp,
  Aws,
}

impl CloudProvider {
  pub fn as_str(&self) -> &'static str {
    match self {
      CloudProvider::Gcp => "gcp",
      CloudProvider::Aws => "aws",
    }
  }
}

impl fmt::Display for CloudProvider {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A resource kind from the provider vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceType {
  #[serde(rename = "gcp:storage/Bucket")]
  GcpStorageBucket,
  #[serde(rename = "gcp:serviceaccount/Account")]
  GcpServiceAccount,
  #[serde(rename = "gcp:compute/Instance")]
  GcpComputeInstance,
  #[serde(rename = "aws:s3/Bucket")]
  AwsS3Bucket,
  #[serde(rename = "aws:iam/Role")]
  AwsIamRole,
  #[serde(rename = "aws:iam/Policy")]
  AwsIamPolicy,
  #[serde(rename = "aws:iam/RolePolicyAttachment")]
  AwsIamRolePolicyAttachment,
}

impl ResourceType {
  pub const ALL: [ResourceType; 7] = [
    ResourceType::GcpStorageBucket,
    ResourceType::GcpServiceAccount,
    ResourceType::GcpComputeInstance,
    ResourceType::AwsS3Bucket,
    ResourceType::AwsIamRole,
    ResourceType::AwsIamPolicy,
    ResourceType::AwsIamRolePolicyAttachment,
  ];

  /// The type tag, e.g. `gcp:storage/Bucket`.
  pub fn tag(&self) -> &'static str {
    match self {
      ResourceType::GcpStorageBucket => "gcp:storage/Bucket",
      ResourceType::GcpServiceAccount => "gcp:serviceaccount/Account",
      ResourceType::GcpComputeInstance => "gcp:compute/Instance",
      ResourceType::AwsS3Bucket => "aws:s3/Bucket",
      ResourceType::AwsIamRole => "aws:iam/Role",
      ResourceType::AwsIamPolicy => "aws:iam/Policy",
      ResourceType::AwsIamRolePolicyAttachment => "aws:iam/RolePolicyAttachment",
    }
  }

  pub fn provider(&self) -> CloudProvider {
    match self {
      ResourceType::GcpStorageBucket | ResourceType::GcpServiceAccount | ResourceType::GcpComputeInstance => {
        CloudProvider::Gcp
      }
      ResourceType::AwsS3Bucket
      | ResourceType::AwsIamRole
      | ResourceType::AwsIamPolicy
      | ResourceType::AwsIamRolePolicyAttachment => CloudProvider::Aws,
    }
  }

  /// Output attributes reported by the provider. Every type has `id`.
  pub fn outputs(&self) -> &'static [&'static str] {
    match self {
      ResourceType::GcpStorageBucket => &["id", "name", "url", "self_link", "location"],
      ResourceType::GcpServiceAccount => &["id", "name", "email", "unique_id", "account_id"],
      ResourceType::GcpComputeInstance => &["id", "name", "instance_id", "self_link", "network_ip", "zone"],
      ResourceType::AwsS3Bucket => &["id", "bucket", "arn", "bucket_domain_name", "region"],
      ResourceType::AwsIamRole => &["id", "name", "arn", "unique_id"],
      ResourceType::AwsIamPolicy => &["id", "name", "arn", "policy_id"],
      ResourceType::AwsIamRolePolicyAttachment => &["id", "role", "policy_arn"],
    }
  }

  /// Properties whose change forces delete-then-create.
  pub fn replace_on(&self) -> &'static [&'static str] {
    match self {
      ResourceType::GcpStorageBucket => &["location"],
      ResourceType::GcpServiceAccount => &["account_id"],
      ResourceType::GcpComputeInstance => &["zone"],
      ResourceType::AwsS3Bucket => &["bucket"],
      ResourceType::AwsIamRole => &["name"],
      ResourceType::AwsIamPolicy => &["name"],
      ResourceType::AwsIamRolePolicyAttachment => &["role", "policy_arn"],
    }
  }

  pub fn has_output(&self, attr: &str) -> bool {
    self.outputs().contains(&attr)
  }
}

impl fmt::Display for ResourceType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.tag())
  }
}

impl FromStr for ResourceType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    ResourceType::ALL
      .into_iter()
      .find(|t| t.tag() == s)
      .ok_or_else(|| format!("unknown resource type: {s}"))
  }
}

/// Identity of a declared resource: `<type-tag>::<name>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Urn(pub String);

impl Urn {
  pub fn new(rtype: ResourceType, name: &str) -> Self {
    Urn(format!("{}::{}", rtype.tag(), name))
  }

  /// Split into type and logical name.
  pub fn parts(&self) -> Option<(ResourceType, &str)> {
    let (tag, name) = self.0.split_once("::")?;
    Some((tag.parse().ok()?, name))
  }

  pub fn name(&self) -> &str {
    self.0.split_once("::").map(|(_, name)| name).unwrap_or(&self.0)
  }
}

impl fmt::Display for Urn {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A single declared property: a literal or a deferred value.
#[derive(Debug, Clone)]
pub enum PropertyValue {
  Null,
  Bool(bool),
  Number(Number),
  String(String),
  Array(Vec<PropertyValue>),
  Object(BTreeMap<String, PropertyValue>),
  Deferred(Deferred<Value>),
}

impl PropertyValue {
  /// Resolve to plain JSON.
  ///
  /// Returns `Ok(None)` while any nested deferred value is pending and an
  /// error as soon as one has failed.
  pub fn resolve(&self) -> Result<Option<Value>, DeferredError> {
    let value = match self {
      PropertyValue::Null => Value::Null,
      PropertyValue::Bool(b) => Value::Bool(*b),
      PropertyValue::Number(n) => Value::Number(n.clone()),
      PropertyValue::String(s) => Value::String(s.clone()),
      PropertyValue::Array(items) => {
        let mut out = Vec::with_capacity(items.len());
        let mut unknown = false;
        for item in items {
          match item.resolve()? {
            Some(v) => out.push(v),
            None => unknown = true,
          }
        }
        if unknown {
          return Ok(None);
        }
        Value::Array(out)
      }
      PropertyValue::Object(map) => {
        let mut out = Map::new();
        let mut unknown = false;
        for (key, item) in map {
          match item.resolve()? {
            Some(v) => {
              out.insert(key.clone(), v);
            }
            None => unknown = true,
          }
        }
        if unknown {
          return Ok(None);
        }
        Value::Object(out)
      }
      PropertyValue::Deferred(deferred) => match deferred.state() {
        DeferredState::Resolved(v) => v,
        DeferredState::Pending => return Ok(None),
        DeferredState::Failed(err) => return Err(err),
      },
    };
    Ok(Some(value))
  }

  /// Render as JSON with placeholders standing in for unknown values.
  ///
  /// Failed deferred values render as `$${computed}` as well. The failure
  /// itself is reported by [`resolve`](Self::resolve).
  pub fn preview(&self) -> Value {
    match self {
      PropertyValue::Null => Value::Null,
      PropertyValue::Bool(b) => Value::Bool(*b),
      PropertyValue::Number(n) => Value::Number(n.clone()),
      PropertyValue::String(s) => Value::String(placeholder::escape(s)),
      PropertyValue::Array(items) => Value::Array(items.iter().map(PropertyValue::preview).collect()),
      PropertyValue::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), v.preview())).collect()),
      PropertyValue::Deferred(deferred) => match deferred.state() {
        DeferredState::Resolved(v) => escape_value(v),
        DeferredState::Pending | DeferredState::Failed(_) => {
          let placeholder = match deferred.origin() {
            Some(origin) => Placeholder::Output(origin.clone()),
            None => Placeholder::Computed,
          };
          Value::String(placeholder.to_string())
        }
      },
    }
  }

  fn collect_dependencies(&self, deps: &mut BTreeSet<Urn>) {
    match self {
      PropertyValue::Deferred(deferred) => {
        deps.extend(deferred.sources().iter().map(|source| source.urn.clone()));
      }
      PropertyValue::Array(items) => {
        for item in items {
          item.collect_dependencies(deps);
        }
      }
      PropertyValue::Object(map) => {
        for item in map.values() {
          item.collect_dependencies(deps);
        }
      }
      PropertyValue::Null | PropertyValue::Bool(_) | PropertyValue::Number(_) | PropertyValue::String(_) => {}
    }
  }
}

fn escape_value(value: Value) -> Value {
  match value {
    Value::String(s) => Value::String(placeholder::escape(&s)),
    Value::Array(items) => Value::Array(items.into_iter().map(escape_value).collect()),
    Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, escape_value(v))).collect()),
    other => other,
  }
}

impl From<Value> for PropertyValue {
  fn from(value: Value) -> Self {
    match value {
      Value::Null => PropertyValue::Null,
      Value::Bool(b) => PropertyValue::Bool(b),
      Value::Number(n) => PropertyValue::Number(n),
      Value::String(s) => PropertyValue::String(s),
      Value::Array(items) => PropertyValue::Array(items.into_iter().map(PropertyValue::from).collect()),
      Value::Object(map) => PropertyValue::Object(map.into_iter().map(|(k, v)| (k, PropertyValue::from(v))).collect()),
    }
  }
}

impl From<&str> for PropertyValue {
  fn from(value: &str) -> Self {
    PropertyValue::String(value.to_string())
  }
}

impl From<String> for PropertyValue {
  fn from(value: String) -> Self {
    PropertyValue::String(value)
  }
}

impl From<bool> for PropertyValue {
  fn from(value: bool) -> Self {
    PropertyValue::Bool(value)
  }
}

impl From<i64> for PropertyValue {
  fn from(value: i64) -> Self {
    PropertyValue::Number(value.into())
  }
}

impl From<u64> for PropertyValue {
  fn from(value: u64) -> Self {
    PropertyValue::Number(value.into())
  }
}

impl From<f64> for PropertyValue {
  fn from(value: f64) -> Self {
    Number::from_f64(value).map(PropertyValue::Number).unwrap_or(PropertyValue::Null)
  }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
  fn from(items: Vec<T>) -> Self {
    PropertyValue::Array(items.into_iter().map(Into::into).collect())
  }
}

impl<T> From<Deferred<T>> for PropertyValue
where
  T: Serialize + Clone + Send + 'static,
{
  fn from(value: Deferred<T>) -> Self {
    PropertyValue::Deferred(value.into_value())
  }
}

impl<T> From<&Deferred<T>> for PropertyValue
where
  T: Serialize + Clone + Send + 'static,
{
  fn from(value: &Deferred<T>) -> Self {
    PropertyValue::Deferred(value.into_value())
  }
}

impl From<PropertyBag> for PropertyValue {
  fn from(bag: PropertyBag) -> Self {
    PropertyValue::Object(bag.0)
  }
}

/// The declared inputs of one resource.
#[derive(Debug, Clone, Default)]
pub struct PropertyBag(BTreeMap<String, PropertyValue>);

impl PropertyBag {
  pub fn new() -> Self {
    Self(BTreeMap::new())
  }

  /// Builder-style insert.
  pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
    self.insert(key, value);
    self
  }

  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
    self.0.insert(key.into(), value.into());
  }

  pub fn get(&self, key: &str) -> Option<&PropertyValue> {
    self.0.get(key)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
    self.0.iter()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Resources whose outputs feed into these properties.
  pub fn dependencies(&self) -> BTreeSet<Urn> {
    let mut deps = BTreeSet::new();
    for value in self.0.values() {
      value.collect_dependencies(&mut deps);
    }
    deps
  }

  /// Resolve every property to JSON; `Ok(None)` while any is pending.
  pub fn resolve(&self) -> Result<Option<Value>, DeferredError> {
    PropertyValue::Object(self.0.clone()).resolve()
  }

  pub fn preview(&self) -> Value {
    Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.preview())).collect())
  }
}
