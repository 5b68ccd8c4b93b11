//! IAM policy documents.
//!
//! Documents are plain data. They are serialized into resource properties
//! and validated by the provider, never locally.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const POLICY_VERSION: &str = "2012-10-17";

/// Condition key carrying the audience of a Google-issued identity token.
pub const GOOGLE_AUDIENCE_KEY: &str = "accounts.google.com:aud";

/// An AWS IAM policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
  pub version: String,
  pub statement: Vec<Statement>,
}

impl Default for PolicyDocument {
  fn default() -> Self {
    Self {
      version: POLICY_VERSION.to_string(),
      statement: Vec::new(),
    }
  }
}

impl PolicyDocument {
  pub fn new(statement: Vec<Statement>) -> Self {
    Self {
      version: POLICY_VERSION.to_string(),
      statement,
    }
  }

  pub fn to_value(&self) -> Result<Value, serde_json::Error> {
    serde_json::to_value(self)
  }

  /// The document as the JSON string IAM properties expect.
  pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Effect {
  #[default]
  Allow,
  Deny,
}

/// One statement of a policy document. Empty fields are omitted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sid: Option<String>,

  pub effect: Effect,

  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub principal: BTreeMap<String, String>,

  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub action: Vec<String>,

  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub resource: Vec<String>,

  /// Operator (e.g. `StringEquals`) to condition key to expected value.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub condition: BTreeMap<String, BTreeMap<String, String>>,
}

impl Statement {
  pub fn allow() -> Self {
    Self::default()
  }

  pub fn sid(mut self, sid: impl Into<String>) -> Self {
    self.sid = Some(sid.into());
    self
  }

  pub fn principal(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
    self.principal.insert(kind.into(), value.into());
    self
  }

  pub fn action(mut self, action: impl Into<String>) -> Self {
    self.action.push(action.into());
    self
  }

  pub fn resource(mut self, resource: impl Into<String>) -> Self {
    self.resource.push(resource.into());
    self
  }

  pub fn condition(mut self, operator: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
    self
      .condition
      .entry(operator.into())
      .or_default()
      .insert(key.into(), value.into());
    self
  }
}

/// Trust policy letting a federated web identity assume a role.
///
/// `audience` is embedded unchanged under `StringEquals[audience_key]`.
pub fn web_identity_trust_policy(provider: &str, audience_key: &str, audience: &str) -> PolicyDocument {
  PolicyDocument::new(vec![
    Statement::allow()
      .principal("Federated", provider)
      .action("sts:AssumeRoleWithWebIdentity")
      .condition("StringEquals", audience_key, audience),
  ])
}

/// A GCP IAM policy: roles bound to member lists.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IamPolicy {
  pub bindings: Vec<Binding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
  pub role: String,
  pub members: Vec<String>,
}

impl IamPolicy {
  /// Add `member` to `role`, creating the binding if needed.
  pub fn bind(mut self, role: impl Into<String>, member: impl Into<String>) -> Self {
    let role = role.into();
    let member = member.into();
    match self.bindings.iter_mut().find(|b| b.role == role) {
      Some(binding) => {
        if !binding.members.contains(&member) {
          binding.members.push(member);
        }
      }
      None => self.bindings.push(Binding {
        role,
        members: vec![member],
      }),
    }
    self
  }

  pub fn to_value(&self) -> Result<Value, serde_json::Error> {
    serde_json::to_value(self)
  }
}

/// IAM member string for a service account email.
pub fn service_account_member(email: &str) -> String {
  format!("serviceAccount:{email}")
}
