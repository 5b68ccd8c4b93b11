//! The seam between the driver and a cloud.
//!
//! A [`Provider`] receives fully resolved inputs and reports the output
//! attributes of the resource it created or updated.

pub mod simulated;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::resource::{ResourceType, Urn};

pub use simulated::SimulatedProvider;

/// Output attributes reported by a provider.
pub type Outputs = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
  #[error("{urn}: missing required property '{property}'")]
  MissingProperty { urn: Urn, property: String },

  #[error("{urn}: invalid property '{property}': {reason}")]
  InvalidProperty { urn: Urn, property: String, reason: String },

  #[error("{urn}: {message}")]
  Failed { urn: Urn, message: String },
}

/// A resource with every input known.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
  pub urn: Urn,
  pub rtype: ResourceType,
  pub name: String,
  /// JSON object of resolved properties.
  pub inputs: Value,
}

impl ResourceRequest {
  pub fn input(&self, key: &str) -> Option<&Value> {
    self.inputs.get(key)
  }

  pub fn input_str(&self, key: &str) -> Result<Option<&str>, ProviderError> {
    match self.inputs.get(key) {
      None | Some(Value::Null) => Ok(None),
      Some(Value::String(s)) => Ok(Some(s)),
      Some(other) => Err(ProviderError::InvalidProperty {
        urn: self.urn.clone(),
        property: key.to_string(),
        reason: format!("expected a string, got {other}"),
      }),
    }
  }

  pub fn require_str(&self, key: &str) -> Result<&str, ProviderError> {
    self.input_str(key)?.ok_or_else(|| ProviderError::MissingProperty {
      urn: self.urn.clone(),
      property: key.to_string(),
    })
  }

  pub fn require(&self, key: &str) -> Result<&Value, ProviderError> {
    match self.inputs.get(key) {
      None | Some(Value::Null) => Err(ProviderError::MissingProperty {
        urn: self.urn.clone(),
        property: key.to_string(),
      }),
      Some(value) => Ok(value),
    }
  }
}

/// A resource a provider previously created.
#[derive(Debug, Clone)]
pub struct ExistingResource {
  pub urn: Urn,
  pub rtype: ResourceType,
  pub outputs: Outputs,
}

#[async_trait]
pub trait Provider: Send + Sync + 'static {
  async fn create(&self, request: ResourceRequest) -> Result<Outputs, ProviderError>;

  /// Update in place. `current` holds the outputs recorded at the last apply.
  async fn update(&self, request: ResourceRequest, current: ExistingResource) -> Result<Outputs, ProviderError>;

  async fn delete(&self, resource: ExistingResource) -> Result<(), ProviderError>;
}
