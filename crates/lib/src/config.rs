//! Stack configuration.
//!
//! A stack config is a small YAML file:
//!
//! ```yaml
//! stack: dev
//! config:
//!   gcp:project: demo-project
//!   aws:region: us-east-1
//! ```
//!
//! Keys are namespaced by provider (`gcp:`, `aws:`). Programs read them
//! through [`StackConfig::require`] and friends during the declaration pass.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::platform::paths::stack_config_path;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config: {0}")]
  Parse(#[from] serde_yaml::Error),

  #[error("missing required configuration value '{0}'")]
  Missing(String),

  #[error("configuration value '{key}' must be a {expected}")]
  InvalidType { key: String, expected: &'static str },

  #[error("invalid stack name '{name}': {reason}")]
  InvalidStackName { name: String, reason: &'static str },
}

/// Check that a stack name is a single plain path component.
///
/// Stack names become directory names under `stacks/`.
pub fn validate_stack_name(name: &str) -> Result<(), ConfigError> {
  let reason = if name.is_empty() {
    "name is empty"
  } else if name == "." || name == ".." {
    "name is a relative directory"
  } else if name.contains(['/', '\\']) {
    "name contains a path separator"
  } else if name.contains(':') {
    "name contains ':'"
  } else if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
    "name contains whitespace"
  } else {
    return Ok(());
  };
  Err(ConfigError::InvalidStackName {
    name: name.to_string(),
    reason,
  })
}

/// Configuration of one stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
  /// Stack name recorded in the file. The CLI flag wins over it.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stack: Option<String>,

  #[serde(default)]
  pub config: BTreeMap<String, Value>,
}

impl StackConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder-style setter.
  pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.config.insert(key.into(), value.into());
    self
  }

  pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
    serde_yaml::from_str(content).map_err(ConfigError::from)
  }

  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_yaml(&content)
  }

  /// Load `stacks/<stack>/config.yaml` from the data directory.
  ///
  /// A missing file yields an empty config.
  pub fn load_for_stack(stack: &str) -> Result<Self, ConfigError> {
    validate_stack_name(stack)?;
    let path = stack_config_path(stack);
    if !path.exists() {
      return Ok(Self::default());
    }
    Self::load(&path)
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.config.get(key)
  }

  /// A string value, if set.
  ///
  /// Numbers and booleans are rejected rather than stringified.
  pub fn get_str(&self, key: &str) -> Result<Option<&str>, ConfigError> {
    match self.config.get(key) {
      None | Some(Value::Null) => Ok(None),
      Some(Value::String(s)) => Ok(Some(s)),
      Some(_) => Err(ConfigError::InvalidType {
        key: key.to_string(),
        expected: "string",
      }),
    }
  }

  pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
    self.get_str(key)?.ok_or_else(|| ConfigError::Missing(key.to_string()))
  }

  pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str, ConfigError> {
    Ok(self.get_str(key)?.unwrap_or(default))
  }
}
