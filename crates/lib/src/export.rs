//! Program exports.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use crate::deferred::DeferredError;
use crate::resource::PropertyValue;

/// Named values a program surfaces after an apply.
#[derive(Debug, Clone, Default)]
pub struct Exports {
  entries: BTreeMap<String, PropertyValue>,
}

impl Exports {
  pub fn new() -> Self {
    Self::default()
  }

  /// Export `value` under `key`. An existing key is replaced.
  pub fn export(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
    let key = key.into();
    if self.entries.insert(key.clone(), value.into()).is_some() {
      warn!(key = %key, "export overwritten by a later value");
    }
  }

  pub fn get(&self, key: &str) -> Option<&PropertyValue> {
    self.entries.get(key)
  }

  pub fn keys(&self) -> impl Iterator<Item = &String> {
    self.entries.keys()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Current value of every export.
  ///
  /// Known values are returned as-is. Values still pending render with
  /// placeholders. A failed value is an error.
  pub fn resolve(&self) -> Result<BTreeMap<String, Value>, DeferredError> {
    let mut out = BTreeMap::new();
    for (key, value) in &self.entries {
      let resolved = match value.resolve()? {
        Some(v) => v,
        None => value.preview(),
      };
      out.insert(key.clone(), resolved);
    }
    Ok(out)
  }
}
