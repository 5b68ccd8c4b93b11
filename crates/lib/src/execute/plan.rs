//! Per-resource change detection.

use serde_json::Value;

use crate::graph::ResourceIntent;
use crate::placeholder;
use crate::resource::ResourceType;
use crate::snapshot::ResourceState;
use crate::util::hash::{Hashable, ObjectHash};

use super::types::{ExecuteError, Operation};

/// The decision for one declared resource.
#[derive(Debug, Clone)]
pub(crate) struct NodePlan {
  pub operation: Operation,
  /// Resolved inputs; `None` while some input is unknown.
  pub inputs: Option<Value>,
  pub hash: Option<ObjectHash>,
  /// Inputs with placeholders for unknown values.
  pub preview: Value,
}

pub(crate) fn plan_node(intent: &ResourceIntent, previous: Option<&ResourceState>) -> Result<NodePlan, ExecuteError> {
  let preview = intent.properties.preview();
  let inputs = intent.properties.resolve().map_err(|source| ExecuteError::Input {
    urn: intent.urn.clone(),
    source,
  })?;

  let Some(inputs) = inputs else {
    return Ok(NodePlan {
      operation: classify_unknown(intent.rtype, &preview, previous),
      inputs: None,
      hash: None,
      preview,
    });
  };

  let hash = inputs.compute_hash().map_err(|source| ExecuteError::Hash {
    urn: intent.urn.clone(),
    source,
  })?;

  Ok(NodePlan {
    operation: classify(intent.rtype, &inputs, &hash, previous),
    inputs: Some(inputs),
    hash: Some(hash),
    preview,
  })
}

/// Classify a resource whose inputs are fully known.
pub(crate) fn classify(
  rtype: ResourceType,
  inputs: &Value,
  hash: &ObjectHash,
  previous: Option<&ResourceState>,
) -> Operation {
  let Some(previous) = previous else {
    return Operation::Create;
  };
  if previous.rtype == rtype && &previous.inputs_hash == hash {
    return Operation::Same;
  }
  let replaced = rtype
    .replace_on()
    .iter()
    .any(|key| inputs.get(*key) != previous.inputs.get(*key));
  if replaced { Operation::Replace } else { Operation::Update }
}

/// Classify a resource some of whose inputs are still unknown.
///
/// Only known values can force a replacement.
fn classify_unknown(rtype: ResourceType, preview: &Value, previous: Option<&ResourceState>) -> Operation {
  let Some(previous) = previous else {
    return Operation::Create;
  };
  let replaced = rtype.replace_on().iter().any(|key| match preview.get(*key) {
    None => previous.inputs.get(*key).is_some(),
    Some(value) => known_value(value).is_some_and(|known| Some(&known) != previous.inputs.get(*key)),
  });
  if replaced { Operation::Replace } else { Operation::Update }
}

/// The literal value behind a preview, if it holds no placeholder.
fn known_value(preview: &Value) -> Option<Value> {
  match preview {
    Value::String(s) => placeholder::unescape(s).map(Value::String),
    Value::Array(items) => items.iter().map(known_value).collect::<Option<Vec<_>>>().map(Value::Array),
    Value::Object(map) => map
      .iter()
      .map(|(k, v)| known_value(v).map(|v| (k.clone(), v)))
      .collect::<Option<serde_json::Map<_, _>>>()
      .map(Value::Object),
    other => Some(other.clone()),
  }
}
