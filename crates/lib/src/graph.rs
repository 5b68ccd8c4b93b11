//! The resource graph built by the declaration pass.
//!
//! Declaring a resource records a [`ResourceIntent`] and returns a
//! [`ResourceHandle`]. The handle's outputs are pending [`Deferred`] values.
//! Their write ends stay inside the graph until the driver takes them with
//! [`ResourceGraph::take_completers`].

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::ConfigError;
use crate::deferred::{Completer, Deferred, DeferredError, OutputRef};
use crate::resource::{PropertyBag, ResourceType, Urn};

#[derive(Debug, Error)]
pub enum DeclareError {
  #[error("resource {0} is already declared")]
  DuplicateResource(Urn),

  #[error("invalid resource name '{name}': {reason}")]
  InvalidName { name: String, reason: &'static str },

  #[error("{urn} depends on undeclared resource {dependency}")]
  UnknownDependency { urn: Urn, dependency: Urn },

  #[error("{rtype} has no output '{attr}'")]
  UnknownOutput { rtype: ResourceType, attr: String },

  #[error(transparent)]
  Config(#[from] ConfigError),
}

/// Extra edges and settings for a declaration.
#[derive(Debug, Clone, Default)]
pub struct DeclareOptions {
  /// Resources that must be provisioned first even without a data dependency.
  pub depends_on: Vec<Urn>,
}

/// A declared resource: what should exist, not what does.
#[derive(Debug, Clone)]
pub struct ResourceIntent {
  pub urn: Urn,
  pub rtype: ResourceType,
  pub name: String,
  pub properties: PropertyBag,
  pub depends_on: BTreeSet<Urn>,
}

impl ResourceIntent {
  /// Data dependencies plus explicit `depends_on` edges.
  pub fn dependencies(&self) -> BTreeSet<Urn> {
    let mut deps = self.properties.dependencies();
    deps.extend(self.depends_on.iter().cloned());
    deps.remove(&self.urn);
    deps
  }
}

/// Read access to a declared resource's outputs.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
  urn: Urn,
  rtype: ResourceType,
  outputs: BTreeMap<String, Deferred<Value>>,
}

impl ResourceHandle {
  pub fn urn(&self) -> &Urn {
    &self.urn
  }

  pub fn rtype(&self) -> ResourceType {
    self.rtype
  }

  pub fn output(&self, attr: &str) -> Result<Deferred<Value>, DeclareError> {
    self.outputs.get(attr).cloned().ok_or_else(|| DeclareError::UnknownOutput {
      rtype: self.rtype,
      attr: attr.to_string(),
    })
  }

  /// An output attribute as a string.
  ///
  /// A non-string value fails the returned value when it arrives.
  pub fn string(&self, attr: &str) -> Result<Deferred<String>, DeclareError> {
    let output = self.output(attr)?;
    let origin = output.origin().cloned();
    let urn = self.urn.clone();
    let attr = attr.to_string();
    Ok(
      output
        .try_transform(move |value| match value {
          Value::String(s) => Ok(s),
          other => Err(format!("{urn}.{attr} is not a string: {other}")),
        })
        .with_origin(origin),
    )
  }

  /// The provider-assigned identifier.
  pub fn id(&self) -> Deferred<String> {
    let output = &self.outputs["id"];
    let origin = output.origin().cloned();
    output
      .try_transform(|value| match value {
        Value::String(s) => Ok(s),
        other => Err(format!("id is not a string: {other}")),
      })
      .with_origin(origin)
  }
}

/// The write ends of one resource's outputs.
#[derive(Debug)]
pub struct OutputCompleters {
  urn: Urn,
  completers: BTreeMap<String, Completer<Value>>,
}

impl OutputCompleters {
  pub fn urn(&self) -> &Urn {
    &self.urn
  }

  /// Resolve every attribute from the reported outputs.
  ///
  /// Attributes the provider did not report fail with
  /// [`DeferredError::MissingOutput`]. Their names are returned.
  pub fn resolve(self, outputs: &BTreeMap<String, Value>) -> Vec<String> {
    let mut missing = Vec::new();
    for (attr, completer) in self.completers {
      match outputs.get(&attr) {
        Some(value) => completer.resolve(value.clone()),
        None => {
          completer.fail(DeferredError::MissingOutput {
            urn: self.urn.clone(),
            attr: attr.clone(),
          });
          missing.push(attr);
        }
      }
    }
    missing
  }

  /// Fail every attribute with the same error.
  pub fn fail(self, error: DeferredError) {
    for completer in self.completers.into_values() {
      completer.fail(error.clone());
    }
  }
}

/// All resources declared by one program, in declaration order.
#[derive(Debug, Default)]
pub struct ResourceGraph {
  intents: Vec<ResourceIntent>,
  declared: BTreeSet<Urn>,
  completers: BTreeMap<Urn, OutputCompleters>,
}

impl ResourceGraph {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn declare(
    &mut self,
    rtype: ResourceType,
    name: &str,
    properties: PropertyBag,
  ) -> Result<ResourceHandle, DeclareError> {
    self.declare_with(rtype, name, properties, DeclareOptions::default())
  }

  pub fn declare_with(
    &mut self,
    rtype: ResourceType,
    name: &str,
    properties: PropertyBag,
    options: DeclareOptions,
  ) -> Result<ResourceHandle, DeclareError> {
    validate_name(name)?;

    let urn = Urn::new(rtype, name);
    if self.declared.contains(&urn) {
      return Err(DeclareError::DuplicateResource(urn));
    }

    let intent = ResourceIntent {
      urn: urn.clone(),
      rtype,
      name: name.to_string(),
      properties,
      depends_on: options.depends_on.into_iter().collect(),
    };

    // Outputs only come from earlier declarations, so every edge must point backwards
    for dependency in intent.dependencies() {
      if !self.declared.contains(&dependency) {
        return Err(DeclareError::UnknownDependency {
          urn: urn.clone(),
          dependency,
        });
      }
    }

    let mut outputs = BTreeMap::new();
    let mut completers = BTreeMap::new();
    for attr in rtype.outputs() {
      let (completer, deferred) = Deferred::channel(OutputRef::new(urn.clone(), *attr));
      outputs.insert(attr.to_string(), deferred);
      completers.insert(attr.to_string(), completer);
    }

    let handle = ResourceHandle {
      urn: urn.clone(),
      rtype,
      outputs,
    };

    debug!(urn = %urn, deps = intent.dependencies().len(), "declared resource");

    self.intents.push(intent);
    self.declared.insert(urn.clone());
    self.completers.insert(urn.clone(), OutputCompleters { urn, completers });

    Ok(handle)
  }

  /// Intents in declaration order.
  pub fn intents(&self) -> &[ResourceIntent] {
    &self.intents
  }

  pub fn intent(&self, urn: &Urn) -> Option<&ResourceIntent> {
    self.intents.iter().find(|intent| &intent.urn == urn)
  }

  pub fn len(&self) -> usize {
    self.intents.len()
  }

  pub fn is_empty(&self) -> bool {
    self.intents.is_empty()
  }

  /// Hand the output write ends to the driver. Later calls return nothing.
  pub fn take_completers(&mut self) -> BTreeMap<Urn, OutputCompleters> {
    std::mem::take(&mut self.completers)
  }
}

fn validate_name(name: &str) -> Result<(), DeclareError> {
  let reason = if name.is_empty() {
    "name is empty"
  } else if name.contains("::") {
    "name contains '::'"
  } else if name.chars().any(char::is_whitespace) {
    "name contains whitespace"
  } else {
    return Ok(());
  };
  Err(DeclareError::InvalidName {
    name: name.to_string(),
    reason,
  })
}
