//! Programs and the declaration pass.
//!
//! A [`Program`] is a plain function that declares resources and exports on
//! a [`Stack`]. Running it never touches the cloud. It only builds the
//! [`ResourceGraph`] the driver later walks.

use thiserror::Error;
use tracing::info;

use crate::config::StackConfig;
use crate::export::Exports;
use crate::graph::{DeclareError, DeclareOptions, ResourceGraph, ResourceHandle};
use crate::resource::{PropertyBag, PropertyValue, ResourceType};

#[derive(Debug, Error)]
pub enum ProgramError {
  #[error("program not found: {0}")]
  NotFound(String),
}

/// Declaration function of a program.
pub type DeclareFn = fn(&mut Stack) -> Result<(), DeclareError>;

/// A named declaration function.
#[derive(Debug, Clone, Copy)]
pub struct Program {
  pub name: &'static str,
  pub description: &'static str,
  pub declare: DeclareFn,
}

impl Program {
  /// Run the declaration pass against a fresh stack.
  pub fn run(&self, stack: &str, config: StackConfig) -> Result<Stack, DeclareError> {
    let mut target = Stack::new(stack, config);
    (self.declare)(&mut target)?;
    info!(
      program = self.name,
      stack = %stack,
      resources = target.graph.len(),
      exports = target.exports.len(),
      "declaration pass complete"
    );
    Ok(target)
  }
}

/// The target of one declaration pass.
#[derive(Debug)]
pub struct Stack {
  name: String,
  config: StackConfig,
  graph: ResourceGraph,
  exports: Exports,
}

impl Stack {
  pub fn new(name: impl Into<String>, config: StackConfig) -> Self {
    Self {
      name: name.into(),
      config,
      graph: ResourceGraph::new(),
      exports: Exports::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn config(&self) -> &StackConfig {
    &self.config
  }

  pub fn graph(&self) -> &ResourceGraph {
    &self.graph
  }

  pub fn graph_mut(&mut self) -> &mut ResourceGraph {
    &mut self.graph
  }

  pub fn exports(&self) -> &Exports {
    &self.exports
  }

  pub fn declare(
    &mut self,
    rtype: ResourceType,
    name: &str,
    properties: PropertyBag,
  ) -> Result<ResourceHandle, DeclareError> {
    self.graph.declare(rtype, name, properties)
  }

  pub fn declare_with(
    &mut self,
    rtype: ResourceType,
    name: &str,
    properties: PropertyBag,
    options: DeclareOptions,
  ) -> Result<ResourceHandle, DeclareError> {
    self.graph.declare_with(rtype, name, properties, options)
  }

  pub fn export(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
    self.exports.export(key, value);
  }
}
