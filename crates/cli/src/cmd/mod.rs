mod destroy;
mod history;
mod list;
mod output;
mod preview;
mod up;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context as _, Result};
use serde::Serialize;
use serde_json::Value;

use stackdecl_lib::config::{StackConfig, validate_stack_name};
use stackdecl_lib::consts::DEFAULT_STACK;
use stackdecl_lib::execute::{ApplyResult, ResourceChange};
use stackdecl_lib::resource::Urn;
use stackdecl_lib::snapshot::SnapshotStore;

use crate::output::{OutputFormat, format_value, print_error, print_info, print_json, print_operation, print_stat};

pub use destroy::cmd_destroy;
pub use history::cmd_history;
pub use list::cmd_list;
pub use output::cmd_output;
pub use preview::cmd_preview;
pub use up::cmd_up;

/// Everything a command needs to know about its stack.
pub struct Context {
  pub stack: String,
  pub config: StackConfig,
  pub store: SnapshotStore,
  pub output: OutputFormat,
}

impl Context {
  /// The stack comes from `--stack`, then the config file, then the default.
  ///
  /// Without `--config`, the config is read from the stack's directory.
  pub fn resolve(stack: Option<String>, config: Option<&Path>, output: OutputFormat) -> Result<Self> {
    if let Some(name) = stack.as_deref() {
      validate_stack_name(name)?;
    }

    let config = match (config, stack.as_deref()) {
      (Some(path), _) => {
        StackConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))?
      }
      (None, name) => {
        let name = name.unwrap_or(DEFAULT_STACK);
        StackConfig::load_for_stack(name).with_context(|| format!("Failed to load config for stack {name}"))?
      }
    };

    let stack = stack
      .or_else(|| config.stack.clone())
      .unwrap_or_else(|| DEFAULT_STACK.to_string());
    let store = SnapshotStore::for_stack(&stack)?;

    Ok(Self {
      stack,
      config,
      store,
      output,
    })
  }
}

#[derive(Serialize)]
struct RunReport<'a> {
  stack: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  program: Option<&'a str>,
  dry_run: bool,
  changes: &'a [ResourceChange],
  summary: BTreeMap<&'static str, usize>,
  exports: &'a BTreeMap<String, Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  snapshot: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  failure: Option<FailureReport>,
}

#[derive(Serialize)]
struct FailureReport {
  #[serde(skip_serializing_if = "Option::is_none")]
  urn: Option<String>,
  error: String,
}

/// Error context naming where a run stopped.
fn failed_at(action: &str, urn: Option<&Urn>) -> String {
  match urn {
    Some(urn) => format!("{action} failed at {urn}"),
    None => format!("{action} failed resolving exports"),
  }
}

/// Print the outcome of a preview, up or destroy.
fn print_result(result: &ApplyResult, output: OutputFormat) -> Result<()> {
  if output.is_json() {
    return print_json(&RunReport {
      stack: &result.stack,
      program: result.program.as_deref(),
      dry_run: result.dry_run,
      changes: &result.changes,
      summary: result.counts(),
      exports: &result.exports,
      snapshot: result.snapshot.as_ref().map(|s| s.id.as_str()),
      failure: result.failure.as_ref().map(|f| FailureReport {
        urn: f.urn.as_ref().map(ToString::to_string),
        error: f.error.to_string(),
      }),
    });
  }

  for change in &result.changes {
    print_operation(change.operation, &change.urn.to_string());
  }

  if !result.exports.is_empty() {
    println!();
    println!("Exports:");
    for (key, value) in &result.exports {
      print_stat(key, &format_value(value));
    }
  }

  println!();
  let counts = result.counts();
  if counts.is_empty() {
    print_info("No resources");
  } else {
    let summary: Vec<String> = counts.iter().map(|(op, n)| format!("{n} {op}")).collect();
    print_info(&summary.join(", "));
  }

  if let Some(failure) = &result.failure {
    match &failure.urn {
      Some(urn) => print_error(&format!("{urn}: {}", failure.error)),
      None => print_error(&failure.error.to_string()),
    }
  }

  Ok(())
}
