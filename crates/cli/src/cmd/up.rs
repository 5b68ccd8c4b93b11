//! Implementation of the `stack up` command.
//!
//! Applies a program to the stack:
//! - Runs the declaration pass
//! - Creates, updates or replaces resources wave by wave
//! - Deletes resources the program no longer declares
//! - Saves a new snapshot with the resolved exports

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context as _, Result};
use tracing::info;

use stackdecl_lib::execute::{ApplyOptions, apply};
use stackdecl_lib::programs;
use stackdecl_lib::provider::SimulatedProvider;

use super::{Context, failed_at, print_result};
use crate::output::{format_duration, print_info, print_success};

pub fn cmd_up(ctx: &Context, program: &str, parallelism: Option<usize>) -> Result<()> {
  let program = programs::lookup(program)?;
  let provider = Arc::new(SimulatedProvider::new(&ctx.stack, &ctx.config)?);
  let mut options = ApplyOptions::default();
  if let Some(parallelism) = parallelism {
    options.parallelism = parallelism;
  }

  if !ctx.output.is_json() {
    print_info(&format!("Applying {} to stack {}", program.name, ctx.stack));
  }

  let started = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt
    .block_on(apply(program, &ctx.stack, ctx.config.clone(), provider, &ctx.store, &options))
    .context("Apply failed")?;

  print_result(&result, ctx.output)?;

  if let Some(snapshot) = &result.snapshot {
    info!(snapshot = %snapshot.id, "snapshot saved");
  }

  if let Some(failure) = result.failure {
    return Err(failure.error).with_context(|| failed_at("Apply", failure.urn.as_ref()));
  }

  if !ctx.output.is_json() {
    print_success(&format!("Apply complete in {}", format_duration(started.elapsed())));
  }

  Ok(())
}
