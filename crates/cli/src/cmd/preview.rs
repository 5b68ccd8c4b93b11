//! Implementation of the `stack preview` command.
//!
//! Runs the declaration pass and reports what `up` would do. Values only the
//! provider can supply show as placeholders.

use std::sync::Arc;

use anyhow::{Context as _, Result};

use stackdecl_lib::execute::{ApplyOptions, apply};
use stackdecl_lib::programs;
use stackdecl_lib::provider::SimulatedProvider;

use super::{Context, failed_at, print_result};
use crate::output::print_info;

pub fn cmd_preview(ctx: &Context, program: &str) -> Result<()> {
  let program = programs::lookup(program)?;
  let provider = Arc::new(SimulatedProvider::new(&ctx.stack, &ctx.config)?);
  let options = ApplyOptions {
    dry_run: true,
    ..ApplyOptions::default()
  };

  if !ctx.output.is_json() {
    print_info(&format!("Previewing {} on stack {}", program.name, ctx.stack));
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt
    .block_on(apply(program, &ctx.stack, ctx.config.clone(), provider, &ctx.store, &options))
    .context("Preview failed")?;

  print_result(&result, ctx.output)?;

  if let Some(failure) = result.failure {
    return Err(failure.error).with_context(|| failed_at("Preview", failure.urn.as_ref()));
  }

  Ok(())
}
