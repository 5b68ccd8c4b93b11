//! Implementation of the `stack destroy` command.

use std::sync::Arc;

use anyhow::{Context as _, Result};

use stackdecl_lib::execute::{ApplyOptions, destroy};
use stackdecl_lib::provider::SimulatedProvider;

use super::{Context, failed_at, print_result};
use crate::output::{print_info, print_success};

/// Delete every resource in the stack's current snapshot, dependents first.
pub fn cmd_destroy(ctx: &Context, dry_run: bool) -> Result<()> {
  let provider = Arc::new(SimulatedProvider::new(&ctx.stack, &ctx.config)?);
  let options = ApplyOptions {
    dry_run,
    ..ApplyOptions::default()
  };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt
    .block_on(destroy(&ctx.stack, provider, &ctx.store, &options))
    .context("Destroy failed")?;

  if result.changes.is_empty() && !ctx.output.is_json() {
    print_info("Nothing to destroy.");
    return Ok(());
  }

  print_result(&result, ctx.output)?;

  if let Some(failure) = result.failure {
    return Err(failure.error).with_context(|| failed_at("Destroy", failure.urn.as_ref()));
  }

  if !dry_run && !ctx.output.is_json() {
    print_success(&format!("Destroyed stack {}", ctx.stack));
  }

  Ok(())
}
