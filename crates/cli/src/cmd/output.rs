//! Implementation of the `stack output` command.

use anyhow::{Result, bail};

use super::Context;
use crate::output::{format_value, print_info, print_json, print_stat};

/// Print exports recorded by the last apply.
///
/// With a key, prints that value alone so it can be used in scripts.
pub fn cmd_output(ctx: &Context, key: Option<&str>) -> Result<()> {
  let Some(snapshot) = ctx.store.load_current()? else {
    bail!("stack {} has no snapshot; run `stack up` first", ctx.stack);
  };

  if let Some(key) = key {
    let Some(value) = snapshot.exports.get(key) else {
      bail!("stack {} has no export '{}'", ctx.stack, key);
    };
    if ctx.output.is_json() {
      return print_json(value);
    }
    println!("{}", format_value(value));
    return Ok(());
  }

  if ctx.output.is_json() {
    return print_json(&snapshot.exports);
  }

  if snapshot.exports.is_empty() {
    print_info("No exports");
    return Ok(());
  }

  for (key, value) in &snapshot.exports {
    print_stat(key, &format_value(value));
  }

  Ok(())
}
