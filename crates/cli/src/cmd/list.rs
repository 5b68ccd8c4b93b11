//! Implementation of the `stack list` command.

use anyhow::Result;
use serde::Serialize;

use stackdecl_lib::programs;

use super::Context;
use crate::output::print_json;

#[derive(Serialize)]
struct ProgramItem {
  name: &'static str,
  description: &'static str,
}

/// List the built-in programs.
pub fn cmd_list(ctx: &Context) -> Result<()> {
  let programs = programs::registry();

  if ctx.output.is_json() {
    let items: Vec<ProgramItem> = programs
      .iter()
      .map(|p| ProgramItem {
        name: p.name,
        description: p.description,
      })
      .collect();
    return print_json(&items);
  }

  let width = programs.iter().map(|p| p.name.len()).max().unwrap_or(0);
  for program in programs {
    println!("{:width$}  {}", program.name, program.description);
  }

  Ok(())
}
