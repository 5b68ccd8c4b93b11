mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::{Context, cmd_destroy, cmd_history, cmd_list, cmd_output, cmd_preview, cmd_up};
use crate::output::OutputFormat;

/// stack - declare cloud resources and bring a stack in line with them
#[derive(Parser)]
#[command(name = "stack")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, global = true, action = ArgAction::Count)]
  verbose: u8,

  /// Stack to operate on (default: the config's stack, then "dev")
  #[arg(long, global = true)]
  stack: Option<String>,

  /// Stack configuration file (default: the stack's config.yaml)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Output format
  #[arg(short = 'o', long, global = true, value_enum, default_value = "text")]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// List the built-in programs
  List,

  /// Show what a program would change, without touching the cloud
  Preview {
    /// Program to preview
    program: String,
  },

  /// Apply a program to the stack
  Up {
    /// Program to apply
    program: String,

    /// Maximum number of concurrent provider calls
    #[arg(short = 'j', long)]
    parallelism: Option<usize>,
  },

  /// Delete every resource recorded for the stack
  Destroy {
    /// Show what would be deleted without deleting
    #[arg(long)]
    dry_run: bool,
  },

  /// Print exports from the current snapshot
  Output {
    /// Export to print (all when omitted)
    key: Option<String>,
  },

  /// List recorded snapshots
  History {
    /// Delete non-current snapshots older than this duration (e.g. "7d", "24h")
    #[arg(long, value_parser = humantime::parse_duration)]
    prune: Option<Duration>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let ctx = Context::resolve(cli.stack, cli.config.as_deref(), cli.output)?;

  match cli.command {
    Commands::List => cmd_list(&ctx),
    Commands::Preview { program } => cmd_preview(&ctx, &program),
    Commands::Up { program, parallelism } => cmd_up(&ctx, &program, parallelism),
    Commands::Destroy { dry_run } => cmd_destroy(&ctx, dry_run),
    Commands::Output { key } => cmd_output(&ctx, key.as_deref()),
    Commands::History { prune } => cmd_history(&ctx, prune),
  }
}

/// Logs go to stderr. `RUST_LOG` overrides the `-v` level.
fn init_tracing(verbose: u8) {
  let level = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}
