//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, resource operation markers and human-readable durations.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};
use serde_json::Value;
use stackdecl_lib::execute::Operation;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ADD: &str = "+";
  pub const MODIFY: &str = "~";
  pub const REPLACE: &str = "±";
  pub const REMOVE: &str = "-";
  pub const SAME: &str = " ";
}

pub fn operation_symbol(operation: Operation) -> &'static str {
  match operation {
    Operation::Create => symbols::ADD,
    Operation::Update => symbols::MODIFY,
    Operation::Replace => symbols::REPLACE,
    Operation::Delete => symbols::REMOVE,
    Operation::Same => symbols::SAME,
  }
}

/// One line per resource: marker, URN and operation.
pub fn print_operation(operation: Operation, urn: &str) {
  let symbol = operation_symbol(operation);
  let symbol = match operation {
    Operation::Create => symbol.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    Operation::Update => symbol.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
    Operation::Replace => symbol.if_supports_color(Stream::Stdout, |s| s.magenta()).to_string(),
    Operation::Delete => symbol.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
    Operation::Same => symbol.to_string(),
  };
  let detail = format!("({operation})");
  println!(
    "  {} {} {}",
    symbol,
    urn,
    detail.if_supports_color(Stream::Stdout, |s| s.dimmed())
  );
}

/// Strings print bare, anything else as compact JSON.
pub fn format_value(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

/// Seconds since the epoch as an RFC 3339 timestamp.
pub fn format_timestamp(secs: u64) -> String {
  humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(secs)).to_string()
}

/// Seconds since the epoch, now.
pub fn now_secs() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0)
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
