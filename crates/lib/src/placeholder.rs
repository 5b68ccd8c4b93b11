//! Placeholder rendering and parsing for values unknown before apply.
//!
//! A preview cannot show outputs of resources that have not been provisioned
//! yet. Such values are rendered as placeholder strings so that a preview is
//! still plain JSON.
//!
//! # Placeholder Formats
//!
//! - `$${output:<urn>.<attr>}` - an output attribute read directly
//! - `$${computed}` - the pending result of a transform
//!
//! # Escaping
//!
//! A run of two or more `$` directly before `{` gains one extra `$` when a
//! literal is escaped, so `$${x}` becomes `$$${x}` and `$$${x}` becomes
//! `$$$${x}`. Parsing drops that extra `$` again. Any other `$` passes
//! through unchanged.
//!
//! # Example
//!
//! ```
//! use stackdecl_lib::placeholder::{parse, Placeholder, Segment};
//!
//! let segments = parse("gs://$${computed}/logs").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("gs://".to_string()),
//!     Segment::Placeholder(Placeholder::Computed),
//!     Segment::Literal("/logs".to_string()),
//! ]);
//! ```

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::deferred::OutputRef;
use crate::resource::Urn;

/// A parsed placeholder reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
  /// `$${output:<urn>.<attr>}` - output attribute of a resource
  Output(OutputRef),

  /// `$${computed}` - a transform result that is not known yet
  Computed,
}

impl fmt::Display for Placeholder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Placeholder::Output(output) => write!(f, "$${{output:{}}}", output),
      Placeholder::Computed => write!(f, "$${{computed}}"),
    }
  }
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A placeholder for an unknown value
  Placeholder(Placeholder),
}

/// Errors that can occur during placeholder parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder type: {0}")]
  UnknownType(String),

  #[error("malformed placeholder: {0}")]
  Malformed(String),
}

/// Escape a literal string so that it never parses as a placeholder.
pub fn escape(literal: &str) -> String {
  let mut out = String::with_capacity(literal.len());
  let mut run = 0;
  for ch in literal.chars() {
    if ch == '$' {
      run += 1;
      continue;
    }
    if run > 0 {
      out.push_str(&"$".repeat(run));
      if ch == '{' && run >= 2 {
        out.push('$');
      }
      run = 0;
    }
    out.push(ch);
  }
  out.push_str(&"$".repeat(run));
  out
}

/// Parse a string containing placeholders into segments.
///
/// # Escaping
///
/// Exactly two `$` before `{` open a placeholder. A run of `n > 2` dollars
/// before `{` is the literal `n - 1` dollars followed by `{`.
///
/// # Errors
///
/// Returns an error if a placeholder is malformed (unclosed, unknown type, etc.)
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    let mut run = 1;
    while chars.next_if(|&(_, c)| c == '$').is_some() {
      run += 1;
    }

    if chars.peek().map(|&(_, c)| c) != Some('{') {
      literal.push_str(&"$".repeat(run));
      continue;
    }

    if run != 2 {
      // `{` itself is pushed as a literal on the next iteration
      literal.push_str(&"$".repeat(if run > 2 { run - 1 } else { run }));
      continue;
    }

    chars.next();
    if !literal.is_empty() {
      segments.push(Segment::Literal(std::mem::take(&mut literal)));
    }

    let mut content = String::new();
    let mut found_close = false;

    for (_, c) in chars.by_ref() {
      if c == '}' {
        found_close = true;
        break;
      }
      content.push(c);
    }

    if !found_close {
      return Err(PlaceholderError::Unclosed(pos));
    }

    segments.push(Segment::Placeholder(parse_placeholder_content(&content)?));
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Parse the content inside a placeholder (everything between `$${` and `}`).
fn parse_placeholder_content(content: &str) -> Result<Placeholder, PlaceholderError> {
  if content == "computed" {
    return Ok(Placeholder::Computed);
  }

  let (kind, rest) = content
    .split_once(':')
    .ok_or_else(|| PlaceholderError::Malformed(format!("missing colon in '{content}'")))?;

  match kind {
    "output" => {
      // Attribute names never contain '.', resource names may
      let (urn, attr) = rest
        .rsplit_once('.')
        .ok_or_else(|| PlaceholderError::Malformed(format!("output placeholder missing attribute: '{content}'")))?;

      if attr.is_empty() || !urn.contains("::") {
        return Err(PlaceholderError::Malformed(format!("invalid output reference: '{rest}'")));
      }

      Ok(Placeholder::Output(OutputRef::new(Urn(urn.to_string()), attr)))
    }
    _ => Err(PlaceholderError::UnknownType(kind.to_string())),
  }
}

/// Returns true if any string inside `value` holds a placeholder.
///
/// Strings that fail to parse are treated as literals.
pub fn contains_unknown(value: &Value) -> bool {
  match value {
    Value::String(s) => parse(s)
      .map(|segments| segments.iter().any(|s| matches!(s, Segment::Placeholder(_))))
      .unwrap_or(false),
    Value::Array(items) => items.iter().any(contains_unknown),
    Value::Object(map) => map.values().any(contains_unknown),
    Value::Null | Value::Bool(_) | Value::Number(_) => false,
  }
}

/// Unescape a literal string previously passed through [`escape`].
///
/// Returns `None` if the string contains a placeholder.
pub fn unescape(input: &str) -> Option<String> {
  let segments = parse(input).ok()?;
  let mut out = String::new();
  for segment in segments {
    match segment {
      Segment::Literal(s) => out.push_str(&s),
      Segment::Placeholder(_) => return None,
    }
  }
  Some(out)
}
