//! Terminal output for the stagehand CLI.
//!
//! Status lines go to stdout, except errors and compiler diagnostics which
//! go to stderr so `-o json` output stays parseable. Color is only used when
//! the stream is a terminal.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

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
  /// Separates an artifact from where it lands in the image.
  pub const ARROW: &str = "→";
}

#[derive(Debug, Clone, Copy)]
enum Status {
  Success,
  Failure,
  Warning,
  Info,
}

impl Status {
  fn marker(self, stream: Stream) -> String {
    match self {
      Status::Success => symbols::SUCCESS.if_supports_color(stream, |s| s.green()).to_string(),
      Status::Failure => symbols::ERROR.if_supports_color(stream, |s| s.red()).to_string(),
      Status::Warning => symbols::WARNING.if_supports_color(stream, |s| s.yellow()).to_string(),
      Status::Info => symbols::INFO.if_supports_color(stream, |s| s.blue()).to_string(),
    }
  }
}

/// First 12 hex digits of a digest, enough to tell artifacts and images apart.
pub fn short_digest(digest: &str) -> &str {
  digest.get(..12).unwrap_or(digest)
}

/// Artifact and image sizes, in binary units.
pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 3] = ["KB", "MB", "GB"];

  if bytes < 1024 {
    return format!("{} B", bytes);
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }
  format!("{:.1} {}", value, UNITS[unit])
}

/// Stage and run durations, to millisecond precision.
pub fn format_duration(duration: Duration) -> String {
  let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
  humantime::format_duration(Duration::from_millis(millis)).to_string()
}

/// Exit code with the sysexits name, when it has one.
pub fn format_exit_code(code: i32) -> String {
  let name = match code {
    68 => Some("EX_NOHOST"),
    69 => Some("EX_UNAVAILABLE"),
    70 => Some("EX_SOFTWARE"),
    75 => Some("EX_TEMPFAIL"),
    78 => Some("EX_CONFIG"),
    _ => None,
  };
  match name {
    Some(name) => format!("{} ({})", code, name),
    None => code.to_string(),
  }
}

pub fn print_success(message: &str) {
  println!("{} {}", Status::Success.marker(Stream::Stdout), message);
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    Status::Failure.marker(Stream::Stderr),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    Status::Warning.marker(Stream::Stderr),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!("{} {}", Status::Info.marker(Stream::Stdout), message);
}

/// A failed plan check. Goes to stdout with the rest of the plan.
pub fn print_failure(message: &str) {
  println!("{} {}", Status::Failure.marker(Stream::Stdout), message);
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// Compiler output captured by the build stage, already redacted.
///
/// Printed verbatim after a blank line; nothing is printed for empty output.
pub fn print_diagnostics(diagnostics: &str) {
  let diagnostics = diagnostics.trim_end();
  if diagnostics.is_empty() {
    return;
  }
  eprintln!();
  for line in diagnostics.lines() {
    eprintln!("  {}", line.if_supports_color(Stream::Stderr, |s| s.dimmed()));
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize report as JSON")?;
  println!("{}", json);
  Ok(())
}
