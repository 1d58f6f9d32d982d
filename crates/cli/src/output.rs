//! Terminal rendering of build results and target catalogs.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use pkgraph_lib::engine::ResultRef;
use pkgraph_lib::platform::Platform;
use pkgraph_lib::target::TargetInfo;

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
  pub const INFO: &str = "•";
  pub const DEFAULT: &str = "→";
}

/// The first 12 hex characters of a result reference, without the
/// algorithm prefix.
pub fn short_ref(reference: &ResultRef) -> &str {
  let hex = reference.0.strip_prefix("sha256:").unwrap_or(&reference.0);
  &hex[..hex.len().min(12)]
}

pub fn format_bytes(bytes: u64) -> String {
  const KB: u64 = 1024;
  const MB: u64 = KB * 1024;

  if bytes >= MB {
    format!("{:.1} MB", bytes as f64 / MB as f64)
  } else if bytes >= KB {
    format!("{:.1} KB", bytes as f64 / KB as f64)
  } else {
    format!("{bytes} B")
  }
}

/// Build durations: milliseconds below a second, seconds with two decimals
/// otherwise.
pub fn format_duration(duration: Duration) -> String {
  if duration.as_secs() == 0 {
    format!("{}ms", duration.subsec_millis())
  } else {
    format!("{:.2}s", duration.as_secs_f64())
  }
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

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

/// One line per built platform: `  linux/amd64: 0123456789ab`.
pub fn print_platform_result(platform: &Platform, reference: &ResultRef) {
  println!(
    "  {}: {}",
    platform.to_string().if_supports_color(Stream::Stdout, |s| s.dimmed()),
    short_ref(reference)
  );
}

/// Print a target catalog with names aligned and the default marked.
pub fn print_targets(targets: &[TargetInfo]) {
  let width = targets.iter().map(|t| t.name.len()).max().unwrap_or(0);
  for target in targets {
    let marker = if target.default { symbols::DEFAULT } else { " " };
    println!(
      "{} {:width$}  {}",
      marker.if_supports_color(Stream::Stdout, |s| s.green()),
      target.name,
      target.description.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    );
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{json}");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn short_ref_strips_algorithm() {
    let digest = ResultRef("sha256:abcdef123456789".to_string());
    assert_eq!(short_ref(&digest), "abcdef123456");
    assert_eq!(short_ref(&ResultRef("short".to_string())), "short");
    assert_eq!(short_ref(&ResultRef(String::new())), "");
  }

  #[test]
  fn archive_sizes() {
    assert_eq!(format_bytes(500), "500 B");
    assert_eq!(format_bytes(1536), "1.5 KB");
    assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
  }

  #[test]
  fn build_durations() {
    assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
    assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    assert_eq!(format_duration(Duration::from_secs(65)), "65.00s");
  }
}
