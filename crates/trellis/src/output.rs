//! Output formatting for CLI commands.
//!
//! Commands print either human-readable text or pretty JSON. Colors follow a
//! small semantic theme:
//!   - Healthy / low severity:   green
//!   - Warning / medium severity: yellow
//!   - Critical / high severity:  red
//!   - Ids:                       cyan
//!
//! `colored` honours `NO_COLOR` and non-terminal stdout on its own.

use crate::analysis::HealthBand;
use crate::domain::ViolationSeverity;
use colored::Colorize;
use serde::Serialize;
use std::io::{self, Write};

/// Output format mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text format
    Text,
    /// JSON format for programmatic use
    Json,
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(handle, "{json}")
}

/// Id in the reference color
pub fn id(text: &str) -> String {
    text.cyan().to_string()
}

/// Section header
pub fn header(text: &str) -> String {
    text.bold().to_string()
}

/// Field label
pub fn label(text: &str) -> String {
    text.dimmed().to_string()
}

/// Band name colored by band
pub fn band(band: HealthBand) -> String {
    let text = band.to_string();
    match band {
        HealthBand::Healthy => text.green().to_string(),
        HealthBand::Warning => text.yellow().to_string(),
        HealthBand::Critical => text.red().bold().to_string(),
    }
}

/// Severity name colored by severity
pub fn severity(severity: ViolationSeverity) -> String {
    let text = severity.to_string();
    match severity {
        ViolationSeverity::Low => text.green().to_string(),
        ViolationSeverity::Medium => text.yellow().to_string(),
        ViolationSeverity::High => text.red().to_string(),
        ViolationSeverity::Critical => text.red().bold().to_string(),
    }
}

/// Marker for nodes on the critical path
pub fn critical_marker(is_critical: bool) -> String {
    if is_critical {
        "*".red().bold().to_string()
    } else {
        " ".to_string()
    }
}

/// Format a day count with one decimal
pub fn days(value: f64) -> String {
    format!("{value:.1}d")
}
