//! Output formatting for different formats.

use std::str::FromStr;

use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use icao_pkd::ValidationError;
use serde::{Deserialize, Serialize};
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Available output formats.
#[derive(Debug, Clone, Copy, Default, ValueEnum, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable report with colors
    #[default]
    Pretty,
    /// JSON output
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "table" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!(
                "Unknown output format: {}\n\
                 Valid formats: pretty, json",
                s
            ),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Print any serializable value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `PASS` / `FAIL` label.
pub fn verdict(ok: bool) -> ColoredString {
    if ok {
        "PASS".green().bold()
    } else {
        "FAIL".red().bold()
    }
}

/// Key/value line with a bold label.
pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {} {}", format!("{label}:").bold(), value);
}

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "Finding")]
    kind: String,
    #[tabled(rename = "Certificate")]
    subject: String,
    #[tabled(rename = "Detail")]
    message: String,
}

/// Findings as a table; nothing when empty.
pub fn print_findings(findings: &[ValidationError]) {
    if findings.is_empty() {
        return;
    }
    let rows: Vec<FindingRow> = findings
        .iter()
        .map(|f| FindingRow {
            kind: f.kind.to_string(),
            subject: f.subject_dn.clone(),
            message: f.message.clone(),
        })
        .collect();
    println!();
    println!("{}", Table::new(rows).with(Style::rounded()));
}
