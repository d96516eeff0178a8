use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use log::info;

use super::ObservationReport;

const SEPARATOR: &str = "==================================";

/// `M:SS`, minutes unbounded.
pub fn format_duration(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn format_local(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

pub fn render_text(report: &ObservationReport) -> String {
    let mut text = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(text, "[ CHRONOS OBSERVATION REPORT ]");
    let _ = writeln!(text, "SUBJECT: {}", report.subject);
    let _ = writeln!(text, "START: {}", format_local(report.started_at));
    let _ = writeln!(text, "END: {}", format_local(report.ended_at));
    let _ = writeln!(text, "TOTAL: {}", format_duration(report.total_secs));
    let _ = writeln!(text, "{SEPARATOR}");

    let _ = writeln!(text, "[ MODES ]");
    for entry in &report.mode_durations {
        let _ = writeln!(text, "{}: {}", entry.mode.label(), format_duration(entry.secs));
    }

    let _ = writeln!(text);
    let _ = writeln!(text, "[ ACTIONS ]");
    for entry in &report.action_counts {
        let _ = writeln!(text, "{}: {}", entry.action.label(), entry.count);
    }

    text
}

fn file_name(report: &ObservationReport) -> String {
    let subject: String = report
        .subject
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    format!("LOG_{}_{}.txt", subject, report.ended_at.timestamp_millis())
}

/// Writes the report as BOM-prefixed UTF-8 text into `dir` and returns the path.
pub fn write_report(report: &ObservationReport, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report directory {}", dir.display()))?;

    let path = dir.join(file_name(report));
    let contents = format!("\u{FEFF}{}", render_text(report));
    fs::write(&path, contents)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    info!("Exported observation report to {}", path.display());
    Ok(path)
}
