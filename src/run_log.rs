// THEORY:
// Every artifact the harness leaves on disk is a pretty-printed JSON document
// with a timestamp in its name: one log per run, one summary per comparison
// session, and the optional export that stitches all run logs together.
//
// Run artifacts (log and video) share a stem built from the experiment
// identity plus a millisecond timestamp, so two runs of the same session never
// collide even when they finish within the same second.

use crate::errors::BenchResult;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// `YYYYmmdd_HHMMSS`, used for session-level artifacts.
pub fn session_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// `YYYYmmdd_HHMMSS_mmm`, used for per-run artifacts.
pub fn run_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// Lowercases `text` and maps anything that isn't alphanumeric, `-` or `_`
/// to `_`. Never returns an empty string.
pub fn safe_name(text: &str) -> String {
    let mapped: String = text
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let trimmed = mapped.trim_matches('_');
    if trimmed.is_empty() {
        "run".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Shared stem of a run's log and video files.
pub fn artifact_stem(
    task: &str,
    library: &str,
    condition: &str,
    repeat: u32,
    timestamp: &str,
) -> String {
    format!(
        "{}_{}_{}_r{}_{}",
        safe_name(task),
        safe_name(library),
        safe_name(condition),
        repeat,
        timestamp
    )
}

fn write_json<T: Serialize>(path: &Path, payload: &T) -> BenchResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}

/// Writes one run payload as `<dir>/run_<stem>.json`.
pub fn write_run_log<T: Serialize>(payload: &T, dir: &Path, stem: &str) -> BenchResult<PathBuf> {
    let path = dir.join(format!("run_{stem}.json"));
    write_json(&path, payload)?;
    Ok(path)
}

/// Writes a comparison summary as `<dir>/comparison_<timestamp>.json`.
pub fn write_comparison_summary<T: Serialize>(
    summary: &T,
    dir: &Path,
    timestamp: &str,
) -> BenchResult<PathBuf> {
    let path = dir.join(format!("comparison_{timestamp}.json"));
    write_json(&path, summary)?;
    Ok(path)
}

/// Collects every `run_*.json` in `logs_dir`, in file-name order, into a
/// single JSON array at `out`. Returns how many logs were exported.
pub fn export_run_logs(logs_dir: &Path, out: &Path) -> BenchResult<usize> {
    let mut logs: Vec<PathBuf> = match fs::read_dir(logs_dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("run_") && n.ends_with(".json"))
            })
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    logs.sort();

    let mut payload = Vec::with_capacity(logs.len());
    for log in &logs {
        let value: Value = serde_json::from_str(&fs::read_to_string(log)?)?;
        payload.push(value);
    }
    write_json(out, &payload)?;
    info!(count = payload.len(), out = %out.display(), "exported run logs");
    Ok(payload.len())
}
