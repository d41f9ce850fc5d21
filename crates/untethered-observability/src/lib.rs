//! Logging bootstrap shared by every process embedding the sync engine.
//!
//! Writes daily-rolling JSONL files next to a compact console layer, filters
//! through `RUST_LOG`, and prunes log files older than the retention window
//! on startup. Secrets (API keys above all) must go through [`redact`]
//! before they reach a log line.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Which process is logging. Shows up in the file prefix so one log
/// directory can hold several processes' output.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    /// The sync engine itself, embedded or standalone.
    Engine,
    /// A UI shell consuming the engine's event stream.
    Shell,
}

impl ProcessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessKind::Engine => "engine",
            ProcessKind::Shell => "shell",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingInitInfo {
    pub process: String,
    pub logs_dir: String,
    pub prefix: String,
    pub retention_days: u64,
    pub initialized_at: DateTime<Utc>,
}

/// Mask a secret for logging: keeps only the length. Never log API keys or
/// prompt text raw.
pub fn redact(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    format!("[redacted len={}]", trimmed.len())
}

/// Install the global subscriber: env-filtered console layer plus a
/// daily-rolling JSONL file layer. Returns the appender guard the caller
/// must keep alive for the process lifetime.
pub fn init_process_logging(
    process: ProcessKind,
    logs_dir: &Path,
    retention_days: u64,
) -> anyhow::Result<(WorkerGuard, LoggingInitInfo)> {
    fs::create_dir_all(logs_dir)?;
    cleanup_old_jsonl(logs_dir, process.as_str(), retention_days)?;

    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(format!("untethered.{}", process.as_str()))
        .filename_suffix("jsonl")
        .build(logs_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_current_span(false)
        .with_span_list(false);

    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true)
        .with_ansi(true);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok();

    let info = LoggingInitInfo {
        process: process.as_str().to_string(),
        logs_dir: logs_dir.display().to_string(),
        prefix: format!("untethered.{}", process.as_str()),
        retention_days,
        initialized_at: Utc::now(),
    };

    Ok((guard, info))
}

fn cleanup_old_jsonl(logs_dir: &Path, process: &str, retention_days: u64) -> anyhow::Result<()> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
    let prefix = format!("untethered.{process}.");

    for entry in fs::read_dir(logs_dir)? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(&prefix) || !name.ends_with(".jsonl") {
            continue;
        }

        // expected: untethered.<proc>.YYYY-MM-DD.jsonl
        let date_part = name.trim_start_matches(&prefix).trim_end_matches(".jsonl");
        let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
            continue;
        };
        let Some(dt) = date.and_hms_opt(0, 0, 0) else {
            continue;
        };
        if DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc) < cutoff {
            let _ = fs::remove_file(path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn redact_masks_content() {
        let masked = redact("untethered-0123456789abcdef0123456789abcdef");
        assert!(masked.starts_with("[redacted len=43"));
        assert!(!masked.contains("abcdef"));
    }

    #[test]
    fn redact_empty_is_empty() {
        assert_eq!(redact("   "), "");
    }

    #[test]
    fn init_creates_rolling_file_for_process() {
        let dir = TempDir::new().unwrap();
        let (guard, info) =
            init_process_logging(ProcessKind::Engine, dir.path(), 7).unwrap();
        assert_eq!(info.process, "engine");
        assert_eq!(info.prefix, "untethered.engine");
        assert_eq!(info.retention_days, 7);

        // Error level passes any realistic env filter; the rolling appender
        // creates the file on first write and the guard flushes on drop.
        tracing::error!("logging smoke entry");
        drop(guard);

        let has_log = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .any(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.starts_with("untethered.engine.") && name.ends_with(".jsonl")
            });
        assert!(has_log, "no rolling log file written");
    }

    #[test]
    fn cleanup_removes_only_expired_matching_files() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("untethered.engine.2000-01-01.jsonl");
        let fresh = dir
            .path()
            .join(format!("untethered.engine.{}.jsonl", Utc::now().format("%Y-%m-%d")));
        let foreign = dir.path().join("other.engine.2000-01-01.jsonl");
        for p in [&old, &fresh, &foreign] {
            fs::write(p, b"{}\n").unwrap();
        }

        cleanup_old_jsonl(dir.path(), "engine", 7).unwrap();

        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(foreign.exists());
    }
}
