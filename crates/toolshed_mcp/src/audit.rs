//! Audit Log - Tool Invocation Recording
//!
//! Records every attempted tool invocation, including rejections, as one
//! JSONL line in an append-only per-UTC-day file
//! (`audit-<YYYY-MM-DD>.jsonl`). On the first write of the process lifetime
//! a retention sweep deletes day files whose modification time is older than
//! the configured retention window.
//!
//! Argument values whose key matches the sensitive-name set are replaced
//! with `"[REDACTED]"` before serialization; the live argument map is never
//! mutated.
//!
//! A failed audit write is the caller's problem only insofar as it must be
//! swallowed: audit failure never rejects a tool call.

use crate::arguments::ArgumentMap;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Argument keys that are always redacted, compared case-insensitively.
pub const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "pwd",
    "secret",
    "token",
    "authorization",
    "api_key",
    "apikey",
    "credential",
    "private_key",
];

/// Replacement value for redacted arguments.
pub const REDACTED: &str = "[REDACTED]";

/// Outcome of one invocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditOutcome {
    Success,
    Failure,
    RateLimited,
    Unauthorized,
}

/// One audit line, camelCase on disk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// When the invocation was attempted.
    pub timestamp: DateTime<Utc>,

    /// Process-unique id correlating this attempt with diagnostics.
    pub correlation_id: String,

    /// Resolved identity name, when a session identity exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_name: Option<String>,

    /// Tool that was invoked.
    pub tool_name: String,

    /// The call's `action` argument, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Arguments after sensitive-key redaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitized_arguments: Option<Value>,

    /// What happened.
    pub outcome: AuditOutcome,

    /// Error detail for Failure/Unauthorized outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Wall time spent on the attempt.
    pub duration_ms: u64,
}

/// Build the sanitized argument object for an [`AuditRecord`].
///
/// Keys matching [`SENSITIVE_KEYS`] or `extra_sensitive` (case-insensitive
/// set membership) have their values replaced with [`REDACTED`].
pub fn sanitize_arguments(arguments: &ArgumentMap, extra_sensitive: &HashSet<String>) -> Value {
    let mut out = serde_json::Map::new();
    for (key, value) in arguments {
        let lower = key.to_lowercase();
        let sensitive =
            SENSITIVE_KEYS.contains(&lower.as_str()) || extra_sensitive.contains(&lower);
        let rendered = if sensitive {
            Value::String(REDACTED.to_string())
        } else {
            value.to_json()
        };
        out.insert(key.clone(), rendered);
    }
    Value::Object(out)
}

/// Audit log errors.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Failed to write audit record: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize audit record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Where audit records go.
pub trait AuditSink: Send + Sync {
    /// Append one record. Callers swallow errors; implementations must not
    /// panic.
    fn log_call(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Null sink: silently succeeds. Used when auditing is disabled.
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn log_call(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        Ok(())
    }
}

struct DayWriter {
    date: NaiveDate,
    writer: BufWriter<File>,
}

/// JSONL audit logger writing per-UTC-day files under one directory.
pub struct JsonlAuditLogger {
    directory: PathBuf,
    retention_days: u64,
    retention_ran: AtomicBool,
    current: Mutex<Option<DayWriter>>,
}

impl JsonlAuditLogger {
    /// Create a logger. The directory is created on first write.
    pub fn new(directory: PathBuf, retention_days: u64) -> Self {
        Self {
            directory,
            retention_days,
            retention_ran: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }

    fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.directory
            .join(format!("audit-{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Delete day files older than the retention window, judged by mtime.
    /// Failures are diagnostics, never write errors.
    fn run_retention(&self, now: SystemTime) {
        let cutoff = now - Duration::from_secs(self.retention_days * 24 * 60 * 60);
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("audit-") || !name.ends_with(".jsonl") {
                continue;
            }
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            if modified < cutoff {
                debug!("Retention: removing {}", name);
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!("Retention failed to remove {}: {}", name, e);
                }
            }
        }
    }
}

impl AuditSink for JsonlAuditLogger {
    fn log_call(&self, record: &AuditRecord) -> Result<(), AuditError> {
        fs::create_dir_all(&self.directory)?;

        // Retention runs exactly once per process, on the first write.
        if !self.retention_ran.swap(true, Ordering::SeqCst) {
            self.run_retention(SystemTime::now());
        }

        let json = serde_json::to_string(record)?;
        let date = record.timestamp.date_naive();

        let mut current = self.current.lock().expect("Audit writer lock poisoned");
        let rollover = match current.as_ref() {
            Some(day) => day.date != date,
            None => true,
        };
        if rollover {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.file_for(date))?;
            *current = Some(DayWriter {
                date,
                writer: BufWriter::new(file),
            });
        }

        let day = current.as_mut().expect("Audit writer just initialized");
        writeln!(day.writer, "{}", json)?;
        day.writer.flush()?;
        Ok(())
    }
}
