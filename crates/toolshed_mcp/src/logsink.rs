//! Log Sink - Client-Bound Log Forwarding
//!
//! Accepts structured log records and forwards those at or above a mutable
//! threshold to the client as `notifications/message` lines on the outbound
//! stream. The stdout writer is attached once the initialize handshake is
//! handled; records logged before that are dropped, not buffered.
//!
//! # Wire Format
//!
//! ```json
//! {"jsonrpc":"2.0","method":"notifications/message",
//!  "params":{"level":"warning","logger":"pipeline","data":"..."}}
//! ```

use crate::protocol::methods;
use crate::writer::MessageWriter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use tracing::warn;

/// Canonical MCP log severity, ordered least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Debug,
            1 => Self::Info,
            2 => Self::Notice,
            3 => Self::Warning,
            4 => Self::Error,
            5 => Self::Critical,
            6 => Self::Alert,
            _ => Self::Emergency,
        }
    }

    /// Wire name of the level.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "notice" => Ok(Self::Notice),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            "alert" => Ok(Self::Alert),
            "emergency" => Ok(Self::Emergency),
            _ => Err(()),
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        if level == tracing::Level::ERROR {
            Self::Error
        } else if level == tracing::Level::WARN {
            Self::Warning
        } else if level == tracing::Level::INFO {
            Self::Info
        } else {
            // TRACE and DEBUG both forward as debug.
            Self::Debug
        }
    }
}

/// Forwards log records to the client above a mutable threshold.
///
/// Thread-safe: the threshold is an atomic store, and concurrent writes are
/// serialized by the shared writer.
#[derive(Debug)]
pub struct LogSink {
    threshold: AtomicU8,
    writer: Mutex<Option<MessageWriter>>,
}

impl LogSink {
    /// Create a sink with the given initial threshold (default `warning`).
    pub fn new(threshold: LogLevel) -> Self {
        Self {
            threshold: AtomicU8::new(threshold as u8),
            writer: Mutex::new(None),
        }
    }

    /// Attach the outbound writer. Until this is called every record is
    /// dropped silently.
    pub fn attach_writer(&self, writer: MessageWriter) {
        let mut slot = self.writer.lock().expect("Log sink writer lock poisoned");
        *slot = Some(writer);
    }

    /// Replace the forwarding threshold.
    pub fn set_level(&self, level: LogLevel) {
        self.threshold.store(level as u8, Ordering::SeqCst);
    }

    /// Current forwarding threshold.
    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.threshold.load(Ordering::SeqCst))
    }

    /// Whether a record at `level` would be forwarded.
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.level()
    }

    /// Forward one record. Never fails: write errors are reported on the
    /// diagnostic stream and the record is dropped.
    pub fn write_log(&self, level: LogLevel, logger: &str, message: &str) {
        if !self.is_enabled(level) {
            return;
        }

        let writer = {
            let slot = self.writer.lock().expect("Log sink writer lock poisoned");
            match slot.as_ref() {
                Some(w) => w.clone(),
                None => return,
            }
        };

        let params = serde_json::json!({
            "level": level.as_str(),
            "logger": logger,
            "data": message,
        });

        if let Err(e) = writer.write_notification(methods::NOTIFICATION_MESSAGE, params) {
            warn!("Failed to forward log notification: {}", e);
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(LogLevel::Warning)
    }
}
