//! Shared tracing initialization for Toolshed binaries.
//!
//! Diagnostics go to a rolling file under the Toolshed home directory and
//! to stderr. stdout is never touched: it carries the MCP wire protocol.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "toolshed=info,toolshed_mcp=info";

/// Rotated copies kept beside the live file (`<app>.log.1` ..
/// `<app>.log.N`); older copies are dropped.
const ROTATED_COPIES: usize = 4;

/// Size at which the live file is rotated out.
const ROTATE_AT_BYTES: u64 = 8 * 1024 * 1024;

/// Logging configuration shared by Toolshed binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the file filter onto stderr instead of warnings only.
    pub verbose: bool,
}

/// Initialize tracing with a rolling file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file_writer = RollingWriter::open(log_dir, config.app_name)
        .context("Failed to initialize rolling log writer")?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // stderr shares the process with the wire protocol on stdout; keep it
    // to warnings unless explicitly asked for more.
    let console_filter = if config.verbose {
        file_filter.to_string()
    } else {
        "warn".to_string()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::new(console_filter)),
        )
        .init();

    Ok(())
}

/// Get the Toolshed home directory: ~/.toolshed
pub fn toolshed_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("TOOLSHED_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".toolshed")
}

/// Get the logs directory: ~/.toolshed/logs
pub fn logs_dir() -> PathBuf {
    toolshed_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Size-rotated log file writer.
///
/// Writes go to `<app>.log`; when it crosses [`ROTATE_AT_BYTES`] the whole
/// chain shifts one slot (`.log` → `.log.1` → ... → `.log.N`), with the
/// oldest slot overwritten by the rename. Cloneable; clones share the
/// underlying file.
#[derive(Clone)]
pub struct RollingWriter {
    inner: Arc<Mutex<RollingState>>,
}

struct RollingState {
    dir: PathBuf,
    base_name: String,
    file: File,
    written: u64,
}

impl RollingWriter {
    fn open(dir: PathBuf, app_name: &str) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let base_name = sanitize_name(app_name);
        let live = dir.join(format!("{}.log", base_name));
        let file = OpenOptions::new().create(true).append(true).open(live)?;
        let written = file.metadata()?.len();

        let mut state = RollingState {
            dir,
            base_name,
            file,
            written,
        };
        if state.written > ROTATE_AT_BYTES {
            state.shift_chain()?;
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(state)),
        })
    }
}

impl RollingState {
    /// Path of slot `index`; slot 0 is the live file.
    fn slot(&self, index: usize) -> PathBuf {
        match index {
            0 => self.dir.join(format!("{}.log", self.base_name)),
            n => self.dir.join(format!("{}.log.{}", self.base_name, n)),
        }
    }

    /// Open (or reopen) the live file for appending and record its size.
    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.slot(0))?;
        self.written = file.metadata()?.len();
        self.file = file;
        Ok(())
    }

    /// Shift every existing slot up by one. Renaming onto the last slot
    /// overwrites it, which is how the oldest copy ages out.
    fn shift_chain(&mut self) -> io::Result<()> {
        let _ = self.file.flush();

        for index in (0..ROTATED_COPIES).rev() {
            let src = self.slot(index);
            if src.exists() {
                fs::rename(&src, self.slot(index + 1))?;
            }
        }

        self.reopen()
    }
}

impl Write for RollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        if state.written + buf.len() as u64 > ROTATE_AT_BYTES {
            state.shift_chain()?;
        }
        let bytes = state.file.write(buf)?;
        state.written += bytes as u64;
        Ok(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        state.file.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RollingWriter {
    type Writer = RollingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Collapse anything that is not `[A-Za-z0-9_-]` to an underscore so the
/// app name is safe as a file stem.
fn sanitize_name(name: &str) -> String {
    name.replace(
        |ch: char| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'),
        "_",
    )
}
