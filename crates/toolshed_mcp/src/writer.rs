//! Shared outbound message writer.
//!
//! The dispatcher owns stdout. Responses, log notifications and progress
//! notifications all funnel through one [`MessageWriter`] so that concurrent
//! writers emit whole lines, never interleaved fragments. Each message is one
//! JSON object followed by `\n`, flushed before the lock is released.

use crate::protocol::JSONRPC_VERSION;
use serde_json::Value;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Cloneable handle to the single outbound stream.
#[derive(Clone)]
pub struct MessageWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl MessageWriter {
    /// Wrap a writer (stdout in production, a buffer in tests).
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Write one JSON value as a line and flush.
    pub fn write_json(&self, value: &Value) -> io::Result<()> {
        let json = serde_json::to_string(value)?;
        let mut writer = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "writer lock poisoned"))?;
        writeln!(writer, "{}", json)?;
        writer.flush()
    }

    /// Write a JSON-RPC notification (no id).
    pub fn write_notification(&self, method: &str, params: Value) -> io::Result<()> {
        self.write_json(&serde_json::json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": method,
            "params": params,
        }))
    }
}

impl std::fmt::Debug for MessageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageWriter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_json_appends_newline() {
        let buf = SharedBuf::default();
        let writer = MessageWriter::new(buf.clone());

        writer.write_json(&serde_json::json!({"a": 1})).unwrap();

        let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(out, "{\"a\":1}\n");
    }

    #[test]
    fn test_notification_shape() {
        let buf = SharedBuf::default();
        let writer = MessageWriter::new(buf.clone());

        writer
            .write_notification("notifications/progress", serde_json::json!({"progress": 1}))
            .unwrap();

        let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let value: Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "notifications/progress");
        assert!(value.get("id").is_none());
    }
}
