//! Per-call progress reporting.
//!
//! A live reporter is constructed only when the call's `_meta.progressToken`
//! is a non-empty string; everything else gets the silent variant. Reporters
//! do not coalesce or rate-limit; flooding is the tool's problem.

use crate::protocol::methods;
use crate::writer::MessageWriter;
use tracing::warn;

/// Emits `notifications/progress` for one tool call.
#[derive(Debug, Clone)]
pub enum ProgressReporter {
    /// No token was supplied; every report is a no-op.
    Null,
    /// Forwards reports to the client, echoing the caller's token.
    Live {
        token: String,
        writer: MessageWriter,
    },
}

impl ProgressReporter {
    /// Build a reporter for a call. `token` comes from `_meta.progressToken`.
    pub fn for_call(token: Option<&str>, writer: &MessageWriter) -> Self {
        match token {
            Some(t) if !t.is_empty() => Self::Live {
                token: t.to_string(),
                writer: writer.clone(),
            },
            _ => Self::Null,
        }
    }

    /// Report progress without a known total.
    pub fn report(&self, progress: f64) {
        self.emit(progress, None);
    }

    /// Report progress out of `total`.
    pub fn report_with_total(&self, progress: f64, total: f64) {
        self.emit(progress, Some(total));
    }

    fn emit(&self, progress: f64, total: Option<f64>) {
        let (token, writer) = match self {
            Self::Null => return,
            Self::Live { token, writer } => (token, writer),
        };

        let mut params = serde_json::json!({
            "progressToken": token,
            "progress": progress,
        });
        if let Some(total) = total {
            params["total"] = serde_json::json!(total);
        }

        // Notification failures never affect the tool call.
        if let Err(e) = writer.write_notification(methods::NOTIFICATION_PROGRESS, params) {
            warn!("Failed to emit progress notification: {}", e);
        }
    }
}
