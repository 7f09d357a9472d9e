//! Tool Invocation Pipeline
//!
//! Wraps every tools/call with the cross-cutting order the server
//! guarantees: authorize → rate-limit → cache lookup → execute → cache
//! store → audit. Authorization runs strictly before rate-limiting, so a
//! denied call consumes no tokens and never touches the cache. Every
//! attempt is audited, including rejections; an audit write failure is
//! diagnosed and swallowed, never surfaced to the client.
//!
//! Internal rejections (unauthorized, rate-limited) and tool failures all
//! come back as `isError:true` results. JSON-RPC errors are reserved for
//! protocol-level conditions and never originate here.

use crate::arguments::{action_of, ArgumentMap};
use crate::audit::{sanitize_arguments, AuditOutcome, AuditRecord, AuditSink};
use crate::auth::{Authorizer, Identity};
use crate::cache::{CacheKey, ToolResultCache};
use crate::cancel::CancellationToken;
use crate::logsink::{LogLevel, LogSink};
use crate::progress::ProgressReporter;
use crate::protocol::ToolCallResult;
use crate::ratelimit::RateLimiter;
use crate::tools::ToolRegistry;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// The pipeline and its cross-cutting collaborators.
///
/// Everything here is immutable after startup; the pipeline is shared
/// across worker threads behind an `Arc`.
pub struct ToolPipeline {
    registry: ToolRegistry,
    authorizer: Arc<dyn Authorizer>,
    limiter: Arc<dyn RateLimiter>,
    cache: Arc<dyn ToolResultCache>,
    audit: Arc<dyn AuditSink>,
    logsink: Arc<LogSink>,
    identity: Option<Identity>,
    extra_sensitive: HashSet<String>,
}

impl ToolPipeline {
    /// Assemble a pipeline. `credential` is the session credential read
    /// once at startup; it is resolved here and never re-read.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: ToolRegistry,
        authorizer: Arc<dyn Authorizer>,
        limiter: Arc<dyn RateLimiter>,
        cache: Arc<dyn ToolResultCache>,
        audit: Arc<dyn AuditSink>,
        logsink: Arc<LogSink>,
        credential: Option<&str>,
        extra_sensitive: HashSet<String>,
    ) -> Self {
        let identity = authorizer.resolve_identity(credential);
        Self {
            registry,
            authorizer,
            limiter,
            cache,
            audit,
            logsink,
            identity,
            extra_sensitive: extra_sensitive
                .into_iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    /// The tool registry (for tools/list and lookup).
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// The resolved session identity, if any.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Run one tool invocation through the full pipeline.
    ///
    /// The caller has already verified that `name` exists in the registry.
    pub fn invoke(
        &self,
        name: &str,
        arguments: &ArgumentMap,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> ToolCallResult {
        let action = action_of(arguments);
        let correlation_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        debug!(
            tool = name,
            action = action.as_deref().unwrap_or(""),
            correlation = %correlation_id,
            "Invoking tool"
        );

        // AUTHORIZE. A denied call is audited but consumes nothing else.
        let decision =
            self.authorizer
                .authorize_tool_call(self.identity.as_ref(), name, action.as_deref());
        if !decision.allowed {
            let reason = decision
                .reason
                .unwrap_or_else(|| "Authorization denied".to_string());
            self.logsink.write_log(
                LogLevel::Warning,
                "pipeline",
                &format!("Unauthorized call to '{}': {}", name, reason),
            );
            self.audit_safe(self.record(
                &correlation_id,
                name,
                &action,
                arguments,
                AuditOutcome::Unauthorized,
                Some(reason.clone()),
                started,
            ));
            return ToolCallResult::error(reason);
        }

        // RATE-LIMIT.
        if !self.limiter.try_acquire(name) {
            let message = format!(
                "Rate limit exceeded for tool '{}'. Please retry later.",
                name
            );
            self.logsink
                .write_log(LogLevel::Warning, "pipeline", &message);
            self.audit_safe(self.record(
                &correlation_id,
                name,
                &action,
                arguments,
                AuditOutcome::RateLimited,
                None,
                started,
            ));
            return ToolCallResult::error(message);
        }

        // CACHE READ.
        let key = CacheKey::build(name, action.as_deref(), arguments);
        if let Some(hit) = self.cache.try_get(name, &key) {
            debug!(tool = name, key = key.as_str(), "Cache hit");
            self.audit_safe(self.record(
                &correlation_id,
                name,
                &action,
                arguments,
                AuditOutcome::Success,
                None,
                started,
            ));
            return hit;
        }

        // INVOKE.
        let tool = match self.registry.get(name) {
            Some(tool) => tool,
            None => {
                // Callers gate on registry membership; this is a bug guard.
                return ToolCallResult::error(format!("Unknown tool: {}", name));
            }
        };

        match tool.execute(arguments, progress, cancel) {
            Ok(result) => {
                self.cache.set(name, &key, &result);
                self.audit_safe(self.record(
                    &correlation_id,
                    name,
                    &action,
                    arguments,
                    AuditOutcome::Success,
                    None,
                    started,
                ));
                result
            }
            Err(e) => {
                let message = e.to_string();
                self.logsink.write_log(
                    LogLevel::Error,
                    "pipeline",
                    &format!("Tool '{}' failed: {}", name, message),
                );
                self.audit_safe(self.record(
                    &correlation_id,
                    name,
                    &action,
                    arguments,
                    AuditOutcome::Failure,
                    Some(message.clone()),
                    started,
                ));
                ToolCallResult::error(format!("Error executing tool: {}", message))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        correlation_id: &str,
        tool: &str,
        action: &Option<String>,
        arguments: &ArgumentMap,
        outcome: AuditOutcome,
        error_message: Option<String>,
        started: Instant,
    ) -> AuditRecord {
        AuditRecord {
            timestamp: Utc::now(),
            correlation_id: correlation_id.to_string(),
            identity_name: self
                .identity
                .as_ref()
                .filter(|i| !i.is_denied())
                .map(|i| i.name.clone()),
            tool_name: tool.to_string(),
            action: action.clone(),
            sanitized_arguments: Some(sanitize_arguments(arguments, &self.extra_sensitive)),
            outcome,
            error_message,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Audit must never reject a call: failures become diagnostics.
    fn audit_safe(&self, record: AuditRecord) {
        if let Err(e) = self.audit.log_call(&record) {
            warn!("Audit write failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::normalize_arguments;
    use crate::audit::AuditError;
    use crate::auth::{AllowAllAuthorizer, ApiKeyAuthorizer};
    use crate::cache::{CacheConfig, NullCache, ResponseCache};
    use crate::clock::SystemClock;
    use crate::ratelimit::NullRateLimiter;
    use crate::tools::Tool;
    use anyhow::bail;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingTool {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Tool for &'static CountingTool {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn description(&self) -> &'static str {
            "test tool"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn execute(
            &self,
            _args: &ArgumentMap,
            _progress: &ProgressReporter,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<ToolCallResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("deliberate failure");
            }
            Ok(ToolCallResult::text("counted"))
        }
    }

    #[derive(Default)]
    struct RecordingAudit {
        records: Mutex<Vec<AuditRecord>>,
    }

    impl AuditSink for RecordingAudit {
        fn log_call(&self, record: &AuditRecord) -> Result<(), AuditError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct FailingAudit;

    impl AuditSink for FailingAudit {
        fn log_call(&self, _record: &AuditRecord) -> Result<(), AuditError> {
            Err(AuditError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }
    }

    #[derive(Default)]
    struct CountingLimiter {
        calls: AtomicUsize,
        admit: bool,
    }

    impl RateLimiter for CountingLimiter {
        fn try_acquire(&self, _tool: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.admit
        }
    }

    fn args(value: serde_json::Value) -> ArgumentMap {
        normalize_arguments(value.as_object().unwrap())
    }

    fn pipeline_with(
        tool: &'static CountingTool,
        authorizer: Arc<dyn Authorizer>,
        limiter: Arc<dyn RateLimiter>,
        cache: Arc<dyn ToolResultCache>,
        audit: Arc<dyn AuditSink>,
        credential: Option<&str>,
    ) -> ToolPipeline {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(tool));
        ToolPipeline::new(
            registry,
            authorizer,
            limiter,
            cache,
            audit,
            Arc::new(LogSink::default()),
            credential,
            HashSet::new(),
        )
    }

    fn invoke(pipeline: &ToolPipeline, arguments: serde_json::Value) -> ToolCallResult {
        pipeline.invoke(
            "counting",
            &args(arguments),
            &ProgressReporter::Null,
            &CancellationToken::new(),
        )
    }

    #[test]
    fn test_unauthorized_skips_limiter_cache_and_tool() {
        static TOOL: CountingTool = CountingTool {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let limiter = Arc::new(CountingLimiter {
            calls: AtomicUsize::new(0),
            admit: true,
        });
        let audit = Arc::new(RecordingAudit::default());
        let cache = Arc::new(ResponseCache::new(
            CacheConfig::default(),
            Arc::new(SystemClock),
        ));

        // Authentication required, no credential: denied sentinel session.
        let pipeline = pipeline_with(
            &TOOL,
            Arc::new(ApiKeyAuthorizer::new(true, vec![])),
            limiter.clone(),
            cache.clone(),
            audit.clone(),
            None,
        );

        let result = invoke(&pipeline, json!({"x": 1}));

        assert!(result.is_error);
        assert_eq!(TOOL.calls.load(Ordering::SeqCst), 0);
        assert_eq!(limiter.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.len(), 0);

        let records = audit.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, AuditOutcome::Unauthorized);
        assert_eq!(
            records[0].error_message.as_deref(),
            Some("Authentication required")
        );
    }

    #[test]
    fn test_rate_limited_skips_tool() {
        static TOOL: CountingTool = CountingTool {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let limiter = Arc::new(CountingLimiter {
            calls: AtomicUsize::new(0),
            admit: false,
        });
        let audit = Arc::new(RecordingAudit::default());

        let pipeline = pipeline_with(
            &TOOL,
            Arc::new(AllowAllAuthorizer),
            limiter,
            Arc::new(NullCache),
            audit.clone(),
            None,
        );

        let result = invoke(&pipeline, json!({}));

        assert!(result.is_error);
        assert_eq!(TOOL.calls.load(Ordering::SeqCst), 0);

        let records = audit.records.lock().unwrap();
        assert_eq!(records[0].outcome, AuditOutcome::RateLimited);
    }

    #[test]
    fn test_cache_hit_skips_tool_and_audits_success() {
        static TOOL: CountingTool = CountingTool {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let audit = Arc::new(RecordingAudit::default());
        let cache = Arc::new(ResponseCache::new(
            CacheConfig::default(),
            Arc::new(SystemClock),
        ));

        let pipeline = pipeline_with(
            &TOOL,
            Arc::new(AllowAllAuthorizer),
            Arc::new(NullRateLimiter),
            cache,
            audit.clone(),
            None,
        );

        let first = invoke(&pipeline, json!({"x": 1}));
        let second = invoke(&pipeline, json!({"x": 1}));

        assert_eq!(TOOL.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );

        let records = audit.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.outcome == AuditOutcome::Success));
    }

    #[test]
    fn test_distinct_arguments_miss_cache() {
        static TOOL: CountingTool = CountingTool {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let pipeline = pipeline_with(
            &TOOL,
            Arc::new(AllowAllAuthorizer),
            Arc::new(NullRateLimiter),
            Arc::new(ResponseCache::new(
                CacheConfig::default(),
                Arc::new(SystemClock),
            )),
            Arc::new(RecordingAudit::default()),
            None,
        );

        invoke(&pipeline, json!({"x": 1}));
        invoke(&pipeline, json!({"x": 2}));

        assert_eq!(TOOL.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_tool_failure_audits_and_wraps_message() {
        static TOOL: CountingTool = CountingTool {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        let audit = Arc::new(RecordingAudit::default());
        let cache = Arc::new(ResponseCache::new(
            CacheConfig::default(),
            Arc::new(SystemClock),
        ));

        let pipeline = pipeline_with(
            &TOOL,
            Arc::new(AllowAllAuthorizer),
            Arc::new(NullRateLimiter),
            cache.clone(),
            audit.clone(),
            None,
        );

        let result = invoke(&pipeline, json!({}));

        assert!(result.is_error);
        let text = serde_json::to_value(&result.content[0]).unwrap()["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert_eq!(text, "Error executing tool: deliberate failure");

        // Failures are not cached.
        assert_eq!(cache.len(), 0);

        let records = audit.records.lock().unwrap();
        assert_eq!(records[0].outcome, AuditOutcome::Failure);
        assert_eq!(
            records[0].error_message.as_deref(),
            Some("deliberate failure")
        );
    }

    #[test]
    fn test_audit_failure_never_breaks_the_call() {
        static TOOL: CountingTool = CountingTool {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let pipeline = pipeline_with(
            &TOOL,
            Arc::new(AllowAllAuthorizer),
            Arc::new(NullRateLimiter),
            Arc::new(NullCache),
            Arc::new(FailingAudit),
            None,
        );

        let result = invoke(&pipeline, json!({}));
        assert!(!result.is_error);
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        static TOOL: CountingTool = CountingTool {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let audit = Arc::new(RecordingAudit::default());
        let pipeline = pipeline_with(
            &TOOL,
            Arc::new(AllowAllAuthorizer),
            Arc::new(NullRateLimiter),
            Arc::new(NullCache),
            audit.clone(),
            None,
        );

        for i in 0..10 {
            invoke(&pipeline, json!({"i": i}));
        }

        let records = audit.records.lock().unwrap();
        let mut ids: Vec<&str> = records.iter().map(|r| r.correlation_id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn test_sensitive_arguments_redacted_in_audit() {
        static TOOL: CountingTool = CountingTool {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let audit = Arc::new(RecordingAudit::default());
        let pipeline = pipeline_with(
            &TOOL,
            Arc::new(AllowAllAuthorizer),
            Arc::new(NullRateLimiter),
            Arc::new(NullCache),
            audit.clone(),
            None,
        );

        invoke(&pipeline, json!({"password": "hunter2", "q": "fine"}));

        let records = audit.records.lock().unwrap();
        let sanitized = records[0].sanitized_arguments.as_ref().unwrap();
        assert_eq!(sanitized["password"], "[REDACTED]");
        assert_eq!(sanitized["q"], "fine");
    }
}
