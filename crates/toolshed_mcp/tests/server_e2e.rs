//! End-to-end dispatcher tests.
//!
//! Each test drives a full server session over in-memory streams: a list of
//! request lines goes in, every outbound line (responses and notifications)
//! comes back out for inspection.

use serde_json::{json, Value};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use toolshed_mcp::arguments::ArgumentMap;
use toolshed_mcp::audit::{AuditSink, NullAuditSink};
use toolshed_mcp::auth::{AllowAllAuthorizer, ApiKeyAuthorizer, Authorizer};
use toolshed_mcp::cache::{CacheConfig, NullCache, ResponseCache, ToolResultCache};
use toolshed_mcp::cancel::CancellationToken;
use toolshed_mcp::clock::SystemClock;
use toolshed_mcp::logsink::LogSink;
use toolshed_mcp::pipeline::ToolPipeline;
use toolshed_mcp::progress::ProgressReporter;
use toolshed_mcp::prompts::{BuiltinPromptProvider, PromptProvider};
use toolshed_mcp::protocol::ToolCallResult;
use toolshed_mcp::ratelimit::{NullRateLimiter, RateLimiter};
use toolshed_mcp::resources::{FileResourceProvider, ResourceProvider};
use toolshed_mcp::server::{McpServer, McpServerConfig};
use toolshed_mcp::tools::{Tool, ToolRegistry};
use toolshed_mcp::writer::MessageWriter;
use toolshed_mcp::JsonlAuditLogger;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn lines(&self) -> Vec<Value> {
        String::from_utf8(self.0.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }
}

/// A registrable tool that counts executions and optionally reports
/// progress.
struct FakeTool {
    calls: Arc<AtomicUsize>,
    report_progress: bool,
}

impl Tool for FakeTool {
    fn name(&self) -> &'static str {
        "fake"
    }
    fn description(&self) -> &'static str {
        "test fixture"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    fn execute(
        &self,
        _args: &ArgumentMap,
        progress: &ProgressReporter,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<ToolCallResult> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.report_progress {
            progress.report_with_total(1.0, 2.0);
            progress.report_with_total(2.0, 2.0);
        }
        Ok(ToolCallResult::text(format!("run {}", n)))
    }
}

struct CountingLimiter {
    calls: Arc<AtomicUsize>,
}

impl RateLimiter for CountingLimiter {
    fn try_acquire(&self, _tool: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        true
    }
}

struct ServerParts {
    registry: ToolRegistry,
    authorizer: Arc<dyn Authorizer>,
    limiter: Arc<dyn RateLimiter>,
    cache: Arc<dyn ToolResultCache>,
    audit: Arc<dyn AuditSink>,
    credential: Option<String>,
    resources: Vec<Box<dyn ResourceProvider>>,
}

impl Default for ServerParts {
    fn default() -> Self {
        Self {
            registry: ToolRegistry::with_builtins(vec![]),
            authorizer: Arc::new(AllowAllAuthorizer),
            limiter: Arc::new(NullRateLimiter),
            cache: Arc::new(NullCache),
            audit: Arc::new(NullAuditSink),
            credential: None,
            resources: vec![],
        }
    }
}

fn build_server(parts: ServerParts) -> McpServer {
    let logsink = Arc::new(LogSink::default());
    let pipeline = ToolPipeline::new(
        parts.registry,
        parts.authorizer,
        parts.limiter,
        parts.cache,
        parts.audit,
        logsink.clone(),
        parts.credential.as_deref(),
        HashSet::new(),
    );
    let prompts: Vec<Box<dyn PromptProvider>> = vec![Box::new(BuiltinPromptProvider)];
    McpServer::with_parts(
        McpServerConfig::default(),
        pipeline,
        logsink,
        parts.resources,
        prompts,
    )
}

/// Feed request lines to a fresh session, return every outbound line.
fn run_session(server: &mut McpServer, requests: &[Value]) -> Vec<Value> {
    let input: String = requests
        .iter()
        .map(|v| format!("{}\n", v))
        .collect();
    let buf = SharedBuf::default();
    server
        .serve(Cursor::new(input), MessageWriter::new(buf.clone()))
        .unwrap();
    buf.lines()
}

fn response_for(lines: &[Value], id: i64) -> Value {
    let matches: Vec<&Value> = lines
        .iter()
        .filter(|l| l.get("id").map(|v| v == &json!(id)).unwrap_or(false))
        .collect();
    assert_eq!(matches.len(), 1, "expected exactly one response for id {}", id);
    matches[0].clone()
}

fn initialize_request(id: i64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "clientInfo": {"name": "t", "version": "1"}
        }
    })
}

fn tool_text(response: &Value) -> String {
    response["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .to_string()
}

// ============================================================================
// Scenario 1: Handshake gate
// ============================================================================

#[test]
fn handshake_gate_rejects_before_initialize() {
    let mut server = build_server(ServerParts::default());
    let lines = run_session(
        &mut server,
        &[json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})],
    );

    let response = response_for(&lines, 1);
    assert_eq!(response["error"]["code"], -32600);
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("not initialized"));
}

#[test]
fn handshake_gate_exempts_ping() {
    let mut server = build_server(ServerParts::default());
    let lines = run_session(
        &mut server,
        &[json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})],
    );

    let response = response_for(&lines, 1);
    assert_eq!(response["result"], json!({}));
}

// ============================================================================
// Scenario 2: Initialize + ping
// ============================================================================

#[test]
fn initialize_reports_capabilities_then_ping() {
    let mut server = build_server(ServerParts::default());
    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
        ],
    );

    let init = response_for(&lines, 1);
    assert_eq!(init["result"]["protocolVersion"], "2024-11-05");
    assert!(init["result"]["capabilities"]["tools"].is_object());
    assert!(init["result"]["capabilities"]["logging"].is_object());

    let ping = response_for(&lines, 2);
    assert_eq!(ping["result"], json!({}));
}

#[test]
fn repeated_initialize_is_idempotent() {
    let mut server = build_server(ServerParts::default());
    let lines = run_session(&mut server, &[initialize_request(1), initialize_request(2)]);

    let first = response_for(&lines, 1);
    let second = response_for(&lines, 2);
    assert_eq!(first["result"]["capabilities"], second["result"]["capabilities"]);
}

// ============================================================================
// Scenario 3: Unauthorized is audited, not rate-limited
// ============================================================================

#[test]
fn unauthorized_is_audited_but_not_rate_limited() {
    let temp = TempDir::new().unwrap();
    let limiter_calls = Arc::new(AtomicUsize::new(0));
    let tool_calls = Arc::new(AtomicUsize::new(0));

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(FakeTool {
        calls: tool_calls.clone(),
        report_progress: false,
    }));

    let mut server = build_server(ServerParts {
        registry,
        // Authentication required, no credential in the environment.
        authorizer: Arc::new(ApiKeyAuthorizer::new(true, vec![])),
        limiter: Arc::new(CountingLimiter {
            calls: limiter_calls.clone(),
        }),
        audit: Arc::new(JsonlAuditLogger::new(temp.path().to_path_buf(), 30)),
        ..Default::default()
    });

    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {"name": "fake", "arguments": {}}
            }),
        ],
    );

    let response = response_for(&lines, 2);
    assert_eq!(response["result"]["isError"], true);

    assert_eq!(limiter_calls.load(Ordering::SeqCst), 0);
    assert_eq!(tool_calls.load(Ordering::SeqCst), 0);

    let audit_file = std::fs::read_dir(temp.path())
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let content = std::fs::read_to_string(audit_file).unwrap();
    let records: Vec<Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["outcome"], "Unauthorized");
}

// ============================================================================
// Scenario 4: Cache hit skips the tool
// ============================================================================

#[test]
fn cache_hit_skips_tool_execution() {
    let tool_calls = Arc::new(AtomicUsize::new(0));
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(FakeTool {
        calls: tool_calls.clone(),
        report_progress: false,
    }));

    let cache = ResponseCache::new(
        CacheConfig {
            max_entries: 100,
            default_ttl_secs: 0,
            ttl_overrides: [("fake".to_string(), 60)].into_iter().collect(),
        },
        Arc::new(SystemClock),
    );

    let mut server = build_server(ServerParts {
        registry,
        cache: Arc::new(cache),
        ..Default::default()
    });

    let call = |id: i64| {
        json!({
            "jsonrpc": "2.0", "id": id, "method": "tools/call",
            "params": {"name": "fake", "arguments": {"x": 1}}
        })
    };
    let lines = run_session(&mut server, &[initialize_request(1), call(2), call(3)]);

    assert_eq!(tool_calls.load(Ordering::SeqCst), 1);

    let first = response_for(&lines, 2);
    let second = response_for(&lines, 3);
    assert_eq!(first["result"]["content"], second["result"]["content"]);
}

// ============================================================================
// Scenario 6: Path-traversal defense
// ============================================================================

#[test]
fn prefix_sibling_directory_is_denied() {
    let temp = TempDir::new().unwrap();
    let allowed = temp.path().join("allowed");
    let evil = temp.path().join("allowedEvil");
    std::fs::create_dir(&allowed).unwrap();
    std::fs::create_dir(&evil).unwrap();
    std::fs::write(evil.join("secret.txt"), "secret").unwrap();

    let mut server = build_server(ServerParts {
        resources: vec![Box::new(FileResourceProvider::new(vec![allowed]))],
        ..Default::default()
    });

    let uri = format!(
        "file://{}/secret.txt",
        evil.canonicalize().unwrap().display()
    );
    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "resources/read",
                "params": {"uri": uri}
            }),
        ],
    );

    let response = response_for(&lines, 2);
    assert_eq!(response["error"]["code"], -32602);
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Access denied"));
}

#[test]
fn listed_resources_read_back() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("hello.txt"), "hello resources").unwrap();

    let mut server = build_server(ServerParts {
        resources: vec![Box::new(FileResourceProvider::new(vec![temp
            .path()
            .to_path_buf()]))],
        ..Default::default()
    });

    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({"jsonrpc": "2.0", "id": 2, "method": "resources/list"}),
        ],
    );
    let listed = response_for(&lines, 2);
    let uri = listed["result"]["resources"][0]["uri"].as_str().unwrap();

    let mut server2 = build_server(ServerParts {
        resources: vec![Box::new(FileResourceProvider::new(vec![temp
            .path()
            .to_path_buf()]))],
        ..Default::default()
    });
    let lines = run_session(
        &mut server2,
        &[
            initialize_request(1),
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "resources/read",
                "params": {"uri": uri}
            }),
        ],
    );
    let read = response_for(&lines, 2);
    assert_eq!(read["result"]["contents"][0]["text"], "hello resources");
}

// ============================================================================
// Protocol invariants
// ============================================================================

#[test]
fn notifications_never_get_responses() {
    let mut server = build_server(ServerParts::default());
    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "method": "notifications/whatever"}),
        ],
    );

    // Only the initialize response comes back.
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["id"], 1);
}

#[test]
fn malformed_json_yields_parse_error_with_null_id() {
    let mut server = build_server(ServerParts::default());
    let buf = SharedBuf::default();
    server
        .serve(
            Cursor::new("{not json}\n".to_string()),
            MessageWriter::new(buf.clone()),
        )
        .unwrap();

    let lines = buf.lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["error"]["code"], -32700);
    assert_eq!(lines[0]["id"], Value::Null);
}

#[test]
fn json_without_method_is_invalid_request() {
    let mut server = build_server(ServerParts::default());
    let lines = run_session(&mut server, &[json!({"jsonrpc": "2.0", "id": 7})]);

    let response = response_for(&lines, 7);
    assert_eq!(response["error"]["code"], -32600);
}

#[test]
fn unknown_method_is_method_not_found() {
    let mut server = build_server(ServerParts::default());
    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/destroy"}),
        ],
    );

    let response = response_for(&lines, 2);
    assert_eq!(response["error"]["code"], -32601);
}

#[test]
fn unknown_tool_is_method_not_found() {
    let mut server = build_server(ServerParts::default());
    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {"name": "no_such_tool"}
            }),
        ],
    );

    let response = response_for(&lines, 2);
    assert_eq!(response["error"]["code"], -32601);
}

#[test]
fn string_request_ids_echo_back() {
    let mut server = build_server(ServerParts::default());
    let lines = run_session(
        &mut server,
        &[json!({"jsonrpc": "2.0", "id": "req-a", "method": "ping"})],
    );

    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["id"], "req-a");
}

// ============================================================================
// Progress and logging notifications
// ============================================================================

#[test]
fn progress_token_produces_progress_notifications() {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(FakeTool {
        calls: Arc::new(AtomicUsize::new(0)),
        report_progress: true,
    }));

    let mut server = build_server(ServerParts {
        registry,
        ..Default::default()
    });

    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {
                    "name": "fake",
                    "arguments": {},
                    "_meta": {"progressToken": "tok-1"}
                }
            }),
        ],
    );

    let progress: Vec<&Value> = lines
        .iter()
        .filter(|l| l["method"] == "notifications/progress")
        .collect();
    assert_eq!(progress.len(), 2);
    assert_eq!(progress[0]["params"]["progressToken"], "tok-1");
    assert_eq!(progress[1]["params"]["total"], 2.0);

    // The call itself still resolves normally.
    let response = response_for(&lines, 2);
    assert_eq!(tool_text(&response), "run 1");
}

#[test]
fn without_progress_token_no_notifications() {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(FakeTool {
        calls: Arc::new(AtomicUsize::new(0)),
        report_progress: true,
    }));

    let mut server = build_server(ServerParts {
        registry,
        ..Default::default()
    });

    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {"name": "fake", "arguments": {}}
            }),
        ],
    );

    assert!(lines
        .iter()
        .all(|l| l["method"] != "notifications/progress"));
}

#[test]
fn set_level_controls_forwarded_log_records() {
    // Authentication required with no credential: the datetime call below
    // is denied, and the pipeline logs the denial at warning.
    let mut server = build_server(ServerParts {
        authorizer: Arc::new(ApiKeyAuthorizer::new(true, vec![])),
        ..Default::default()
    });

    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "logging/setLevel",
                "params": {"level": "warning"}
            }),
            json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "datetime", "arguments": {"action": "now"}}
            }),
        ],
    );

    assert_eq!(response_for(&lines, 2)["result"], json!({}));

    // The unauthorized call logs at warning; it must be forwarded.
    let messages: Vec<&Value> = lines
        .iter()
        .filter(|l| l["method"] == "notifications/message")
        .collect();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["params"]["level"], "warning");
    assert!(messages[0]["params"]["data"]
        .as_str()
        .unwrap()
        .contains("Unauthorized"));
}

#[test]
fn invalid_log_level_is_invalid_params() {
    let mut server = build_server(ServerParts::default());
    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "logging/setLevel",
                "params": {"level": "chatty"}
            }),
        ],
    );

    let response = response_for(&lines, 2);
    assert_eq!(response["error"]["code"], -32602);
}

// ============================================================================
// Prompts
// ============================================================================

#[test]
fn prompts_list_and_get() {
    let mut server = build_server(ServerParts::default());
    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({"jsonrpc": "2.0", "id": 2, "method": "prompts/list"}),
            json!({
                "jsonrpc": "2.0", "id": 3, "method": "prompts/get",
                "params": {
                    "name": "explain-error",
                    "arguments": {"error": "it broke"}
                }
            }),
        ],
    );

    let listed = response_for(&lines, 2);
    assert!(listed["result"]["prompts"].as_array().unwrap().len() >= 3);

    let got = response_for(&lines, 3);
    assert_eq!(got["result"]["messages"][0]["role"], "user");
    assert!(got["result"]["messages"][0]["content"]["text"]
        .as_str()
        .unwrap()
        .contains("it broke"));
}

#[test]
fn prompt_missing_required_argument_is_invalid_params() {
    let mut server = build_server(ServerParts::default());
    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "prompts/get",
                "params": {"name": "explain-error"}
            }),
        ],
    );

    assert_eq!(response_for(&lines, 2)["error"]["code"], -32602);
}

#[test]
fn unknown_prompt_is_method_not_found() {
    let mut server = build_server(ServerParts::default());
    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "prompts/get",
                "params": {"name": "mystery"}
            }),
        ],
    );

    assert_eq!(response_for(&lines, 2)["error"]["code"], -32601);
}

// ============================================================================
// Built-in tools through the full stack
// ============================================================================

#[test]
fn datetime_tool_round_trip() {
    let mut server = build_server(ServerParts::default());
    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {
                    "name": "text",
                    "arguments": {"action": "uppercase", "text": "mcp"}
                }
            }),
        ],
    );

    let response = response_for(&lines, 2);
    assert_eq!(tool_text(&response), "MCP");
}

#[test]
fn tools_list_contains_builtins_with_schemas() {
    let mut server = build_server(ServerParts::default());
    let lines = run_session(
        &mut server,
        &[
            initialize_request(1),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        ],
    );

    let tools = response_for(&lines, 2)["result"]["tools"]
        .as_array()
        .unwrap()
        .clone();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"datetime"));
    assert!(names.contains(&"text"));
    for tool in &tools {
        assert_eq!(tool["inputSchema"]["type"], "object");
    }
}
