//! MCP Server - Dispatcher and Protocol State Machine
//!
//! JSON-RPC 2.0 server over stdio for the Model Context Protocol.
//!
//! # Architecture
//!
//! One reader loop consumes stdin lines serially. Protocol methods are
//! handled inline; tools/call requests are queued to a dedicated executor
//! thread that runs the invocation pipeline and answers through the shared
//! writer, so slow tools never block the reader. All outbound lines
//! (responses, log notifications, progress notifications) are serialized
//! through one [`MessageWriter`].
//!
//! # State Machine
//!
//! `Uninitialized` → (initialize) → `Initialized` → (stdin EOF or cancel) →
//! shutdown. Until the handshake completes, every method except
//! `initialize`, `ping` and `notifications/initialized` is rejected with
//! InvalidRequest.
//!
//! # Example
//!
//! ```ignore
//! let config = McpServerConfig::default();
//! let mut server = McpServer::new(config)?;
//! server.run()?; // Blocking, no async runtime required
//! ```

use crate::arguments::{normalize_arguments, ArgumentMap};
use crate::audit::{AuditSink, JsonlAuditLogger, NullAuditSink};
use crate::auth::{AllowAllAuthorizer, ApiKeyAuthorizer, Authorizer, Identity};
use crate::cache::{CacheConfig, NullCache, ResponseCache, ToolResultCache};
use crate::cancel::CancellationToken;
use crate::clock::SystemClock;
use crate::logsink::{LogLevel, LogSink};
use crate::pipeline::ToolPipeline;
use crate::progress::ProgressReporter;
use crate::prompts::{BuiltinPromptProvider, PromptError, PromptProvider};
use crate::protocol::{
    methods, ErrorCode, InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    PromptsGetParams, PromptsListResult, RequestId, ResourcesListResult, ResourcesReadParams,
    ResourcesReadResult, ServerCapabilities, ServerInfo, SetLevelParams, ToolCallParams,
    ToolDefinition, ToolsListResult, JSONRPC_VERSION, MCP_PROTOCOL_VERSION,
};
use crate::ratelimit::{BucketConfig, NullRateLimiter, RateLimiter, TokenBucketLimiter};
use crate::resources::{FileResourceProvider, ResourceError, ResourceProvider};
use crate::tools::ToolRegistry;
use crate::writer::MessageWriter;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Audit subsystem settings.
#[derive(Debug, Clone)]
pub struct AuditSettings {
    /// Directory holding the per-day JSONL files.
    pub directory: PathBuf,

    /// Day files older than this (by mtime) are deleted on first write.
    pub retention_days: u64,

    /// Additional argument keys to redact, on top of the fixed set.
    pub extra_sensitive_keys: Vec<String>,
}

/// Authorization subsystem settings.
#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
    /// Whether a missing credential resolves to the denied sentinel.
    pub require_authentication: bool,

    /// The configured API-key identities.
    pub identities: Vec<Identity>,
}

/// MCP Server configuration
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Server name (reported in initialize)
    pub server_name: String,

    /// Server version (reported in initialize)
    pub server_version: String,

    /// Allowlisted roots served by the filesystem resource provider
    pub allowed_roots: Vec<PathBuf>,

    /// Environment variables the environment tool may read
    pub env_allowlist: Vec<String>,

    /// Initial log-sink forwarding threshold
    pub initial_log_level: LogLevel,

    /// Response cache settings; None disables caching
    pub cache: Option<CacheConfig>,

    /// Per-tool rate-limit buckets; None disables rate limiting
    pub rate_limits: Option<std::collections::HashMap<String, BucketConfig>>,

    /// Audit settings; None disables auditing
    pub audit: Option<AuditSettings>,

    /// Authorization settings; None disables authentication
    pub auth: Option<AuthSettings>,

    /// Session credential, read once from the environment at startup
    pub credential: Option<String>,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let toolshed_dir = home.join(".toolshed");

        Self {
            server_name: "toolshed-mcp".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            allowed_roots: vec![std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))],
            env_allowlist: Vec::new(),
            initial_log_level: LogLevel::Warning,
            cache: Some(CacheConfig::default()),
            rate_limits: None,
            audit: Some(AuditSettings {
                directory: toolshed_dir.join("audit"),
                retention_days: 30,
                extra_sensitive_keys: Vec::new(),
            }),
            auth: None,
            credential: None,
        }
    }
}

/// One queued tools/call, handed from the reader to the executor thread.
struct ToolCallJob {
    id: Option<RequestId>,
    name: String,
    arguments: ArgumentMap,
    progress_token: Option<String>,
}

/// MCP Server
///
/// Owns the invocation pipeline, the provider lists and the protocol state.
/// The pipeline and providers are immutable after startup and shared with
/// the executor thread; the handshake flag belongs to the reader loop
/// alone. Tool calls execute serially on the executor in arrival order,
/// while the reader keeps consuming lines.
pub struct McpServer {
    config: McpServerConfig,
    pipeline: Arc<ToolPipeline>,
    logsink: Arc<LogSink>,
    resources: Arc<Vec<Box<dyn ResourceProvider>>>,
    prompts: Arc<Vec<Box<dyn PromptProvider>>>,
    /// Snapshot served by tools/list; computed once at startup.
    tool_definitions: Vec<ToolDefinition>,
    initialized: bool,
    cancel: CancellationToken,
    /// Job channel into the executor; present only while serving.
    job_tx: Option<Sender<ToolCallJob>>,
}

impl McpServer {
    /// Create a new MCP server, assembling subsystems from config.
    pub fn new(config: McpServerConfig) -> Result<Self> {
        let logsink = Arc::new(LogSink::new(config.initial_log_level));

        let registry = ToolRegistry::with_builtins(config.env_allowlist.clone());

        let authorizer: Arc<dyn Authorizer> = match &config.auth {
            Some(auth) => Arc::new(ApiKeyAuthorizer::new(
                auth.require_authentication,
                auth.identities.clone(),
            )),
            None => Arc::new(AllowAllAuthorizer),
        };

        let limiter: Arc<dyn RateLimiter> = match &config.rate_limits {
            Some(buckets) => Arc::new(TokenBucketLimiter::new(
                buckets.clone(),
                Arc::new(SystemClock),
            )),
            None => Arc::new(NullRateLimiter),
        };

        let cache: Arc<dyn ToolResultCache> = match &config.cache {
            Some(cache_config) => Arc::new(ResponseCache::new(
                cache_config.clone(),
                Arc::new(SystemClock),
            )),
            None => Arc::new(NullCache),
        };

        let (audit, extra_sensitive): (Arc<dyn AuditSink>, HashSet<String>) = match &config.audit
        {
            Some(audit) => (
                Arc::new(JsonlAuditLogger::new(
                    audit.directory.clone(),
                    audit.retention_days,
                )),
                audit.extra_sensitive_keys.iter().cloned().collect(),
            ),
            None => (Arc::new(NullAuditSink), HashSet::new()),
        };

        let pipeline = ToolPipeline::new(
            registry,
            authorizer,
            limiter,
            cache,
            audit,
            logsink.clone(),
            config.credential.as_deref(),
            extra_sensitive,
        );

        let resources: Vec<Box<dyn ResourceProvider>> = vec![Box::new(
            FileResourceProvider::new(config.allowed_roots.clone()),
        )];
        let prompts: Vec<Box<dyn PromptProvider>> = vec![Box::new(BuiltinPromptProvider)];

        Ok(Self::with_parts(config, pipeline, logsink, resources, prompts))
    }

    /// Assemble a server from pre-built parts. Used by tests to inject
    /// mocks for the cross-cutting subsystems.
    pub fn with_parts(
        config: McpServerConfig,
        pipeline: ToolPipeline,
        logsink: Arc<LogSink>,
        resources: Vec<Box<dyn ResourceProvider>>,
        prompts: Vec<Box<dyn PromptProvider>>,
    ) -> Self {
        let tool_definitions = pipeline.registry().definitions();
        Self {
            config,
            pipeline: Arc::new(pipeline),
            logsink,
            resources: Arc::new(resources),
            prompts: Arc::new(prompts),
            tool_definitions,
            initialized: false,
            cancel: CancellationToken::new(),
            job_tx: None,
        }
    }

    /// The process-wide cancellation token. Install it on SIGINT to abort
    /// the reader loop and signal in-flight tools.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the server over stdin/stdout (blocking, no async runtime).
    pub fn run(&mut self) -> Result<()> {
        let stdin = std::io::stdin();
        let writer = MessageWriter::new(std::io::stdout());
        self.serve(stdin.lock(), writer)
    }

    /// Run the server over arbitrary streams. Returns on EOF or cancel.
    pub fn serve(&mut self, reader: impl BufRead, writer: MessageWriter) -> Result<()> {
        info!("MCP server starting");

        let executor = self.spawn_executor(&writer)?;

        for line in reader.lines() {
            if self.cancel.is_cancelled() {
                info!("Cancellation requested, stopping reader loop");
                break;
            }

            let line = line.context("Failed to read from input stream")?;
            if line.trim().is_empty() {
                continue;
            }

            debug!("Received: {}", line);
            self.handle_line(&line, &writer);
        }

        // Close the job channel, then let queued tool calls finish and
        // flush their responses.
        self.job_tx = None;
        let _ = executor.join();

        info!("MCP server shutting down");
        Ok(())
    }

    /// Spawn the tool executor for this session. Jobs run serially in
    /// arrival order; each writes its own response.
    fn spawn_executor(&mut self, writer: &MessageWriter) -> Result<JoinHandle<()>> {
        let (tx, rx) = mpsc::channel::<ToolCallJob>();
        self.job_tx = Some(tx);

        let pipeline = self.pipeline.clone();
        let writer = writer.clone();
        let cancel = self.cancel.clone();

        std::thread::Builder::new()
            .name("tool-executor".to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    let progress =
                        ProgressReporter::for_call(job.progress_token.as_deref(), &writer);
                    let result = pipeline.invoke(&job.name, &job.arguments, &progress, &cancel);
                    let response = JsonRpcResponse::ok(
                        job.id,
                        serde_json::to_value(result).unwrap_or(Value::Null),
                    );
                    if let Err(e) = write_json_response(&writer, &response) {
                        error!("Failed to write tool response: {}", e);
                    }
                }
            })
            .context("Failed to spawn tool executor thread")
    }

    fn handle_line(&mut self, line: &str, writer: &MessageWriter) {
        // Structurally bad JSON is a parse error with a null id.
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                self.write_response(
                    writer,
                    JsonRpcResponse::failure(
                        None,
                        ErrorCode::ParseError, format!("Parse error: {}", e),
                    ),
                );
                return;
            }
        };

        // Well-formed JSON that is not a request (missing method, wrong
        // shape) is an invalid request; echo the id when one is present.
        let id = value
            .get("id")
            .cloned()
            .and_then(|id| serde_json::from_value::<RequestId>(id).ok());
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                self.write_response(
                    writer,
                    JsonRpcResponse::failure(
                        id,
                        ErrorCode::InvalidRequest, format!("Invalid request: {}", e),
                    ),
                );
                return;
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            self.write_response(
                writer,
                JsonRpcResponse::failure(
                    request.id,
                    ErrorCode::InvalidRequest,
                    format!("Invalid JSON-RPC version: {}", request.jsonrpc),
                ),
            );
            return;
        }

        if request.is_notification() {
            self.handle_notification(request);
            return;
        }

        if let Some(response) = self.handle_request(request, writer) {
            self.write_response(writer, response);
        }
    }

    /// Notifications never produce a response.
    fn handle_notification(&self, request: JsonRpcRequest) {
        match request.method.as_str() {
            methods::INITIALIZED => info!("Client reported initialization complete"),
            other => debug!("Ignoring notification: {}", other),
        }
    }

    /// Route one request. Returns None when a worker thread owns the
    /// response.
    fn handle_request(
        &mut self,
        request: JsonRpcRequest,
        writer: &MessageWriter,
    ) -> Option<JsonRpcResponse> {
        match request.method.as_str() {
            methods::INITIALIZE => Some(self.handle_initialize(request, writer)),
            methods::PING => Some(JsonRpcResponse::ok(
                request.id,
                Value::Object(Default::default()),
            )),

            methods::TOOLS_LIST
            | methods::TOOLS_CALL
            | methods::RESOURCES_LIST
            | methods::RESOURCES_READ
            | methods::PROMPTS_LIST
            | methods::PROMPTS_GET
            | methods::LOGGING_SET_LEVEL
                if !self.initialized =>
            {
                Some(JsonRpcResponse::failure(
                    request.id,
                    ErrorCode::InvalidRequest,
                    "Server not initialized. Send 'initialize' request first.",
                ))
            }

            methods::TOOLS_LIST => Some(JsonRpcResponse::ok(
                request.id,
                serde_json::to_value(ToolsListResult {
                    tools: self.tool_definitions.clone(),
                })
                .unwrap_or(Value::Null),
            )),
            methods::TOOLS_CALL => self.handle_tools_call(request),
            methods::RESOURCES_LIST => Some(self.handle_resources_list(request)),
            methods::RESOURCES_READ => Some(self.handle_resources_read(request)),
            methods::PROMPTS_LIST => Some(self.handle_prompts_list(request)),
            methods::PROMPTS_GET => Some(self.handle_prompts_get(request)),
            methods::LOGGING_SET_LEVEL => Some(self.handle_set_level(request)),

            other => Some(JsonRpcResponse::failure(
                request.id,
                ErrorCode::MethodNotFound, format!("Unknown method: {}", other),
            )),
        }
    }

    /// Handle initialize. Repeated initialization is idempotent.
    fn handle_initialize(
        &mut self,
        request: JsonRpcRequest,
        writer: &MessageWriter,
    ) -> JsonRpcResponse {
        let params: InitializeParams = match request.params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::failure(
                        request.id,
                        ErrorCode::InvalidParams,
                        format!("Invalid initialize params: {}", e),
                    );
                }
            },
            None => {
                return JsonRpcResponse::failure(
                    request.id,
                    ErrorCode::InvalidParams, "Missing initialize params",
                );
            }
        };

        info!(
            "Initialize from {} v{} (protocol {})",
            params.client_info.name, params.client_info.version, params.protocol_version
        );

        // The sink may forward logs only once the client is there to
        // receive them.
        self.logsink.attach_writer(writer.clone());
        self.initialized = true;

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::advertised(),
            server_info: ServerInfo {
                name: self.config.server_name.clone(),
                version: self.config.server_version.clone(),
            },
        };

        JsonRpcResponse::ok(
            request.id,
            serde_json::to_value(result).unwrap_or(Value::Null),
        )
    }

    /// Handle tools/call: parse inline, then queue the pipeline run to the
    /// executor thread, which writes the response itself.
    fn handle_tools_call(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id;

        let params: ToolCallParams = match request.params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return Some(JsonRpcResponse::failure(
                        id,
                        ErrorCode::InvalidParams,
                        format!("Invalid tool call params: {}", e),
                    ));
                }
            },
            None => {
                return Some(JsonRpcResponse::failure(
                    id,
                    ErrorCode::InvalidParams, "Missing tool call params",
                ));
            }
        };

        if !self.pipeline.registry().has_tool(&params.name) {
            return Some(JsonRpcResponse::failure(
                id,
                ErrorCode::MethodNotFound,
                format!("Unknown tool: {}", params.name),
            ));
        }

        let arguments: ArgumentMap = match params.arguments {
            Some(Value::Object(map)) => normalize_arguments(&map),
            Some(Value::Null) | None => ArgumentMap::new(),
            Some(_) => {
                return Some(JsonRpcResponse::failure(
                    id,
                    ErrorCode::InvalidParams, "Tool arguments must be an object",
                ));
            }
        };

        let job = ToolCallJob {
            id: id.clone(),
            name: params.name,
            arguments,
            progress_token: params
                .meta
                .as_ref()
                .and_then(|meta| meta.progress_token.clone()),
        };

        match self.job_tx.as_ref().map(|tx| tx.send(job)) {
            Some(Ok(())) => None,
            _ => {
                warn!("Tool executor unavailable");
                Some(JsonRpcResponse::failure(
                    id,
                    ErrorCode::InternalError, "Failed to schedule tool call",
                ))
            }
        }
    }

    fn handle_resources_list(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let resources = self
            .resources
            .iter()
            .flat_map(|provider| provider.list_resources())
            .collect();
        JsonRpcResponse::ok(
            request.id,
            serde_json::to_value(ResourcesListResult { resources }).unwrap_or(Value::Null),
        )
    }

    fn handle_resources_read(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let params: ResourcesReadParams = match request
            .params
            .ok_or(())
            .and_then(|p| serde_json::from_value(p).map_err(|_| ()))
        {
            Ok(params) => params,
            Err(()) => {
                return JsonRpcResponse::failure(
                    request.id,
                    ErrorCode::InvalidParams, "Missing resource URI",
                );
            }
        };

        let provider = self.resources.iter().find(|p| p.can_handle(&params.uri));
        let provider = match provider {
            Some(provider) => provider,
            None => {
                return JsonRpcResponse::failure(
                    request.id,
                    ErrorCode::MethodNotFound,
                    format!("Unsupported URI scheme: {}", params.uri),
                );
            }
        };

        match provider.read_resource(&params.uri) {
            Ok(contents) => JsonRpcResponse::ok(
                request.id,
                serde_json::to_value(ResourcesReadResult {
                    contents: vec![contents],
                })
                .unwrap_or(Value::Null),
            ),
            Err(e @ (ResourceError::NotFound(_)
            | ResourceError::AccessDenied(_)
            | ResourceError::InvalidUri(_))) => JsonRpcResponse::failure(
                request.id,
                ErrorCode::InvalidParams, e.to_string(),
            ),
            Err(e) => JsonRpcResponse::failure(
                request.id,
                ErrorCode::InternalError, e.to_string(),
            ),
        }
    }

    fn handle_prompts_list(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let prompts = self
            .prompts
            .iter()
            .flat_map(|provider| provider.list_prompts())
            .collect();
        JsonRpcResponse::ok(
            request.id,
            serde_json::to_value(PromptsListResult { prompts }).unwrap_or(Value::Null),
        )
    }

    fn handle_prompts_get(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let params: PromptsGetParams = match request
            .params
            .ok_or(())
            .and_then(|p| serde_json::from_value(p).map_err(|_| ()))
        {
            Ok(params) => params,
            Err(()) => {
                return JsonRpcResponse::failure(
                    request.id,
                    ErrorCode::InvalidParams, "Missing prompt name",
                );
            }
        };

        let provider = self.prompts.iter().find(|p| p.can_handle(&params.name));
        let provider = match provider {
            Some(provider) => provider,
            None => {
                return JsonRpcResponse::failure(
                    request.id,
                    ErrorCode::MethodNotFound,
                    format!("Unknown prompt: {}", params.name),
                );
            }
        };

        let arguments = params.arguments.unwrap_or_default();
        match provider.get_prompt(&params.name, &arguments) {
            Ok(result) => JsonRpcResponse::ok(
                request.id,
                serde_json::to_value(result).unwrap_or(Value::Null),
            ),
            Err(e @ PromptError::UnknownPrompt(_)) => JsonRpcResponse::failure(
                request.id,
                ErrorCode::MethodNotFound, e.to_string(),
            ),
            Err(e @ PromptError::MissingArgument { .. }) => JsonRpcResponse::failure(
                request.id,
                ErrorCode::InvalidParams, e.to_string(),
            ),
        }
    }

    fn handle_set_level(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let params: SetLevelParams = match request
            .params
            .ok_or(())
            .and_then(|p| serde_json::from_value(p).map_err(|_| ()))
        {
            Ok(params) => params,
            Err(()) => {
                return JsonRpcResponse::failure(
                    request.id,
                    ErrorCode::InvalidParams, "Missing log level",
                );
            }
        };

        match params.level.parse::<LogLevel>() {
            Ok(level) => {
                self.logsink.set_level(level);
                info!("Log forwarding threshold set to {}", level);
                JsonRpcResponse::ok(request.id, Value::Object(Default::default()))
            }
            Err(()) => JsonRpcResponse::failure(
                request.id,
                ErrorCode::InvalidParams,
                format!("Invalid log level: {}", params.level),
            ),
        }
    }

    fn write_response(&self, writer: &MessageWriter, response: JsonRpcResponse) {
        if let Err(e) = write_json_response(writer, &response) {
            error!("Failed to write response: {}", e);
        }
    }
}

fn write_json_response(writer: &MessageWriter, response: &JsonRpcResponse) -> Result<()> {
    let value = serde_json::to_value(response)?;
    writer.write_json(&value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = McpServerConfig::default();
        assert_eq!(config.server_name, "toolshed-mcp");
        assert_eq!(config.initial_log_level, LogLevel::Warning);
        assert!(config.cache.is_some());
        assert!(config.auth.is_none());
    }

    #[test]
    fn test_server_assembles_from_default_config() {
        let mut config = McpServerConfig::default();
        // Keep the default audit directory out of unit tests.
        config.audit = None;
        let server = McpServer::new(config).unwrap();

        assert!(!server.tool_definitions.is_empty());
        assert!(server.pipeline.registry().has_tool("datetime"));
        assert!(server.pipeline.identity().is_none());
    }
}
