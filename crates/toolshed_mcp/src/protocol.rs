//! Wire types for the MCP dialect of JSON-RPC 2.0.
//!
//! Every message is a single JSON object on its own `\n`-terminated line;
//! there is no length framing. Inbound objects carrying an `id` are
//! requests and get exactly one response with that `id` echoed back;
//! objects without an `id` are notifications and never get a response.
//! Outbound, the server emits responses plus two notification kinds of its
//! own (`notifications/message` and `notifications/progress`), interleaved
//! on the same stream.
//!
//! A response holds either `result` or `error`, never both. Protocol-level
//! failures (unparseable line, unknown method, bad params) use the `error`
//! member; a tool that fails reports through a successful response whose
//! result has `isError: true`, so the host can hand the failure text to
//! the model like any other tool output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The fixed `jsonrpc` member value.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision advertised in the initialize result.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// One decoded inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always the literal "2.0".
    pub jsonrpc: String,

    /// Echoed verbatim on the response. Absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    /// Dispatch key, e.g. "tools/call".
    pub method: String,

    /// Method-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// True if this is a notification (no id, no response expected).
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// One outbound response line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always the literal "2.0".
    pub jsonrpc: String,

    /// Mirror of the request id. Null only on parse errors, where no id
    /// could be recovered from the line.
    pub id: Option<RequestId>,

    /// Success payload; absent when `error` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Protocol failure; absent when `result` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// A successful response carrying `result`.
    pub fn ok(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// A protocol-level failure carrying `error`.
    pub fn failure(id: Option<RequestId>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code: code.value(),
                message: message.into(),
            }),
        }
    }
}

/// A request id. JSON-RPC allows either a number or a string; whichever
/// arrives is what goes back out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric wire code, see [`ErrorCode`].
    pub code: i32,

    /// Explanation suitable for the client log.
    pub message: String,
}

/// The protocol error conditions this server produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The line was not valid JSON (-32700)
    ParseError,
    /// Valid JSON that is not a usable request, or a gated method before
    /// the handshake (-32600)
    InvalidRequest,
    /// Unknown method, tool, prompt, or URI scheme (-32601)
    MethodNotFound,
    /// Malformed or missing params, bad level, missing prompt argument,
    /// resource not found or denied (-32602)
    InvalidParams,
    /// Unexpected provider failure (-32603)
    InternalError,
}

impl ErrorCode {
    /// Numeric wire code.
    pub fn value(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }
}

// ============================================================================
// MCP payloads
// ============================================================================

/// Params of the initialize request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Highest protocol revision the client speaks.
    pub protocol_version: String,

    /// Client capabilities (opaque; the server does not act on them)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,

    /// Client info
    pub client_info: ClientInfo,
}

/// Client info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name
    pub name: String,

    /// Client version
    pub version: String,
}

/// Body of the initialize response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol revision the server answers with.
    pub protocol_version: String,

    /// Server capabilities
    pub capabilities: ServerCapabilities,

    /// Server info
    pub server_info: ServerInfo,
}

/// Server capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tools capability
    pub tools: ToolsCapability,

    /// Resources capability
    pub resources: ResourcesCapability,

    /// Prompts capability
    pub prompts: PromptsCapability,

    /// Logging capability (empty object on the wire)
    pub logging: LoggingCapability,
}

impl ServerCapabilities {
    /// The fixed capability set this server advertises.
    pub fn advertised() -> Self {
        Self {
            tools: ToolsCapability {
                list_changed: false,
            },
            resources: ResourcesCapability {
                subscribe: false,
                list_changed: false,
            },
            prompts: PromptsCapability {
                list_changed: false,
            },
            logging: LoggingCapability {},
        }
    }
}

/// Tools capability
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// Whether the tools list may change
    #[serde(default)]
    pub list_changed: bool,
}

/// Resources capability
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {
    /// Whether resource subscriptions are supported
    #[serde(default)]
    pub subscribe: bool,

    /// Whether the resources list may change
    #[serde(default)]
    pub list_changed: bool,
}

/// Prompts capability
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsCapability {
    /// Whether the prompts list may change
    #[serde(default)]
    pub list_changed: bool,
}

/// Logging capability (no fields; serialized as `{}`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingCapability {}

/// Server info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name
    pub name: String,

    /// Server version
    pub version: String,
}

// ============================================================================
// Tools
// ============================================================================

/// One entry of the tools/list result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Tool name (e.g., "datetime")
    pub name: String,

    /// One-line description shown to the model.
    pub description: String,

    /// JSON Schema describing the accepted arguments.
    pub input_schema: Value,
}

/// Tools list result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResult {
    /// Available tools
    pub tools: Vec<ToolDefinition>,
}

/// Tool call params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    /// Tool name
    pub name: String,

    /// Tool arguments
    #[serde(default)]
    pub arguments: Option<Value>,

    /// Request metadata (progress token)
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

/// The `_meta` object on a tools/call request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    /// Token echoed back on notifications/progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<String>,
}

/// Tool call result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Result content
    pub content: Vec<ContentBlock>,

    /// True when the content is an error for the model to see.
    #[serde(
        rename = "isError",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_error: bool,
}

impl ToolCallResult {
    /// A successful text result
    pub fn text(s: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(s)],
            is_error: false,
        }
    }

    /// An error result (surfaced to the model, not a protocol error)
    pub fn error(s: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(s)],
            is_error: true,
        }
    }
}

/// Content block in tool and prompt results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    /// Text content
    #[serde(rename = "text")]
    Text {
        /// The text content
        text: String,
    },
}

impl ContentBlock {
    /// Shorthand for a text block.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text { text: s.into() }
    }
}

// ============================================================================
// Resources
// ============================================================================

/// Resource descriptor for resources/list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// Resource URI (e.g., "file:///data/report.csv")
    pub uri: String,

    /// Display name (typically the file basename)
    pub name: String,

    /// MIME type, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Resources list result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesListResult {
    /// Available resources
    pub resources: Vec<ResourceDescriptor>,
}

/// Resources read params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesReadParams {
    /// URI to read
    pub uri: String,
}

/// One content item of a resources/read result.
///
/// Exactly one of `text` and `blob` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    /// Resource URI
    pub uri: String,

    /// MIME type, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Text contents (textual MIME types)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Base64 contents (everything else)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

/// Resources read result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesReadResult {
    /// Resource contents
    pub contents: Vec<ResourceContents>,
}

// ============================================================================
// Prompts
// ============================================================================

/// Prompt definition for prompts/list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Prompt name
    pub name: String,

    /// What the prompt is for.
    pub description: String,

    /// Declared arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

/// Declared prompt argument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name
    pub name: String,

    /// Argument description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether the argument must be supplied on prompts/get
    #[serde(default)]
    pub required: bool,
}

/// Prompts list result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsListResult {
    /// Available prompts
    pub prompts: Vec<PromptDefinition>,
}

/// Prompts get params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsGetParams {
    /// Prompt name
    pub name: String,

    /// Argument values (all strings on the wire)
    #[serde(default)]
    pub arguments: Option<std::collections::HashMap<String, String>>,
}

/// One rendered prompt message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Message role ("user" or "assistant")
    pub role: String,

    /// Message content
    pub content: ContentBlock,
}

/// Prompts get result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsGetResult {
    /// Prompt description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Rendered messages, in order
    pub messages: Vec<PromptMessage>,
}

// ============================================================================
// Logging
// ============================================================================

/// logging/setLevel params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLevelParams {
    /// New forwarding threshold
    pub level: String,
}

// ============================================================================
// MCP Methods
// ============================================================================

/// Known MCP methods
pub mod methods {
    /// Open the session and exchange capabilities
    pub const INITIALIZE: &str = "initialize";
    /// Client-side notification closing the handshake
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Liveness check, answered with an empty object
    pub const PING: &str = "ping";
    /// List available tools
    pub const TOOLS_LIST: &str = "tools/list";
    /// Call a tool
    pub const TOOLS_CALL: &str = "tools/call";
    /// List available resources
    pub const RESOURCES_LIST: &str = "resources/list";
    /// Read a resource by URI
    pub const RESOURCES_READ: &str = "resources/read";
    /// List available prompts
    pub const PROMPTS_LIST: &str = "prompts/list";
    /// Render a prompt by name
    pub const PROMPTS_GET: &str = "prompts/get";
    /// Change the log forwarding threshold
    pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

    /// Outbound: forwarded log record
    pub const NOTIFICATION_MESSAGE: &str = "notifications/message";
    /// Outbound: tool progress update
    pub const NOTIFICATION_PROGRESS: &str = "notifications/progress";
}
