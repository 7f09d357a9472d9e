//! MCP (Model Context Protocol) Server for Toolshed
//!
//! This crate implements an MCP server that exposes a curated set of
//! utility tools, resources and prompts to AI assistants over JSON-RPC 2.0
//! on stdin/stdout, one JSON object per line.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    AI Assistant (host)                           │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               │ MCP Protocol (JSON-RPC over stdio)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 crates/toolshed_mcp/                             │
//! │                                                                  │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │                    Core Subsystems                        │   │
//! │  ├──────────────────────────────────────────────────────────┤   │
//! │  │  Server       │ JSON-RPC stdio, handshake, dispatch      │   │
//! │  │  Pipeline     │ authorize → rate-limit → cache → execute │   │
//! │  │               │ → audit, per call                        │   │
//! │  │  Cache        │ TTL + capacity bounded, two-pass evict   │   │
//! │  │  Rate limiter │ per-tool token buckets                   │   │
//! │  │  Audit        │ per-day JSONL, redaction, retention      │   │
//! │  │  Auth         │ API-key identities, allowlists           │   │
//! │  │  Log sink     │ notifications/message above threshold    │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! │                                                                  │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │           Tools / Resources / Prompts                     │   │
//! │  ├──────────────────────────────────────────────────────────┤   │
//! │  │  Tools        │ datetime, text, environment, system_info │   │
//! │  │  Resources    │ file:// provider over allowlisted roots  │   │
//! │  │  Prompts      │ fixed template registry                  │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! 1. **One pipeline for every call:** authentication, authorization, rate
//!    limiting, caching, auditing and progress reporting wrap every tool
//!    invocation in a fixed order.
//!
//! 2. **Protocol errors vs tool errors:** JSON-RPC errors are reserved for
//!    protocol-level conditions; tool failures and internal rejections are
//!    `isError:true` results the host can show to the model.
//!
//! 3. **Failure isolation:** audit, log-sink and progress write failures are
//!    diagnosed on stderr and never crash the server or mutate a response.
//!
//! 4. **Security from day one:** resource access is allowlist-gated with
//!    prefix-safe path comparison, and sensitive argument values never reach
//!    the audit log verbatim.

pub mod arguments;
pub mod audit;
pub mod auth;
pub mod cache;
pub mod cancel;
pub mod clock;
pub mod logsink;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod protocol;
pub mod ratelimit;
pub mod resources;
pub mod server;
pub mod tools;
pub mod writer;

// Re-exports for convenience
pub use arguments::{ArgValue, ArgumentMap};
pub use audit::{AuditOutcome, AuditRecord, AuditSink, JsonlAuditLogger, NullAuditSink};
pub use auth::{AllowAllAuthorizer, ApiKeyAuthorizer, AuthDecision, Authorizer, Identity};
pub use cache::{CacheConfig, CacheKey, NullCache, ResponseCache, ToolResultCache};
pub use cancel::CancellationToken;
pub use clock::{ManualClock, SystemClock, TimeSource};
pub use logsink::{LogLevel, LogSink};
pub use pipeline::ToolPipeline;
pub use progress::ProgressReporter;
pub use prompts::{BuiltinPromptProvider, PromptError, PromptProvider};
pub use protocol::{ErrorCode, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolCallResult};
pub use ratelimit::{BucketConfig, NullRateLimiter, RateLimiter, TokenBucketLimiter};
pub use resources::{FileResourceProvider, ResourceError, ResourceProvider};
pub use server::{AuditSettings, AuthSettings, McpServer, McpServerConfig};
pub use tools::{Tool, ToolRegistry};
pub use writer::MessageWriter;
