//! MCP Tool Implementations
//!
//! Each tool is a named capability dispatched by the invocation pipeline.
//! Tools consume the normalized argument map, report progress through the
//! per-call reporter, and honor cooperative cancellation where they can.
//!
//! Built-in tools are action-based: the `action` argument selects the
//! operation, and the same `action` is what the authorizer and cache key
//! see.

mod registry;

// Tool implementations
mod datetime;
mod environment;
mod system_info;
mod text;

pub use datetime::DateTimeTool;
pub use environment::EnvironmentTool;
pub use registry::ToolRegistry;
pub use system_info::SystemInfoTool;
pub use text::TextTool;

use crate::arguments::{ArgValue, ArgumentMap};
use crate::cancel::CancellationToken;
use crate::progress::ProgressReporter;
use crate::protocol::{ToolCallResult, ToolDefinition};
use anyhow::{anyhow, Result};
use serde_json::Value;

/// Trait for MCP tools.
///
/// Execution is synchronous; the pipeline may run it on a worker thread.
pub trait Tool: Send + Sync {
    /// Tool name (e.g., "datetime")
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool.
    ///
    /// Errors become `isError:true` results at the pipeline boundary, never
    /// JSON-RPC errors.
    fn execute(
        &self,
        args: &ArgumentMap,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ToolCallResult>;

    /// Get the tool definition for tools/list
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Fetch a required string argument.
pub(crate) fn require_str<'a>(args: &'a ArgumentMap, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(ArgValue::as_str)
        .ok_or_else(|| anyhow!("Missing required string argument '{}'", key))
}

/// Fetch an optional string argument.
pub(crate) fn optional_str<'a>(args: &'a ArgumentMap, key: &str) -> Option<&'a str> {
    args.get(key).and_then(ArgValue::as_str)
}

/// Fetch a required numeric argument (all JSON numbers arrive as f64).
pub(crate) fn require_f64(args: &ArgumentMap, key: &str) -> Result<f64> {
    args.get(key)
        .and_then(ArgValue::as_f64)
        .ok_or_else(|| anyhow!("Missing required numeric argument '{}'", key))
}

/// The `action` argument, required by every built-in tool.
pub(crate) fn require_action(args: &ArgumentMap) -> Result<String> {
    args.get("action")
        .and_then(ArgValue::as_str)
        .map(|s| s.to_lowercase())
        .ok_or_else(|| anyhow!("Missing required string argument 'action'"))
}
