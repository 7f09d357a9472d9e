//! Tool Registry - Tool Discovery and Dispatch
//!
//! Maintains the list of available tools and resolves calls by exact name.
//! The registry is immutable after startup.

use super::{DateTimeTool, EnvironmentTool, SystemInfoTool, TextTool, Tool};
use crate::protocol::ToolDefinition;
use std::collections::HashMap;
use tracing::debug;

/// Registry of available MCP tools
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create a registry with every built-in tool registered.
    ///
    /// `env_allowlist` gates which variables the environment tool may read.
    pub fn with_builtins(env_allowlist: Vec<String>) -> Self {
        let mut registry = Self::new();

        registry.register(Box::new(DateTimeTool));
        registry.register(Box::new(TextTool));
        registry.register(Box::new(EnvironmentTool::new(env_allowlist)));
        registry.register(Box::new(SystemInfoTool));

        debug!("Registered {} tools", registry.tools.len());

        registry
    }

    /// Register a tool.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        debug!("Registering tool: {}", name);
        self.tools.insert(name, tool);
    }

    /// List definitions of all registered tools, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Get a tool by exact name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Check if a tool exists.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// True when no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
