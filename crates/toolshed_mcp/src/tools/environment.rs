//! environment - Allowlisted Environment Variable Access
//!
//! Reads process environment variables. Only names on the configured
//! allowlist are visible; everything else behaves as if it did not exist.

use super::{require_action, require_str, Tool};
use crate::arguments::ArgumentMap;
use crate::cancel::CancellationToken;
use crate::progress::ProgressReporter;
use crate::protocol::ToolCallResult;
use anyhow::{bail, Result};
use serde_json::{json, Value};
use std::collections::BTreeSet;

pub struct EnvironmentTool {
    allowed: BTreeSet<String>,
}

impl EnvironmentTool {
    /// Create the tool with the set of readable variable names.
    pub fn new(allowed: Vec<String>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl Tool for EnvironmentTool {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn description(&self) -> &'static str {
        "Read allowlisted process environment variables"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["get", "list"],
                    "description": "Operation to perform"
                },
                "name": {
                    "type": "string",
                    "description": "Variable name (get)"
                }
            },
            "required": ["action"]
        })
    }

    fn execute(
        &self,
        args: &ArgumentMap,
        _progress: &ProgressReporter,
        _cancel: &CancellationToken,
    ) -> Result<ToolCallResult> {
        let action = require_action(args)?;

        let output = match action.as_str() {
            "get" => {
                let name = require_str(args, "name")?;
                if !self.allowed.contains(name) {
                    bail!("Environment variable '{}' is not on the allowlist", name);
                }
                match std::env::var(name) {
                    Ok(value) => value,
                    Err(_) => bail!("Environment variable '{}' is not set", name),
                }
            }
            "list" => {
                // Names only; values require an explicit get.
                let names: Vec<&str> = self.allowed.iter().map(String::as_str).collect();
                serde_json::to_string(&names)?
            }
            other => bail!("Unknown environment action '{}'", other),
        };

        Ok(ToolCallResult::text(output))
    }
}
