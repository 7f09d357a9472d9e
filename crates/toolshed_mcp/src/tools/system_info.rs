//! system_info - Host Process Facts
//!
//! Read-only facts about the running process and host: OS, architecture,
//! parallelism, working directory.

use super::{require_action, Tool};
use crate::arguments::ArgumentMap;
use crate::cancel::CancellationToken;
use crate::progress::ProgressReporter;
use crate::protocol::ToolCallResult;
use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

pub struct SystemInfoTool;

impl Tool for SystemInfoTool {
    fn name(&self) -> &'static str {
        "system_info"
    }

    fn description(&self) -> &'static str {
        "Host facts: OS, architecture, CPU count, working directory"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["os", "arch", "cpu_count", "working_dir", "all"],
                    "description": "Fact to read"
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

        let cpu_count = || {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        };
        let working_dir = || -> Result<String> {
            Ok(std::env::current_dir()
                .context("Failed to read working directory")?
                .display()
                .to_string())
        };

        let output = match action.as_str() {
            "os" => std::env::consts::OS.to_string(),
            "arch" => std::env::consts::ARCH.to_string(),
            "cpu_count" => cpu_count().to_string(),
            "working_dir" => working_dir()?,
            "all" => serde_json::to_string(&json!({
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
                "cpu_count": cpu_count(),
                "working_dir": working_dir()?,
            }))?,
            other => bail!("Unknown system_info action '{}'", other),
        };

        Ok(ToolCallResult::text(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::normalize_arguments;
    use serde_json::json;

    fn run(args: serde_json::Value) -> Result<ToolCallResult> {
        let args = normalize_arguments(args.as_object().unwrap());
        SystemInfoTool.execute(&args, &ProgressReporter::Null, &CancellationToken::new())
    }

    fn text_of(result: &ToolCallResult) -> String {
        serde_json::to_value(&result.content[0]).unwrap()["text"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_os_matches_compile_target() {
        let result = run(json!({"action": "os"})).unwrap();
        assert_eq!(text_of(&result), std::env::consts::OS);
    }

    #[test]
    fn test_all_is_json_object() {
        let result = run(json!({"action": "all"})).unwrap();
        let value: Value = serde_json::from_str(&text_of(&result)).unwrap();
        assert!(value["cpu_count"].as_u64().unwrap() >= 1);
        assert!(value["working_dir"].as_str().is_some());
    }

    #[test]
    fn test_unknown_action_errors() {
        assert!(run(json!({"action": "kernel"})).is_err());
    }
}
