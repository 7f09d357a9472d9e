//! text - String Transformations
//!
//! Case conversion, trimming, measurement, replacement and splitting over a
//! single `text` argument.

use super::{require_action, require_str, Tool};
use crate::arguments::ArgumentMap;
use crate::cancel::CancellationToken;
use crate::progress::ProgressReporter;
use crate::protocol::ToolCallResult;
use anyhow::{bail, Result};
use serde_json::{json, Value};

pub struct TextTool;

impl Tool for TextTool {
    fn name(&self) -> &'static str {
        "text"
    }

    fn description(&self) -> &'static str {
        "String transformations: case, trim, length, replace, split"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["uppercase", "lowercase", "trim", "length", "replace", "split"],
                    "description": "Operation to perform"
                },
                "text": {
                    "type": "string",
                    "description": "Input text"
                },
                "from": {
                    "type": "string",
                    "description": "Substring to replace (replace)"
                },
                "to": {
                    "type": "string",
                    "description": "Replacement (replace)"
                },
                "separator": {
                    "type": "string",
                    "description": "Separator (split)"
                }
            },
            "required": ["action", "text"]
        })
    }

    fn execute(
        &self,
        args: &ArgumentMap,
        _progress: &ProgressReporter,
        _cancel: &CancellationToken,
    ) -> Result<ToolCallResult> {
        let action = require_action(args)?;
        let text = require_str(args, "text")?;

        let output = match action.as_str() {
            "uppercase" => text.to_uppercase(),
            "lowercase" => text.to_lowercase(),
            "trim" => text.trim().to_string(),
            "length" => text.chars().count().to_string(),
            "replace" => {
                let from = require_str(args, "from")?;
                let to = require_str(args, "to")?;
                if from.is_empty() {
                    bail!("Argument 'from' must not be empty");
                }
                text.replace(from, to)
            }
            "split" => {
                let separator = require_str(args, "separator")?;
                if separator.is_empty() {
                    bail!("Argument 'separator' must not be empty");
                }
                let parts: Vec<&str> = text.split(separator).collect();
                serde_json::to_string(&parts)?
            }
            other => bail!("Unknown text action '{}'", other),
        };

        Ok(ToolCallResult::text(output))
    }
}
