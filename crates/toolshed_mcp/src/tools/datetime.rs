//! datetime - Clock and Timestamp Operations
//!
//! Read the current time, format and parse timestamps, and compute
//! differences. Timestamps cross the tool boundary as epoch seconds (f64,
//! like every JSON number).

use super::{optional_str, require_action, require_f64, require_str, Tool};
use crate::arguments::ArgumentMap;
use crate::cancel::CancellationToken;
use crate::progress::ProgressReporter;
use crate::protocol::ToolCallResult;
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{json, Value};

const DEFAULT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct DateTimeTool;

impl DateTimeTool {
    fn from_epoch(secs: f64) -> Result<DateTime<Utc>> {
        let nanos = secs * 1e9;
        if !nanos.is_finite() || nanos.abs() >= i64::MAX as f64 {
            bail!("Timestamp out of range: {}", secs);
        }
        Ok(Utc.timestamp_nanos(nanos as i64))
    }
}

impl Tool for DateTimeTool {
    fn name(&self) -> &'static str {
        "datetime"
    }

    fn description(&self) -> &'static str {
        "Current time, timestamp formatting, parsing and differences"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["now", "utc_now", "format", "parse", "diff"],
                    "description": "Operation to perform"
                },
                "timestamp": {
                    "type": "number",
                    "description": "Epoch seconds (format)"
                },
                "value": {
                    "type": "string",
                    "description": "Datetime string (parse)"
                },
                "format": {
                    "type": "string",
                    "description": "strftime format (format/parse), default %Y-%m-%d %H:%M:%S"
                },
                "start": {
                    "type": "number",
                    "description": "Epoch seconds (diff)"
                },
                "end": {
                    "type": "number",
                    "description": "Epoch seconds (diff)"
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

        let text = match action.as_str() {
            "now" | "utc_now" => Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "format" => {
                let ts = require_f64(args, "timestamp")?;
                let format = optional_str(args, "format").unwrap_or(DEFAULT_FORMAT);
                Self::from_epoch(ts)?.format(format).to_string()
            }
            "parse" => {
                let value = require_str(args, "value")?;
                let parsed = match optional_str(args, "format") {
                    Some(format) => NaiveDateTime::parse_from_str(value, format)
                        .map(|naive| naive.and_utc())
                        .map_err(|e| anyhow!("Failed to parse '{}': {}", value, e))?,
                    None => DateTime::parse_from_rfc3339(value)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| anyhow!("Failed to parse '{}': {}", value, e))?,
                };
                parsed.timestamp().to_string()
            }
            "diff" => {
                let start = require_f64(args, "start")?;
                let end = require_f64(args, "end")?;
                format!("{}", end - start)
            }
            other => bail!("Unknown datetime action '{}'", other),
        };

        Ok(ToolCallResult::text(text))
    }
}
