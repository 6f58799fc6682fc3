//! JSON parsing tool.
//!
//! Two actions: `parse` returns the parsed value (failing on invalid
//! input), `validate` reports validity without failing the step.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{Result, ToolError};
use crate::traits::{Tool, require_str};

/// Parses and validates JSON documents supplied as strings.
pub struct JsonParser {
    id: String,
}

impl JsonParser {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl Default for JsonParser {
    fn default() -> Self {
        Self::new("json_parser")
    }
}

#[async_trait]
impl Tool for JsonParser {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, action: &str, params: Value) -> Result<Value> {
        let raw = require_str(&params, "json", &self.id)?;
        let parsed: std::result::Result<Value, _> = serde_json::from_str(raw);

        match action {
            "" | "parse" => match parsed {
                Ok(value) => Ok(json!({
                    "valid": true,
                    "value": value,
                })),
                Err(e) => Err(ToolError::ExecutionFailed {
                    tool: self.id.clone(),
                    reason: format!("invalid JSON: {e}"),
                }),
            },
            "validate" => Ok(match parsed {
                Ok(value) => json!({
                    "valid": true,
                    "kind": json_kind(&value),
                }),
                Err(e) => json!({
                    "valid": false,
                    "error": e.to_string(),
                }),
            }),
            other => Err(ToolError::UnknownAction {
                tool: self.id.clone(),
                action: other.to_string(),
            }),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
