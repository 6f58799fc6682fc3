//! Data processing agent.
//!
//! Validates, transforms, and aggregates structured input embedded in the
//! message.  JSON validation goes through the registered `json_parser` tool
//! so the agent's tool permissions are exercised; aggregation over numeric
//! arrays is computed locally.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::traits::{Agent, AgentInput, AgentOutput, AgentServices};

/// Validate / transform / aggregate structured data.
pub struct DataProcessor {
    id: String,
}

impl DataProcessor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Find the first `{...}` or `[...]` body in the message.  A missing
    /// closing bracket still yields the tail so validation can report it.
    fn extract_payload(message: &str) -> Option<&str> {
        let open = message.find(['{', '['])?;
        let open_char = message.as_bytes()[open] as char;
        let close_char = if open_char == '{' { '}' } else { ']' };
        match message.rfind(close_char) {
            Some(close) if close > open => Some(&message[open..=close]),
            _ => Some(&message[open..]),
        }
    }

    fn aggregate(values: &[Value]) -> Option<Value> {
        let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
        if numbers.is_empty() {
            return None;
        }
        let sum: f64 = numbers.iter().sum();
        let count = numbers.len();
        let min = numbers.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Some(json!({
            "count": count,
            "sum": sum,
            "average": sum / count as f64,
            "min": min,
            "max": max,
        }))
    }
}

#[async_trait]
impl Agent for DataProcessor {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(
        &self,
        input: AgentInput,
        services: &dyn AgentServices,
    ) -> Result<AgentOutput> {
        let Some(payload) = Self::extract_payload(&input.message) else {
            return Err(AgentError::ExecutionFailed {
                agent: self.id.clone(),
                reason: "no structured payload found in message".into(),
            });
        };

        // Validation runs through the tool layer (and its permission check).
        let validation = services
            .run_tool(&self.id, "json_parser", "validate", json!({"json": payload}))
            .await?;

        if validation["valid"] != json!(true) {
            let error = validation["error"].as_str().unwrap_or("invalid JSON");
            return Ok(AgentOutput {
                text: format!("The supplied data is not valid JSON: {error}"),
                data: Some(json!({"valid": false, "error": error})),
            });
        }

        let parsed: Value = serde_json::from_str(payload).map_err(|e| {
            AgentError::ExecutionFailed {
                agent: self.id.clone(),
                reason: format!("payload re-parse failed: {e}"),
            }
        })?;

        let summary = match &parsed {
            Value::Array(items) => {
                let mut summary = json!({
                    "kind": "array",
                    "items": items.len(),
                });
                if let Some(stats) = Self::aggregate(items) {
                    summary["stats"] = stats;
                }
                summary
            }
            Value::Object(map) => json!({
                "kind": "object",
                "keys": map.keys().cloned().collect::<Vec<_>>(),
            }),
            other => json!({"kind": kind_of(other)}),
        };

        let text = match &summary["stats"] {
            Value::Object(stats) => format!(
                "Valid data: {} item(s); sum = {}, average = {}.",
                summary["items"], stats["sum"], stats["average"]
            ),
            _ => format!("Valid {} payload.", summary["kind"].as_str().unwrap_or("json")),
        };

        Ok(AgentOutput {
            text,
            data: Some(json!({"valid": true, "summary": summary})),
        })
    }
}

fn kind_of(value: &Value) -> &'static str {
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
