//! The tool contract.
//!
//! Every deterministic tool implements [`Tool`]: a named, stateless unit
//! that executes an action against JSON params and returns a JSON result.
//! Schema validation happens before `execute` is called (see
//! [`crate::schema`]); tools still defensively extract their params with the
//! helpers here.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, ToolError};

/// A deterministic tool.  Stateless between calls; safe to share.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique identifier (matches the config id).
    fn id(&self) -> &str;

    /// Execute `action` with validated params.
    async fn execute(&self, action: &str, params: Value) -> Result<Value>;
}

/// Extract a required string field from JSON params.
pub fn require_str<'a>(params: &'a Value, field: &str, tool: &str) -> Result<&'a str> {
    params
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidParams {
            tool: tool.to_string(),
            reason: format!("missing required string field `{field}`"),
        })
}

/// Extract a required numeric field from JSON params.
pub fn require_f64(params: &Value, field: &str, tool: &str) -> Result<f64> {
    params
        .get(field)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| ToolError::InvalidParams {
            tool: tool.to_string(),
            reason: format!("missing required numeric field `{field}`"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn require_helpers() {
        let params = json!({"path": "/tmp/x", "count": 2});
        assert_eq!(require_str(&params, "path", "t").unwrap(), "/tmp/x");
        assert_eq!(require_f64(&params, "count", "t").unwrap(), 2.0);
        assert!(require_str(&params, "count", "t").is_err());
        assert!(require_f64(&params, "missing", "t").is_err());
    }
}
