//! Arithmetic tool.
//!
//! Four actions — `soma`, `subtracao`, `multiplicacao`, `divisao` — each
//! taking numeric params `a` and `b`.  Action names follow the gateway's
//! original locale; the decision rules map both symbolic and word forms
//! onto them.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{Result, ToolError};
use crate::traits::{Tool, require_f64};

/// Basic arithmetic over two operands.
pub struct Calculator {
    id: String,
}

impl Calculator {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new("calculator")
    }
}

#[async_trait]
impl Tool for Calculator {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, action: &str, params: Value) -> Result<Value> {
        let a = require_f64(&params, "a", &self.id)?;
        let b = require_f64(&params, "b", &self.id)?;

        // Deployments may register one op-named tool per operation
        // (`soma`, `divisao`, ...); the id doubles as the action then.
        let action = if action.is_empty() { self.id.as_str() } else { action };

        let (symbol, result) = match action {
            "soma" => ("+", a + b),
            "subtracao" => ("-", a - b),
            "multiplicacao" => ("*", a * b),
            "divisao" => {
                if b == 0.0 {
                    return Err(ToolError::ExecutionFailed {
                        tool: self.id.clone(),
                        reason: "division by zero".into(),
                    });
                }
                ("/", a / b)
            }
            other => {
                return Err(ToolError::UnknownAction {
                    tool: self.id.clone(),
                    action: other.to_string(),
                });
            }
        };

        tracing::debug!(tool = %self.id, action, a, b, result, "calculator executed");

        Ok(json!({
            "result": result,
            "expression": format_expression(a, symbol, b, result),
        }))
    }
}

/// Render `7 + 5 = 12`, dropping `.0` on integral values.
fn format_expression(a: f64, symbol: &str, b: f64, result: f64) -> String {
    format!(
        "{} {} {} = {}",
        format_number(a),
        symbol,
        format_number(b),
        format_number(result)
    )
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn addition() {
        let calc = Calculator::default();
        let out = calc
            .execute("soma", json!({"a": 7, "b": 5}))
            .await
            .expect("runs");
        assert_eq!(out["result"], 12.0);
        assert_eq!(out["expression"], "7 + 5 = 12");
    }

    #[tokio::test]
    async fn division_by_zero_fails() {
        let calc = Calculator::default();
        let err = calc
            .execute("divisao", json!({"a": 1, "b": 0}))
            .await
            .expect_err("must fail");
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn fractional_results_keep_decimals() {
        let calc = Calculator::default();
        let out = calc
            .execute("divisao", json!({"a": 7, "b": 2}))
            .await
            .expect("runs");
        assert_eq!(out["result"], 3.5);
        assert_eq!(out["expression"], "7 / 2 = 3.5");
    }

    #[tokio::test]
    async fn unknown_action() {
        let calc = Calculator::default();
        assert!(matches!(
            calc.execute("modulo", json!({"a": 1, "b": 2})).await,
            Err(ToolError::UnknownAction { .. })
        ));
    }

    #[tokio::test]
    async fn missing_operand() {
        let calc = Calculator::default();
        assert!(matches!(
            calc.execute("soma", json!({"a": 1})).await,
            Err(ToolError::InvalidParams { .. })
        ));
    }
}
