//! Tool result formatting.
//!
//! Tool return values are JSON; the chat surface wants text.  Known
//! built-in tools get purpose-built formatters, everything else falls back
//! to pretty-printed JSON.

use serde_json::Value;

/// Render a tool's JSON result as user-facing text.
pub fn format_tool_result(tool_id: &str, result: &Value) -> String {
    match tool_id {
        "calculator" | "soma" | "subtracao" | "multiplicacao" | "divisao" => {
            format_calculator(result)
        }
        "file_reader" => format_file_read(result),
        "json_parser" => format_json_parse(result),
        _ => pretty(result),
    }
}

fn format_calculator(result: &Value) -> String {
    if let Some(expression) = result["expression"].as_str() {
        return expression.to_string();
    }
    result["result"]
        .as_f64()
        .map(|n| {
            if n.fract() == 0.0 {
                format!("{}", n as i64)
            } else {
                format!("{n}")
            }
        })
        .unwrap_or_else(|| pretty(result))
}

fn format_file_read(result: &Value) -> String {
    let Some(content) = result["content"].as_str() else {
        return pretty(result);
    };
    if result["truncated"].as_bool().unwrap_or(false) {
        format!("{content}\n\n[content truncated]")
    } else {
        content.to_string()
    }
}

fn format_json_parse(result: &Value) -> String {
    match result["valid"].as_bool() {
        Some(true) => match result.get("value") {
            Some(value) => format!("Valid JSON:\n{}", pretty(value)),
            None => "Valid JSON.".to_string(),
        },
        Some(false) => format!(
            "Invalid JSON: {}",
            result["error"].as_str().unwrap_or("unknown error")
        ),
        None => pretty(result),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
