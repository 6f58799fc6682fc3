//! Code analysis agent.
//!
//! Produces a structural report of a short code body (line counts, language
//! hints, style flags) and, when the cascade is reachable, asks the LLM for
//! a one-paragraph review.  Falls back to the structural report alone when
//! the completion fails.

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::traits::{Agent, AgentInput, AgentOutput, AgentServices};

/// Structural + LLM-assisted code review.
pub struct CodeAnalyzer {
    id: String,
}

impl CodeAnalyzer {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Strip the instruction prefix and isolate the code-looking body.
    fn extract_code(message: &str) -> &str {
        match message.find(|c| c == '\n' || c == ':') {
            Some(pos) => message[pos + 1..].trim(),
            None => message.trim(),
        }
    }

    fn guess_language(code: &str) -> &'static str {
        if code.contains("fn ") && code.contains("let ") {
            "rust"
        } else if code.contains("def ") || code.contains("import ") {
            "python"
        } else if code.contains("function ") || code.contains("=>") || code.contains("const ") {
            "javascript"
        } else if code.contains("public ") && code.contains("class ") {
            "java"
        } else {
            "unknown"
        }
    }
}

#[async_trait]
impl Agent for CodeAnalyzer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(
        &self,
        input: AgentInput,
        services: &dyn AgentServices,
    ) -> Result<AgentOutput> {
        let code = Self::extract_code(&input.message);
        let lines: Vec<&str> = code.lines().collect();
        let line_count = lines.len();
        let long_lines = lines.iter().filter(|l| l.chars().count() > 100).count();
        let todo_count = lines.iter().filter(|l| l.contains("TODO")).count();
        let language = Self::guess_language(code);

        tracing::debug!(
            agent = %self.id,
            language,
            lines = line_count,
            "code analysis"
        );

        let mut report = format!(
            "Analysis: {line_count} line(s), language guess: {language}."
        );
        if long_lines > 0 {
            report.push_str(&format!(" {long_lines} line(s) exceed 100 characters."));
        }
        if todo_count > 0 {
            report.push_str(&format!(" {todo_count} TODO marker(s) found."));
        }

        // LLM review is best-effort: the structural report stands on its own.
        let prompt = format!(
            "Review the following {language} code in one short paragraph. \
             Point out at most two concrete issues.\n\n{code}"
        );
        match services.complete(&self.id, &prompt).await {
            Ok(review) => report.push_str(&format!("\n\nReview: {}", review.trim())),
            Err(e) => {
                tracing::debug!(agent = %self.id, error = %e, "llm review unavailable");
            }
        }

        Ok(AgentOutput {
            text: report,
            data: Some(json!({
                "language": language,
                "lines": line_count,
                "long_lines": long_lines,
                "todos": todo_count,
            })),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
