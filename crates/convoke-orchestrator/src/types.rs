//! Request and response envelopes, strategies, and decisions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use convoke_kernel::LogEntry;
use convoke_provider::AttemptRecord;
use convoke_retrieval::RagHit;

/// Maximum accepted message size in bytes.
pub const MAX_MESSAGE_BYTES: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A single user turn.  Immutable after receipt.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Caller-supplied correlation id; a monotonic one is generated when
    /// absent.
    #[serde(default)]
    pub trace_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
            trace_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Strategy and decision
// ---------------------------------------------------------------------------

/// The strategy reported in the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Llm,
    Rag,
    Agent,
    Tool,
    Command,
    Error,
}

/// Where a request is routed.  The closed sum the decision engine produces.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Plain conversational completion through the cascade.
    Llm,
    /// Retrieval-augmented completion.
    Rag,
    /// Dispatch to a domain agent.
    Agent { agent_id: String },
    /// Invoke a deterministic tool with extracted params.
    Tool {
        tool_id: String,
        action: String,
        params: Value,
    },
    /// A `/command`, handled synchronously by the orchestrator.
    Command { name: String },
}

impl Route {
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Llm => Strategy::Llm,
            Self::Rag => Strategy::Rag,
            Self::Agent { .. } => Strategy::Agent,
            Self::Tool { .. } => Strategy::Tool,
            Self::Command { .. } => Strategy::Command,
        }
    }
}

/// The decision engine's verdict for one message.  Consumed once.
#[derive(Debug, Clone)]
pub struct Decision {
    pub route: Route,
    pub confidence: f32,
    pub reasoning: String,
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Structured error payload in the response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorInfo {
    /// Taxonomy kind (`validation`, `permission`, `AllProvidersExhausted`...).
    pub kind: String,
    pub message: String,
    /// Per-provider attempt records when the cascade exhausted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<Vec<AttemptRecord>>,
}

/// The single response produced for an accepted request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub ok: bool,
    pub text: String,
    pub strategy: Strategy,
    pub confidence: f32,
    pub reasoning: String,
    pub provider: Option<String>,
    pub tool_used: Option<String>,
    pub agent_used: Option<String>,
    pub rag_hits: Option<Vec<RagHit>>,
    pub duration_ms: u64,
    pub trace_id: String,
    /// Included only when the caller sets the debug flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<LogEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_maps_to_strategy() {
        assert_eq!(Route::Llm.strategy(), Strategy::Llm);
        assert_eq!(
            Route::Agent {
                agent_id: "x".into()
            }
            .strategy(),
            Strategy::Agent
        );
        assert_eq!(
            Route::Command { name: "clear".into() }.strategy(),
            Strategy::Command
        );
    }

    #[test]
    fn request_deserializes_with_optional_fields() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"message": "hi"}"#).expect("deserializes");
        assert_eq!(request.message, "hi");
        assert!(request.session_id.is_none());
    }

    #[test]
    fn strategy_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Strategy::Rag).unwrap(), "\"rag\"");
    }
}
