//! Agent error types.

/// Unified error type for the agent layer.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The agent's `on_init` hook failed; the agent stays unusable.
    #[error("agent `{agent}` failed to initialize: {reason}")]
    InitFailed { agent: String, reason: String },

    /// The agent ran and failed.
    #[error("agent `{agent}` failed: {reason}")]
    ExecutionFailed { agent: String, reason: String },

    /// The agent tried to use a tool outside its allow-list, or lacks the
    /// required permission bit.  Enforced before the tool is ever reached.
    #[error("permission denied: agent `{agent}` may not use {kind} `{target}`")]
    PermissionDenied {
        agent: String,
        kind: &'static str,
        target: String,
    },

    /// No factory is bound for the configured agent class.
    #[error("no factory registered for agent class `{class}`")]
    UnknownFactory { class: String },

    /// A tool call made on the agent's behalf failed.
    #[error("tool `{tool}` failed for agent `{agent}`: {reason}")]
    ToolFailed {
        agent: String,
        tool: String,
        reason: String,
    },

    /// An LLM completion made on the agent's behalf failed.
    #[error("completion failed for agent `{agent}`: {reason}")]
    CompletionFailed { agent: String, reason: String },
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;
