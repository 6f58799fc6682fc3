//! Tool and sequence error types.

use crate::template::TemplateError;

/// Unified error type for tool execution and sequence running.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The tool does not implement the requested action.
    #[error("tool `{tool}` has no action `{action}`")]
    UnknownAction { tool: String, action: String },

    /// A parameter is missing, of the wrong type, or out of range.
    #[error("invalid params for `{tool}`: {reason}")]
    InvalidParams { tool: String, reason: String },

    /// A declared constraint (path, extension, filesystem/network access)
    /// would be violated by this call.
    #[error("constraint violation in `{tool}`: {reason}")]
    ConstraintViolation { tool: String, reason: String },

    /// The tool ran and failed.
    #[error("tool `{tool}` failed: {reason}")]
    ExecutionFailed { tool: String, reason: String },

    /// The step deadline elapsed.
    #[error("step for `{target}` timed out after {after_ms} ms")]
    StepTimeout { target: String, after_ms: u64 },

    /// A `${...}` placeholder failed to parse or resolve.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The sequence-level circuit breaker is open.
    #[error("sequence `{sequence}` circuit is open")]
    SequenceCircuitOpen { sequence: String },

    /// An agent attempted to use a tool outside its allow-list.
    #[error("permission denied: agent `{agent}` may not use tool `{tool}`")]
    PermissionDenied { agent: String, tool: String },

    /// The referenced step target does not resolve to an enabled component.
    #[error("step target not available: {target}")]
    TargetUnavailable { target: String },
}

/// Convenience alias used throughout the tools crate.
pub type Result<T> = std::result::Result<T, ToolError>;
