//! Orchestrator error taxonomy.
//!
//! Component errors converge here so the outermost handler can map every
//! failure onto a user-safe [`crate::types::ChatResponse`] with a stable
//! machine-readable `kind`.

use convoke_agent::AgentError;
use convoke_kernel::KernelError;
use convoke_provider::ProviderError;
use convoke_retrieval::RetrievalError;
use convoke_tools::ToolError;

/// Unified error type for request handling.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Bad request envelope: empty or oversize message, busy session.
    /// Returned to the caller with a specific human-readable text.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// The per-request wall-clock deadline elapsed before dispatch finished.
    #[error("request deadline exceeded after {after_ms} ms")]
    RequestTimeout { after_ms: u64 },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Kernel(#[from] KernelError),
}

impl OrchestratorError {
    /// Stable taxonomy kind for the response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::RequestTimeout { .. } => "timeout",
            Self::Provider(ProviderError::AllProvidersExhausted { .. }) => "AllProvidersExhausted",
            Self::Provider(ProviderError::CircuitOpen { .. }) => "circuit_open",
            Self::Provider(_) => "provider",
            Self::Tool(ToolError::PermissionDenied { .. }) => "permission",
            Self::Tool(ToolError::Template(_)) => "template",
            Self::Tool(_) => "tool",
            Self::Agent(AgentError::PermissionDenied { .. }) => "permission",
            Self::Agent(_) => "agent",
            Self::Retrieval(_) => "retrieval",
            Self::Kernel(_) => "component",
        }
    }
}

/// Convenience alias used throughout the orchestrator crate.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
