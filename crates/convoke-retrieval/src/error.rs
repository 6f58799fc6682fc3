//! Retrieval error types.

/// Unified error type for the retrieval subsystem.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// The embedding call failed (transport, HTTP status, or parse).
    #[error("embedding failed: {reason}")]
    EmbeddingFailed { reason: String },

    /// The vector store could not be reached or answered with an error.
    #[error("vector store unreachable: {reason}")]
    StoreUnreachable { reason: String },

    /// The store answered but the payload was not in the expected shape.
    #[error("vector store response parse error: {reason}")]
    StoreParseFailed { reason: String },

    /// A vector of the wrong dimensionality was supplied.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Convenience alias used throughout the retrieval crate.
pub type Result<T> = std::result::Result<T, RetrievalError>;
