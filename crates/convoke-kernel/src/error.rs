//! Kernel error types.
//!
//! All kernel subsystems surface errors through [`KernelError`], the single
//! error type returned by every public API in this crate.  Each variant
//! carries enough context for callers to decide how to handle the failure
//! without inspecting opaque strings.

/// Unified error type for the convoke kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Registry errors ----------------------------------------------------
    /// The requested component is not registered.
    #[error("{kind} not found: {id}")]
    ComponentNotFound { kind: &'static str, id: String },

    /// The component is registered but disabled; disabled components are
    /// absent from all runtime lookups.
    #[error("{kind} is disabled: {id}")]
    ComponentDisabled { kind: &'static str, id: String },

    /// The component failed to construct at registration time.  The registry
    /// keeps the failure record so the rest of the system can boot.
    #[error("{kind} failed to load: {id}: {reason}")]
    ComponentLoadFailed {
        kind: &'static str,
        id: String,
        reason: String,
    },

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors that don't fit a specific
    /// variant.  Prefer a typed variant whenever possible.
    #[error("internal kernel error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
