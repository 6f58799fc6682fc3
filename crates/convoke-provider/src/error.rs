//! Provider error types.
//!
//! Individual attempt failures are absorbed by the cascade; callers only
//! ever see [`ProviderError::AllProvidersExhausted`] (with one record per
//! attempt) or a construction-time error.

use serde::Serialize;

/// One failed (or suppressed) attempt inside a cascade walk.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub provider_id: String,
    pub model_id: String,
    /// Short machine-readable reason: `timeout`, `transport`, `http_503`,
    /// `empty_body`, `parse`, `circuit_open`, `budget_exceeded`.
    pub reason: String,
    pub duration_ms: u64,
}

/// Unified error type for provider calls.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request could not be sent or the connection broke mid-read.
    #[error("provider `{provider}` transport error: {reason}")]
    Transport { provider: String, reason: String },

    /// The provider answered with a non-success HTTP status.
    #[error("provider `{provider}` returned {status}: {body}")]
    HttpStatus {
        provider: String,
        status: u16,
        body: String,
    },

    /// The response body was not in the expected shape.
    #[error("provider `{provider}` response parse error: {reason}")]
    ParseFailed { provider: String, reason: String },

    /// Transport and parsing succeeded but the assistant text was empty.
    #[error("provider `{provider}` returned an empty completion")]
    EmptyCompletion { provider: String },

    /// The per-attempt deadline elapsed.
    #[error("provider `{provider}` timed out after {after_ms} ms")]
    Timeout { provider: String, after_ms: u64 },

    /// The provider's circuit breaker is open; no network call was made.
    #[error("provider `{provider}` circuit is open")]
    CircuitOpen { provider: String },

    /// The provider requires an API key and its env var is unset.
    #[error("missing api key for provider `{provider}` (env var {env_var})")]
    MissingApiKey { provider: String, env_var: String },

    /// Every candidate in the cascade failed.
    #[error("all providers exhausted after {} attempts", attempts.len())]
    AllProvidersExhausted { attempts: Vec<AttemptRecord> },

    /// The referenced provider id is not part of this cascade.
    #[error("unknown provider: {provider}")]
    UnknownProvider { provider: String },
}

impl ProviderError {
    /// Short reason slug used in [`AttemptRecord::reason`].
    pub fn reason_slug(&self) -> String {
        match self {
            Self::Transport { .. } => "transport".into(),
            Self::HttpStatus { status, .. } => format!("http_{status}"),
            Self::ParseFailed { .. } => "parse".into(),
            Self::EmptyCompletion { .. } => "empty_body".into(),
            Self::Timeout { .. } => "timeout".into(),
            Self::CircuitOpen { .. } => "circuit_open".into(),
            Self::MissingApiKey { .. } => "missing_api_key".into(),
            Self::AllProvidersExhausted { .. } => "exhausted".into(),
            Self::UnknownProvider { .. } => "unknown_provider".into(),
        }
    }
}

/// Convenience alias used throughout the provider crate.
pub type Result<T> = std::result::Result<T, ProviderError>;
