//! Configuration error types.
//!
//! All loading failures surface through [`ConfigError`].  Every variant is
//! fatal at startup or reload time; none are recoverable at request time.

/// Unified error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document could not be read from disk.
    #[error("config read failed for `{path}`: {reason}")]
    ReadFailed { path: String, reason: String },

    /// The document is not valid TOML/JSON.
    #[error("config parse error: {reason}")]
    ParseError { reason: String },

    /// A `${NAME}` substitution referenced an environment variable that is
    /// not set.
    #[error("environment variable not set: {name}")]
    EnvVarMissing { name: String },

    /// A section failed schema validation.
    #[error("schema error at `{path}`: {reason}")]
    SchemaError { path: String, reason: String },

    /// A component references an id that does not resolve to an enabled
    /// component of the expected kind.
    #[error("dangling reference from `{from}` to {kind} `{to}`")]
    DanglingReference {
        from: String,
        kind: &'static str,
        to: String,
    },

    /// The provider fallback graph contains a cycle; `path` traces it.
    #[error("provider fallback cycle: {path}")]
    CycleError { path: String },

    /// An invalid regular expression in a decision rule.
    #[error("invalid rule pattern `{pattern}`: {reason}")]
    InvalidRulePattern { pattern: String, reason: String },
}

/// Convenience alias used throughout the config crate.
pub type Result<T> = std::result::Result<T, ConfigError>;
