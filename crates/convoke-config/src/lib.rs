//! convoke-config — declarative configuration for the convoke core.
//!
//! The whole gateway is described by one TOML/JSON document.  Loading runs
//! four phases: parse, `${NAME}` env substitution, typed deserialization
//! with defaults, and cross-reference validation (dangling ids, provider
//! fallback cycles, step target arity).  Every failure is fatal at load
//! time; nothing in this crate is consulted per request beyond reading the
//! immutable [`CoreConfig`] snapshot.

pub mod document;
pub mod env;
pub mod error;
pub mod loader;
pub mod reload;
pub mod validate;

pub use document::{
    ActionSpec, AgentConfig, AgentPermissions, AgentRouting, BreakerConfig, BusyPolicy,
    CoreConfig, DecisionConfig, DistanceMetric, ErrorStrategy, HistoryConfig,
    KnowledgeBaseConfig, LoggingConfig, OnError, OnSuccess, ParamSpec, ParamType,
    ProviderConfig, ProviderKind, RetrievalConfig, RetryConfig, RuleConfig, RuleStrategy,
    SequenceBreakerConfig, SequenceConfig, StepConfig, SystemConfig, ToolCategory,
    ToolConfig, ToolConstraints, WireFormat,
};
pub use error::{ConfigError, Result};
pub use loader::{load_path, load_str};
pub use reload::{ConfigHandle, watch};
