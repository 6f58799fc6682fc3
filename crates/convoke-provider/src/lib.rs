//! convoke-provider — the multi-provider LLM cascade.
//!
//! This crate owns failure handling for LLM calls: each configured provider
//! gets a transport and a circuit breaker, and [`cascade::ProviderCascade`]
//! walks them in order until one returns a non-empty completion.  Callers
//! never see individual attempt errors, only a completion or a structured
//! exhaustion report.

pub mod breaker;
pub mod cascade;
pub mod error;
pub mod mock;
pub mod streaming;
pub mod transport;
pub mod types;

pub use breaker::{BreakerSnapshot, BreakerState, CircuitBreaker};
pub use cascade::{DEFAULT_CASCADE_BUDGET_MS, ProviderCandidate, ProviderCascade, ProviderHealth};
pub use error::{AttemptRecord, ProviderError, Result};
pub use streaming::{LineFeed, SseParser, StreamAccumulator, StreamEvent};
pub use transport::{CompletionTransport, HttpTransport};
pub use types::{ChatMessage, Completion, CompletionRequest, Role, TransportReply, Usage};
