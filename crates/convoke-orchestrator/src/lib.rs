//! convoke-orchestrator — the decision engine and request lifecycle.
//!
//! [`context::CoreContext`] holds the registries, cascade, retriever, and
//! runner built from one configuration snapshot;
//! [`chat::ChatOrchestrator`] drives a request through decision, dispatch,
//! and envelope assembly, guaranteeing exactly one [`types::ChatResponse`]
//! per accepted request.

pub mod chat;
pub mod context;
pub mod decision;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod history;
pub mod types;

pub use chat::ChatOrchestrator;
pub use context::{CoreContext, CoreContextBuilder, RegisteredTool};
pub use decision::{DecisionCacheStats, DecisionEngine};
pub use dispatch::Dispatcher;
pub use error::{OrchestratorError, Result};
pub use history::{HistoryEntry, HistoryStore, SessionBusy, SessionState};
pub use types::{
    ChatRequest, ChatResponse, Decision, ErrorInfo, MAX_MESSAGE_BYTES, Route, Strategy,
};
