//! convoke-agent — domain agents for the convoke core.
//!
//! Agents are instantiated from configuration through an explicit
//! [`factory::FactoryRegistry`], wrapped in [`traits::AgentHandle`] for
//! lifecycle and metrics, and reach tools, the LLM, and each other only
//! through [`traits::AgentServices`], where the orchestrator enforces the
//! per-agent permission contracts.

pub mod builtin;
pub mod error;
pub mod factory;
pub mod permissions;
pub mod traits;

pub use builtin::{CodeAnalyzer, DataProcessor, TaskManager};
pub use error::{AgentError, Result};
pub use factory::{AgentFactory, FactoryRegistry};
pub use permissions::{check_subagent, check_tool};
pub use traits::{Agent, AgentHandle, AgentInput, AgentOutput, AgentServices};
