//! The agent contract and lifecycle wrapper.
//!
//! An [`Agent`] is a domain specialist the orchestrator can dispatch a
//! request to.  Agents reach tools and the LLM only through
//! [`AgentServices`], the seam where the orchestrator enforces permission
//! contracts — an agent never holds a tool reference directly.
//!
//! [`AgentHandle`] wraps an instance with its config and rolling metrics
//! and drives the lifecycle: `on_init` once before first use,
//! `before_execute` / `after_execute` around every invocation, `on_destroy`
//! at shutdown.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;

use convoke_config::AgentConfig;
use convoke_kernel::{ComponentMetrics, MetricsSnapshot};

use crate::error::{AgentError, Result};

// ---------------------------------------------------------------------------
// Input / output
// ---------------------------------------------------------------------------

/// What an agent receives for one invocation.
#[derive(Debug, Clone)]
pub struct AgentInput {
    /// The raw user message (or the delegating agent's instruction).
    pub message: String,
    /// Params extracted by the decision engine, if any.
    pub params: Value,
    /// Trace id for log correlation.
    pub trace_id: String,
}

/// What an agent returns.
#[derive(Debug, Clone)]
pub struct AgentOutput {
    /// User-facing text.
    pub text: String,
    /// Structured payload for downstream consumers, if any.
    pub data: Option<Value>,
}

impl AgentOutput {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Services seam
// ---------------------------------------------------------------------------

/// Capabilities the orchestrator grants an agent.
///
/// Every call carries the agent id so the implementation can consult the
/// agent's `allowed_tools` / `allowed_subagents` and permission bits before
/// dispatching.  A denied call surfaces as
/// [`AgentError::PermissionDenied`] without reaching the target.
#[async_trait]
pub trait AgentServices: Send + Sync {
    /// Execute a registered tool on behalf of `agent_id`.
    async fn run_tool(
        &self,
        agent_id: &str,
        tool_id: &str,
        action: &str,
        params: Value,
    ) -> Result<Value>;

    /// Run an LLM completion through the provider cascade.
    async fn complete(&self, agent_id: &str, prompt: &str) -> Result<String>;

    /// Execute a configured tool sequence under the agent's identity; every
    /// tool step is checked against the agent's allow-list.  The default
    /// implementation reports sequences as unavailable for hosts that do
    /// not wire an executor.
    async fn run_sequence(
        &self,
        agent_id: &str,
        sequence_id: &str,
        _input: Value,
    ) -> Result<Value> {
        Err(AgentError::ExecutionFailed {
            agent: agent_id.to_string(),
            reason: format!("sequence `{sequence_id}` is not available"),
        })
    }

    /// Delegate to another agent.
    async fn call_subagent(
        &self,
        agent_id: &str,
        subagent_id: &str,
        input: AgentInput,
    ) -> Result<AgentOutput>;
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// A domain agent.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique identifier (matches the config id).
    fn id(&self) -> &str;

    /// One-time setup.  Called before first use; must be safe to call again
    /// after a failure.
    async fn on_init(&self) -> Result<()> {
        Ok(())
    }

    /// Hook invoked before every execution.
    async fn before_execute(&self, _input: &AgentInput) -> Result<()> {
        Ok(())
    }

    /// Handle one invocation.
    async fn execute(&self, input: AgentInput, services: &dyn AgentServices)
    -> Result<AgentOutput>;

    /// Hook invoked after every successful execution.
    async fn after_execute(&self, _output: &AgentOutput) -> Result<()> {
        Ok(())
    }

    /// Teardown at shutdown.
    async fn on_destroy(&self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A registered agent instance plus its config and rolling metrics.
pub struct AgentHandle {
    config: AgentConfig,
    agent: Arc<dyn Agent>,
    metrics: Arc<ComponentMetrics>,
    init: OnceCell<()>,
}

impl AgentHandle {
    pub fn new(config: AgentConfig, agent: Arc<dyn Agent>) -> Self {
        Self {
            config,
            agent,
            metrics: Arc::new(ComponentMetrics::new()),
            init: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Run the full lifecycle for one invocation: lazy `on_init`, the
    /// before/after hooks, and metrics recording.
    pub async fn invoke(
        &self,
        input: AgentInput,
        services: &dyn AgentServices,
    ) -> Result<AgentOutput> {
        self.init
            .get_or_try_init(|| async {
                tracing::debug!(agent = %self.config.id, "agent on_init");
                self.agent.on_init().await
            })
            .await?;

        let started = std::time::Instant::now();
        self.agent.before_execute(&input).await?;

        let result = self.agent.execute(input, services).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                self.agent.after_execute(&output).await?;
                self.metrics.record_success(duration_ms);
                Ok(output)
            }
            Err(e) => {
                self.metrics.record_failure(duration_ms);
                Err(e)
            }
        }
    }

    /// Run `on_destroy`, swallowing nothing: callers decide what to do with
    /// teardown failures.
    pub async fn destroy(&self) -> Result<()> {
        tracing::debug!(agent = %self.config.id, "agent on_destroy");
        self.agent.on_destroy().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
