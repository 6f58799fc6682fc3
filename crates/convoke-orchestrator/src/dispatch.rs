//! Dispatching steps and agent capabilities against the core.
//!
//! [`Dispatcher`] is the single place where a tool or provider is actually
//! reached on behalf of a request.  It implements both seams:
//! [`StepDispatcher`] for the sequence runner and [`AgentServices`] for
//! agents.  Permission contracts are enforced here, on the registry access
//! path, so a denied call never touches the target component.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use convoke_agent::{
    AgentError, AgentInput, AgentOutput, AgentServices, check_subagent, check_tool,
};
use convoke_config::AgentConfig;
use convoke_provider::CompletionRequest;
use convoke_tools::{DEFAULT_STEP_TIMEOUT_MS, StepDispatcher, ToolError, validate_params};

use crate::context::CoreContext;

/// Per-request dispatcher.  `on_behalf_of` is set when a sequence runs
/// under an agent's identity, tightening tool access to its allow-list.
pub struct Dispatcher {
    core: Arc<CoreContext>,
    on_behalf_of: Option<AgentConfig>,
    trace_id: String,
}

impl Dispatcher {
    pub fn new(core: Arc<CoreContext>, trace_id: impl Into<String>) -> Self {
        Self {
            core,
            on_behalf_of: None,
            trace_id: trace_id.into(),
        }
    }

    pub fn for_agent(core: Arc<CoreContext>, agent: AgentConfig, trace_id: impl Into<String>) -> Self {
        Self {
            core,
            on_behalf_of: Some(agent),
            trace_id: trace_id.into(),
        }
    }

    /// Resolve, validate, and execute one tool call, with the tool's own
    /// deadline applied.
    pub async fn execute_tool(
        &self,
        tool_id: &str,
        action: &str,
        params: Value,
    ) -> Result<Value, ToolError> {
        let registered =
            self.core
                .tools
                .get(tool_id)
                .map_err(|e| ToolError::TargetUnavailable {
                    target: e.to_string(),
                })?;

        let validated = validate_params(&registered.config, action, &params)?;

        let deadline = Duration::from_millis(
            registered
                .config
                .constraints
                .max_execution_time_ms
                .unwrap_or(DEFAULT_STEP_TIMEOUT_MS),
        );

        let metrics = self.core.metrics.component(&format!("tool:{tool_id}"));
        let started = std::time::Instant::now();

        let result = tokio::time::timeout(deadline, registered.tool.execute(action, validated))
            .await
            .map_err(|_| ToolError::StepTimeout {
                target: tool_id.to_string(),
                after_ms: deadline.as_millis() as u64,
            })
            .and_then(|r| r);

        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => metrics.record_success(duration_ms),
            Err(_) => metrics.record_failure(duration_ms),
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Sequence steps
// ---------------------------------------------------------------------------

#[async_trait]
impl StepDispatcher for Dispatcher {
    async fn run_tool(&self, tool_id: &str, action: &str, params: Value) -> Result<Value, ToolError> {
        if let Some(agent) = &self.on_behalf_of {
            check_tool(agent, tool_id).map_err(|_| ToolError::PermissionDenied {
                agent: agent.id.clone(),
                tool: tool_id.to_string(),
            })?;
        }
        self.execute_tool(tool_id, action, params).await
    }

    async fn run_mcp(&self, provider_id: &str, params: Value) -> Result<Value, ToolError> {
        let prompt = params
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams {
                tool: provider_id.to_string(),
                reason: "mcp step params must carry a `prompt` string".into(),
            })?;

        let completion = self
            .core
            .cascade
            .complete_with(
                provider_id,
                &CompletionRequest::from_user(prompt),
                &self.trace_id,
            )
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool: provider_id.to_string(),
                reason: e.to_string(),
            })?;

        Ok(json!({
            "text": completion.text,
            "provider": completion.provider_id,
            "model": completion.model_id,
        }))
    }
}

// ---------------------------------------------------------------------------
// Agent capabilities
// ---------------------------------------------------------------------------

#[async_trait]
impl AgentServices for Dispatcher {
    async fn run_tool(
        &self,
        agent_id: &str,
        tool_id: &str,
        action: &str,
        params: Value,
    ) -> Result<Value, AgentError> {
        // The allow-list lives on the registered agent config; the registry
        // is the source of truth, not whatever the caller claims.
        let handle = self
            .core
            .agents
            .get(agent_id)
            .map_err(|e| AgentError::ExecutionFailed {
                agent: agent_id.to_string(),
                reason: e.to_string(),
            })?;
        check_tool(handle.config(), tool_id)?;

        self.execute_tool(tool_id, action, params)
            .await
            .map_err(|e| AgentError::ToolFailed {
                agent: agent_id.to_string(),
                tool: tool_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn run_sequence(
        &self,
        agent_id: &str,
        sequence_id: &str,
        input: Value,
    ) -> Result<Value, AgentError> {
        let handle = self
            .core
            .agents
            .get(agent_id)
            .map_err(|e| AgentError::ExecutionFailed {
                agent: agent_id.to_string(),
                reason: e.to_string(),
            })?;

        let sequence = self.core.sequences.get(sequence_id).ok_or_else(|| {
            AgentError::ExecutionFailed {
                agent: agent_id.to_string(),
                reason: format!("unknown sequence `{sequence_id}`"),
            }
        })?;

        // Steps run under the agent's identity: its tool allow-list applies.
        let scoped = Dispatcher::for_agent(
            Arc::clone(&self.core),
            handle.config().clone(),
            self.trace_id.clone(),
        );
        let report = self
            .core
            .runner
            .execute(sequence, input, &scoped, &self.trace_id)
            .await
            .map_err(|e| AgentError::ExecutionFailed {
                agent: agent_id.to_string(),
                reason: e.to_string(),
            })?;

        serde_json::to_value(report).map_err(|e| AgentError::ExecutionFailed {
            agent: agent_id.to_string(),
            reason: format!("report serialization failed: {e}"),
        })
    }

    async fn complete(&self, agent_id: &str, prompt: &str) -> Result<String, AgentError> {
        self.core
            .cascade
            .complete(&CompletionRequest::from_user(prompt), &self.trace_id)
            .await
            .map(|completion| completion.text)
            .map_err(|e| AgentError::CompletionFailed {
                agent: agent_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn call_subagent(
        &self,
        agent_id: &str,
        subagent_id: &str,
        input: AgentInput,
    ) -> Result<AgentOutput, AgentError> {
        let caller = self
            .core
            .agents
            .get(agent_id)
            .map_err(|e| AgentError::ExecutionFailed {
                agent: agent_id.to_string(),
                reason: e.to_string(),
            })?;
        check_subagent(caller.config(), subagent_id)?;

        let handle = self
            .core
            .agents
            .get(subagent_id)
            .map_err(|e| AgentError::ExecutionFailed {
                agent: subagent_id.to_string(),
                reason: e.to_string(),
            })?;

        let services = Dispatcher::for_agent(
            Arc::clone(&self.core),
            handle.config().clone(),
            self.trace_id.clone(),
        );
        Box::pin(handle.invoke(input, &services)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use convoke_provider::mock::MockTransport;

    const DOC: &str = r#"
        [[providers]]
        id = "main"
        type = "cloud"
        base_url = "https://api.example.com/v1"
        models = ["model-a"]

        [[tools]]
        id = "soma"
        category = "execution"

        [[tools]]
        id = "json_parser"
        category = "data"

        [[agents]]
        id = "code_analyzer"
        class = "code_analyzer"
        allowed_tools = ["soma"]
    "#;

    fn core() -> Arc<CoreContext> {
        let config = convoke_config::load_str(DOC, false).expect("loads");
        CoreContext::builder(config)
            .with_transport("main", Arc::new(MockTransport::always_ok("mock answer")))
            .build()
            .expect("builds")
    }

    #[tokio::test]
    async fn tool_execution_goes_through_validation() {
        let dispatcher = Dispatcher::new(core(), "t-1");
        let out = dispatcher
            .execute_tool("soma", "", json!({"a": 7, "b": 5}))
            .await
            .expect("executes");
        assert_eq!(out["result"], 12.0);
    }

    #[tokio::test]
    async fn agent_tool_call_outside_allow_list_is_denied() {
        let dispatcher = Dispatcher::new(core(), "t-1");
        let err = AgentServices::run_tool(
            &dispatcher,
            "code_analyzer",
            "json_parser",
            "validate",
            json!({"json": "{}"}),
        )
        .await
        .expect_err("denied");

        assert!(matches!(err, AgentError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn agent_tool_call_inside_allow_list_executes() {
        let dispatcher = Dispatcher::new(core(), "t-1");
        let out = AgentServices::run_tool(
            &dispatcher,
            "code_analyzer",
            "soma",
            "",
            json!({"a": 1, "b": 2}),
        )
        .await
        .expect("allowed");
        assert_eq!(out["result"], 3.0);
    }

    #[tokio::test]
    async fn mcp_step_returns_completion_payload() {
        let dispatcher = Dispatcher::new(core(), "t-1");
        let out = StepDispatcher::run_mcp(&dispatcher, "main", json!({"prompt": "hello"}))
            .await
            .expect("completes");
        assert_eq!(out["text"], "mock answer");
        assert_eq!(out["provider"], "main");
    }

    #[tokio::test]
    async fn sequence_step_under_agent_identity_is_scoped() {
        let core = core();
        let agent_config = core.agents.get("code_analyzer").unwrap().config().clone();
        let dispatcher = Dispatcher::for_agent(core, agent_config, "t-1");

        let err = StepDispatcher::run_tool(&dispatcher, "json_parser", "parse", json!({"json": "{}"}))
            .await
            .expect_err("denied");
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }
}
