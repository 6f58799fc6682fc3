//! The chat orchestrator: one request in, exactly one response out.
//!
//! A request moves through received → decided → dispatching →
//! awaiting_component → formatting → responded, logging at each
//! transition under its trace id.  Whatever happens inside dispatch, the
//! caller gets a [`ChatResponse`]: failures are converted to a user-safe
//! envelope with the structured error attached.  A cancelled caller
//! (dropped future) produces no response at all; in-flight provider
//! attempts are cancelled with it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use convoke_agent::AgentInput;
use convoke_kernel::{LogCategory, LogEntry, LogLevel};
use convoke_provider::{ChatMessage, CompletionRequest, ProviderError, Role};
use convoke_retrieval::{RagHit, RetrievalOutcome};

use crate::context::CoreContext;
use crate::decision::DecisionEngine;
use crate::dispatch::Dispatcher;
use crate::error::{OrchestratorError, Result};
use crate::format::format_tool_result;
use crate::history::{HistoryEntry, SessionState};
use crate::types::{
    ChatRequest, ChatResponse, Decision, ErrorInfo, MAX_MESSAGE_BYTES, Route, Strategy,
};

/// Per-request wall-clock deadline.
const REQUEST_DEADLINE: Duration = Duration::from_secs(60);

/// Marks the trace `cancelled` if the request future is dropped before a
/// response was produced.  Cancellation is not an error and yields no
/// response envelope.
struct CancelMarker {
    logs: convoke_kernel::LogBuffer,
    trace_id: String,
    responded: bool,
}

impl CancelMarker {
    fn armed(logs: convoke_kernel::LogBuffer, trace_id: &str) -> Self {
        Self {
            logs,
            trace_id: trace_id.to_string(),
            responded: false,
        }
    }

    fn disarm(&mut self) {
        self.responded = true;
    }
}

impl Drop for CancelMarker {
    fn drop(&mut self) {
        if !self.responded {
            self.logs.push(
                LogEntry::new(LogLevel::Warn, LogCategory::Request, "request cancelled")
                    .with_trace(&self.trace_id),
            );
        }
    }
}

/// User-safe text for internal failures.
const INTERNAL_ERROR_TEXT: &str = "Sorry, an internal error occurred.";

/// What a successful dispatch produced, before envelope assembly.
struct DispatchOutcome {
    text: String,
    provider: Option<String>,
    tool_used: Option<String>,
    agent_used: Option<String>,
    rag_hits: Option<Vec<RagHit>>,
    /// Overrides the decision strategy (rag degraded to llm).
    strategy_override: Option<Strategy>,
}

impl DispatchOutcome {
    fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            provider: None,
            tool_used: None,
            agent_used: None,
            rag_hits: None,
            strategy_override: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Owns the request lifecycle end to end.
pub struct ChatOrchestrator {
    core: Arc<CoreContext>,
    engine: DecisionEngine,
}

impl ChatOrchestrator {
    pub fn new(core: Arc<CoreContext>) -> Result<Self> {
        let engine = DecisionEngine::new(core.config.decision.clone(), &core.config.agents)?;
        Ok(Self { core, engine })
    }

    pub fn core(&self) -> &Arc<CoreContext> {
        &self.core
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Handle one request.  Never panics; always returns an envelope.
    pub async fn handle(&self, request: ChatRequest) -> ChatResponse {
        let started = Instant::now();
        let trace_id = request
            .trace_id
            .clone()
            .unwrap_or_else(|| self.core.traces.next().to_string());

        self.core.logs.push(
            LogEntry::new(LogLevel::Info, LogCategory::Request, "request received")
                .with_trace(&trace_id)
                .with_meta("bytes", request.message.len().into()),
        );

        let mut cancel_marker = CancelMarker::armed(self.core.logs.clone(), &trace_id);

        if let Err(reason) = validate_message(&request.message) {
            cancel_marker.disarm();
            return self.respond_validation(&trace_id, started, reason);
        }

        // No session id means a transient session with no history carryover.
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

        let mut session = match self.core.history.acquire(&session_id).await {
            Ok(guard) => guard,
            Err(busy) => {
                cancel_marker.disarm();
                return self.respond_validation(&trace_id, started, busy.to_string());
            }
        };

        let decision = self
            .engine
            .decide(&request.message, Some(&self.core.cascade), &trace_id)
            .await;

        self.core.logs.push(
            LogEntry::new(
                LogLevel::Info,
                LogCategory::Decision,
                format!("decided {:?} ({})", decision.route.strategy(), decision.reasoning),
            )
            .with_trace(&trace_id)
            .with_meta("confidence", f64::from(decision.confidence).into()),
        );

        let dispatched = tokio::time::timeout(
            REQUEST_DEADLINE,
            self.dispatch(&request, &decision, &mut session, &trace_id),
        )
        .await;

        let response = match dispatched {
            Ok(Ok(outcome)) => {
                // Commands manage history themselves; chat turns append here.
                if decision.route.strategy() != Strategy::Command {
                    session.append(
                        HistoryEntry::user(&request.message),
                        self.core.history.max_turns(),
                    );
                    session.append(
                        HistoryEntry::assistant(
                            &outcome.text,
                            Some(decision.reasoning.clone()),
                            outcome.provider.clone(),
                        ),
                        self.core.history.max_turns(),
                    );
                }
                self.respond_ok(&trace_id, started, &decision, outcome)
            }
            Ok(Err(e)) => self.respond_error(&trace_id, started, &decision, e),
            Err(_) => self.respond_error(
                &trace_id,
                started,
                &decision,
                OrchestratorError::RequestTimeout {
                    after_ms: REQUEST_DEADLINE.as_millis() as u64,
                },
            ),
        };

        cancel_marker.disarm();
        self.core.logs.push(
            LogEntry::new(
                if response.ok { LogLevel::Success } else { LogLevel::Error },
                LogCategory::Response,
                format!("responded (ok = {})", response.ok),
            )
            .with_trace(&trace_id)
            .with_meta("duration_ms", response.duration_ms.into()),
        );

        response
    }

    /// Execute a configured tool sequence on behalf of the host application
    /// (no agent identity, so no tool allow-list applies).
    pub async fn run_sequence(
        &self,
        sequence_id: &str,
        input: Value,
    ) -> Result<convoke_tools::SequenceReport> {
        let sequence = self.core.sequences.get(sequence_id).ok_or_else(|| {
            OrchestratorError::Validation {
                reason: format!("unknown sequence `{sequence_id}`"),
            }
        })?;

        let trace_id = self.core.traces.next().to_string();
        let dispatcher = Dispatcher::new(Arc::clone(&self.core), &trace_id);
        let report = self
            .core
            .runner
            .execute(sequence, input, &dispatcher, &trace_id)
            .await?;
        Ok(report)
    }

    // -- Dispatch -----------------------------------------------------------

    async fn dispatch(
        &self,
        request: &ChatRequest,
        decision: &Decision,
        session: &mut SessionState,
        trace_id: &str,
    ) -> Result<DispatchOutcome> {
        self.core.logs.push(
            LogEntry::new(LogLevel::Debug, LogCategory::Request, "dispatching").with_trace(trace_id),
        );

        match &decision.route {
            Route::Command { name } => Ok(self.run_command(name, session)),
            Route::Tool {
                tool_id,
                action,
                params,
            } => self.run_tool(tool_id, action, params.clone(), trace_id).await,
            Route::Agent { agent_id } => {
                self.run_agent(agent_id, &request.message, trace_id).await
            }
            Route::Rag => self.run_rag(&request.message, session, trace_id).await,
            Route::Llm => {
                let outcome = self
                    .run_llm(&request.message, None, session, trace_id)
                    .await?;
                Ok(outcome)
            }
        }
    }

    fn run_command(&self, name: &str, session: &mut SessionState) -> DispatchOutcome {
        match name {
            "clear" => {
                session.clear();
                DispatchOutcome::text_only("Conversation history cleared.")
            }
            "history" => {
                if session.is_empty() {
                    DispatchOutcome::text_only("No conversation history yet.")
                } else {
                    let lines: Vec<String> = session
                        .entries()
                        .map(|entry| {
                            format!(
                                "[{}] {}",
                                match entry.role {
                                    Role::User => "user",
                                    Role::Assistant => "assistant",
                                    Role::System => "system",
                                },
                                entry.content
                            )
                        })
                        .collect();
                    DispatchOutcome::text_only(lines.join("\n"))
                }
            }
            "status" => {
                let breakers: Vec<String> = self
                    .core
                    .cascade
                    .health()
                    .into_iter()
                    .map(|h| format!("{}: {:?}", h.id, h.breaker.state))
                    .collect();
                DispatchOutcome::text_only(format!(
                    "providers: {} | tools: {} | agents: {} | sessions: {}\nbreakers: {}",
                    self.core.providers.size(),
                    self.core.tools.size(),
                    self.core.agents.size(),
                    self.core.history.session_count(),
                    breakers.join(", "),
                ))
            }
            "help" => DispatchOutcome::text_only(
                "Commands: /clear (forget this session), /history (show turns), \
                 /status (component summary), /help",
            ),
            other => DispatchOutcome::text_only(format!(
                "Unknown command `/{other}`. Try /help."
            )),
        }
    }

    async fn run_tool(
        &self,
        tool_id: &str,
        action: &str,
        params: Value,
        trace_id: &str,
    ) -> Result<DispatchOutcome> {
        // Deployments registering a single `calculator` still serve the
        // op-named decisions.
        let (tool_id, action) = if !self.core.tools.is_available(tool_id)
            && matches!(tool_id, "soma" | "subtracao" | "multiplicacao" | "divisao")
            && self.core.tools.is_available("calculator")
        {
            ("calculator".to_string(), tool_id.to_string())
        } else {
            (tool_id.to_string(), action.to_string())
        };

        let dispatcher = Dispatcher::new(Arc::clone(&self.core), trace_id);
        let result = dispatcher.execute_tool(&tool_id, &action, params).await?;

        self.core.logs.push(
            LogEntry::new(LogLevel::Success, LogCategory::Tool, format!("`{tool_id}` executed"))
                .with_trace(trace_id),
        );

        Ok(DispatchOutcome {
            text: format_tool_result(&tool_id, &result),
            provider: None,
            tool_used: Some(tool_id),
            agent_used: None,
            rag_hits: None,
            strategy_override: None,
        })
    }

    async fn run_agent(
        &self,
        agent_id: &str,
        message: &str,
        trace_id: &str,
    ) -> Result<DispatchOutcome> {
        let handle = self.core.agents.get(agent_id)?;
        let services = Dispatcher::new(Arc::clone(&self.core), trace_id);

        let input = AgentInput {
            message: message.to_string(),
            params: Value::Null,
            trace_id: trace_id.to_string(),
        };
        let output = handle.invoke(input, &services).await?;

        self.core.logs.push(
            LogEntry::new(LogLevel::Success, LogCategory::Agent, format!("`{agent_id}` answered"))
                .with_trace(trace_id),
        );

        Ok(DispatchOutcome {
            text: output.text,
            provider: None,
            tool_used: None,
            agent_used: Some(agent_id.to_string()),
            rag_hits: None,
            strategy_override: None,
        })
    }

    async fn run_rag(
        &self,
        message: &str,
        session: &SessionState,
        trace_id: &str,
    ) -> Result<DispatchOutcome> {
        let degrade = self.core.config.retrieval.rag_degrade_to_llm;

        let Some(retriever) = &self.core.retriever else {
            return self.degrade_or_refuse(degrade, message, session, trace_id).await;
        };

        match retriever.retrieve(message, trace_id).await {
            Ok(RetrievalOutcome::Context { hits, system_prompt }) => {
                let mut outcome = self
                    .run_llm(message, Some(system_prompt), session, trace_id)
                    .await?;
                outcome.rag_hits = Some(hits);
                Ok(outcome)
            }
            Ok(RetrievalOutcome::NoRelevantContext) => {
                self.degrade_or_refuse(degrade, message, session, trace_id).await
            }
            Err(e) => {
                if degrade {
                    self.core.logs.push(
                        LogEntry::new(
                            LogLevel::Warn,
                            LogCategory::Rag,
                            format!("retrieval failed, degrading to llm: {e}"),
                        )
                        .with_trace(trace_id),
                    );
                    let mut outcome = self.run_llm(message, None, session, trace_id).await?;
                    outcome.strategy_override = Some(Strategy::Llm);
                    Ok(outcome)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn degrade_or_refuse(
        &self,
        degrade: bool,
        message: &str,
        session: &SessionState,
        trace_id: &str,
    ) -> Result<DispatchOutcome> {
        if degrade {
            let mut outcome = self.run_llm(message, None, session, trace_id).await?;
            outcome.strategy_override = Some(Strategy::Llm);
            Ok(outcome)
        } else {
            Ok(DispatchOutcome::text_only(
                "I don't have knowledge relevant to that question.",
            ))
        }
    }

    async fn run_llm(
        &self,
        message: &str,
        system_prompt: Option<String>,
        session: &SessionState,
        trace_id: &str,
    ) -> Result<DispatchOutcome> {
        let mut messages = Vec::with_capacity(session.len() + 2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage::system(system));
        }
        for entry in session.entries() {
            messages.push(ChatMessage {
                role: entry.role,
                content: entry.content.clone(),
            });
        }
        messages.push(ChatMessage::user(message));

        self.core.logs.push(
            LogEntry::new(
                LogLevel::Debug,
                LogCategory::Llm,
                format!("awaiting completion ({} prompt messages)", messages.len()),
            )
            .with_trace(trace_id),
        );

        let completion = self
            .core
            .cascade
            .complete(
                &CompletionRequest {
                    messages,
                    model: None,
                    max_tokens: None,
                    temperature: None,
                },
                trace_id,
            )
            .await?;

        Ok(DispatchOutcome {
            text: completion.text,
            provider: Some(completion.provider_id),
            tool_used: None,
            agent_used: None,
            rag_hits: None,
            strategy_override: None,
        })
    }

    // -- Envelope assembly --------------------------------------------------

    fn respond_ok(
        &self,
        trace_id: &str,
        started: Instant,
        decision: &Decision,
        outcome: DispatchOutcome,
    ) -> ChatResponse {
        ChatResponse {
            ok: true,
            text: outcome.text,
            strategy: outcome
                .strategy_override
                .unwrap_or_else(|| decision.route.strategy()),
            confidence: decision.confidence,
            reasoning: decision.reasoning.clone(),
            provider: outcome.provider,
            tool_used: outcome.tool_used,
            agent_used: outcome.agent_used,
            rag_hits: outcome.rag_hits,
            duration_ms: started.elapsed().as_millis() as u64,
            trace_id: trace_id.to_string(),
            logs: None,
            error: None,
        }
    }

    fn respond_error(
        &self,
        trace_id: &str,
        started: Instant,
        decision: &Decision,
        error: OrchestratorError,
    ) -> ChatResponse {
        let kind = error.kind();
        let attempts = match &error {
            OrchestratorError::Provider(ProviderError::AllProvidersExhausted { attempts }) => {
                Some(attempts.clone())
            }
            _ => None,
        };

        self.core.logs.push(
            LogEntry::new(
                LogLevel::Error,
                LogCategory::Response,
                format!("dispatch failed ({kind}): {error}"),
            )
            .with_trace(trace_id),
        );

        ChatResponse {
            ok: false,
            text: INTERNAL_ERROR_TEXT.to_string(),
            strategy: Strategy::Error,
            confidence: decision.confidence,
            reasoning: decision.reasoning.clone(),
            provider: None,
            tool_used: None,
            agent_used: None,
            rag_hits: None,
            duration_ms: started.elapsed().as_millis() as u64,
            trace_id: trace_id.to_string(),
            logs: None,
            error: Some(ErrorInfo {
                kind: kind.to_string(),
                message: error.to_string(),
                attempts,
            }),
        }
    }

    fn respond_validation(
        &self,
        trace_id: &str,
        started: Instant,
        reason: String,
    ) -> ChatResponse {
        self.core.logs.push(
            LogEntry::new(LogLevel::Info, LogCategory::Request, format!("rejected: {reason}"))
                .with_trace(trace_id),
        );

        ChatResponse {
            ok: false,
            text: reason.clone(),
            strategy: Strategy::Error,
            confidence: 0.0,
            reasoning: "validation".into(),
            provider: None,
            tool_used: None,
            agent_used: None,
            rag_hits: None,
            duration_ms: started.elapsed().as_millis() as u64,
            trace_id: trace_id.to_string(),
            logs: None,
            error: Some(ErrorInfo {
                kind: "validation".into(),
                message: reason,
                attempts: None,
            }),
        }
    }
}

fn validate_message(message: &str) -> std::result::Result<(), String> {
    if message.trim().is_empty() {
        return Err("Message must not be empty.".into());
    }
    if message.len() > MAX_MESSAGE_BYTES {
        return Err(format!(
            "Message exceeds the maximum size of {MAX_MESSAGE_BYTES} bytes."
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
