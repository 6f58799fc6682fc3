//! Provider cascade.
//!
//! The cascade walks an ordered list of provider candidates until one
//! returns a non-empty completion.  Each attempt is gated by the provider's
//! circuit breaker and bounded by its per-attempt deadline; the walk as a
//! whole is bounded by an overall budget.  When every candidate fails the
//! caller receives [`ProviderError::AllProvidersExhausted`] with one record
//! per attempt.
//!
//! Ordering: the provider marked `primary` first, then cloud providers in
//! declared order, then local providers.  There is no scoring or merging —
//! the first non-empty text wins.
//!
//! Cancellation: dropping the returned future cancels the in-flight attempt
//! and the walk does not advance.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use convoke_config::{ProviderConfig, ProviderKind};
use convoke_kernel::{LogBuffer, LogCategory, LogEntry, LogLevel, MetricsHub};

use crate::breaker::{BreakerSnapshot, CircuitBreaker};
use crate::error::{AttemptRecord, ProviderError, Result};
use crate::transport::CompletionTransport;
use crate::types::{Completion, CompletionRequest};

/// Default overall budget for one cascade walk.
pub const DEFAULT_CASCADE_BUDGET_MS: u64 = 60_000;

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// One provider in the cascade: its config, transport, breaker, and health
/// bookkeeping.
pub struct ProviderCandidate {
    config: ProviderConfig,
    transport: Arc<dyn CompletionTransport>,
    breaker: CircuitBreaker,
    last_error: Mutex<Option<String>>,
    last_success_at: Mutex<Option<DateTime<Utc>>>,
}

impl ProviderCandidate {
    pub fn new(config: ProviderConfig, transport: Arc<dyn CompletionTransport>) -> Self {
        let breaker = CircuitBreaker::new(config.circuit_breaker);
        Self {
            config,
            transport,
            breaker,
            last_error: Mutex::new(None),
            last_success_at: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Model candidates in try order: the default model first when declared,
    /// then the rest of the list.
    fn models_in_order(&self) -> Vec<&str> {
        let mut models: Vec<&str> = Vec::with_capacity(self.config.models.len());
        if let Some(default) = &self.config.default_model {
            models.push(default.as_str());
        }
        for model in &self.config.models {
            if !models.contains(&model.as_str()) {
                models.push(model.as_str());
            }
        }
        models
    }
}

/// Serializable health view of one candidate, surfaced by `/health` and
/// `GET /providers`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    pub breaker: BreakerSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Cascade
// ---------------------------------------------------------------------------

/// Ordered multi-provider completion caller.
pub struct ProviderCascade {
    candidates: Vec<Arc<ProviderCandidate>>,
    logs: LogBuffer,
    metrics: MetricsHub,
    budget: Duration,
}

impl ProviderCascade {
    /// Build a cascade from candidates, applying the default ordering:
    /// primary first, then cloud providers in declared order, then local.
    pub fn new(
        candidates: Vec<ProviderCandidate>,
        logs: LogBuffer,
        metrics: MetricsHub,
        budget_ms: Option<u64>,
    ) -> Self {
        let mut candidates: Vec<Arc<ProviderCandidate>> =
            candidates.into_iter().map(Arc::new).collect();

        // Stable sort keeps declared order within each band.
        candidates.sort_by_key(|c| match (c.config.primary, c.config.kind) {
            (true, _) => 0u8,
            (false, ProviderKind::Cloud) => 1,
            (false, ProviderKind::Local) => 2,
        });

        Self {
            candidates,
            logs,
            metrics,
            budget: Duration::from_millis(budget_ms.unwrap_or(DEFAULT_CASCADE_BUDGET_MS)),
        }
    }

    /// Candidate ids in cascade order.
    pub fn order(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.id()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Health snapshot of every candidate, in cascade order.
    pub fn health(&self) -> Vec<ProviderHealth> {
        self.candidates
            .iter()
            .map(|c| ProviderHealth {
                id: c.config.id.clone(),
                kind: c.config.kind,
                breaker: c.breaker.snapshot(),
                last_error: c.last_error.lock().unwrap_or_else(|e| e.into_inner()).clone(),
                last_success_at: *c
                    .last_success_at
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()),
            })
            .collect()
    }

    /// Walk the full cascade for one completion.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        trace_id: &str,
    ) -> Result<Completion> {
        self.walk(&self.candidates, request, trace_id).await
    }

    /// Issue a completion against one specific provider (used by mcp steps
    /// and embedding-adjacent calls).  Breaker and deadline still apply.
    pub async fn complete_with(
        &self,
        provider_id: &str,
        request: &CompletionRequest,
        trace_id: &str,
    ) -> Result<Completion> {
        let candidate = self
            .candidates
            .iter()
            .find(|c| c.id() == provider_id)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider {
                provider: provider_id.to_string(),
            })?;
        self.walk(std::slice::from_ref(&candidate), request, trace_id)
            .await
    }

    // -- Walk ---------------------------------------------------------------

    async fn walk(
        &self,
        candidates: &[Arc<ProviderCandidate>],
        request: &CompletionRequest,
        trace_id: &str,
    ) -> Result<Completion> {
        let started = Instant::now();
        let mut attempts: Vec<AttemptRecord> = Vec::new();

        for candidate in candidates {
            let provider_id = candidate.id();

            if started.elapsed() >= self.budget {
                attempts.push(AttemptRecord {
                    provider_id: provider_id.to_string(),
                    model_id: String::new(),
                    reason: "budget_exceeded".into(),
                    duration_ms: 0,
                });
                break;
            }

            if !candidate.breaker.allows_attempt() {
                self.logs.push(
                    LogEntry::new(
                        LogLevel::Debug,
                        LogCategory::Circuit,
                        format!("skipping `{provider_id}`: circuit open"),
                    )
                    .with_trace(trace_id),
                );
                attempts.push(AttemptRecord {
                    provider_id: provider_id.to_string(),
                    model_id: candidate
                        .models_in_order()
                        .first()
                        .copied()
                        .unwrap_or_default()
                        .to_string(),
                    reason: "circuit_open".into(),
                    duration_ms: 0,
                });
                continue;
            }

            for model in candidate.models_in_order() {
                if started.elapsed() >= self.budget {
                    break;
                }

                match self.attempt(candidate, model, request, trace_id).await {
                    Ok(completion) => return Ok(completion),
                    Err(record) => attempts.push(record),
                }
            }
        }

        self.logs.push(
            LogEntry::new(
                LogLevel::Error,
                LogCategory::Provider,
                format!("cascade exhausted after {} attempts", attempts.len()),
            )
            .with_trace(trace_id),
        );

        Err(ProviderError::AllProvidersExhausted { attempts })
    }

    /// One model attempt against one candidate.  Success returns the
    /// completion; failure returns the attempt record after updating the
    /// breaker and health bookkeeping.
    async fn attempt(
        &self,
        candidate: &ProviderCandidate,
        model: &str,
        request: &CompletionRequest,
        trace_id: &str,
    ) -> std::result::Result<Completion, AttemptRecord> {
        let provider_id = candidate.id();
        let deadline = Duration::from_millis(candidate.config.timeout_ms);
        let metrics = self.metrics.component(&format!("provider:{provider_id}"));
        let attempt_start = Instant::now();

        let outcome = tokio::time::timeout(deadline, candidate.transport.complete(model, request))
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: provider_id.to_string(),
                after_ms: deadline.as_millis() as u64,
            })
            .and_then(|r| r)
            .and_then(|reply| {
                if reply.text.trim().is_empty() {
                    Err(ProviderError::EmptyCompletion {
                        provider: provider_id.to_string(),
                    })
                } else {
                    Ok(reply)
                }
            });

        let duration_ms = attempt_start.elapsed().as_millis() as u64;

        match outcome {
            Ok(reply) => {
                candidate.breaker.record_success();
                metrics.record_success(duration_ms);
                *candidate
                    .last_success_at
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());

                self.logs.push(
                    LogEntry::new(
                        LogLevel::Success,
                        LogCategory::Provider,
                        format!("`{provider_id}` answered with model `{model}`"),
                    )
                    .with_trace(trace_id)
                    .with_meta("duration_ms", duration_ms.into()),
                );

                Ok(Completion {
                    text: reply.text,
                    provider_id: provider_id.to_string(),
                    model_id: model.to_string(),
                    usage: reply.usage,
                })
            }
            Err(e) => {
                candidate.breaker.record_failure();
                metrics.record_failure(duration_ms);
                *candidate.last_error.lock().unwrap_or_else(|e| e.into_inner()) =
                    Some(e.to_string());

                self.logs.push(
                    LogEntry::new(
                        LogLevel::Warn,
                        LogCategory::Provider,
                        format!("`{provider_id}` attempt failed: {e}"),
                    )
                    .with_trace(trace_id)
                    .with_meta("model", model.into())
                    .with_meta("duration_ms", duration_ms.into()),
                );

                Err(AttemptRecord {
                    provider_id: provider_id.to_string(),
                    model_id: model.to_string(),
                    reason: e.reason_slug(),
                    duration_ms,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
