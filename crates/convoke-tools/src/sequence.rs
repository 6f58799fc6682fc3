//! Tool sequence compilation and execution.
//!
//! A [`CompiledSequence`] is built once at config load: step params are
//! template-compiled, placeholder roots are checked against step ordering,
//! and steps are sorted.  At request time the [`SequenceRunner`] executes
//! steps against a context map seeded with `input` and extended with
//! `stepN` after each recorded result, routing success and failure through
//! the per-step policies.
//!
//! Dispatching is abstracted behind [`StepDispatcher`] so the executor does
//! not know about registries or the provider cascade; the orchestrator
//! supplies an implementation that also enforces agent permissions.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value, json};

use convoke_config::{
    ErrorStrategy, OnError, OnSuccess, RetryConfig, SequenceBreakerConfig, SequenceConfig,
};
use convoke_kernel::{LogBuffer, LogCategory, LogEntry, LogLevel, MetricsHub};

use crate::error::{Result, ToolError};
use crate::template::Template;

/// Default per-step deadline when the tool declares none.
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;

/// Cap on exponential backoff between retries.
const MAX_BACKOFF_MS: u64 = 30_000;

// ---------------------------------------------------------------------------
// Compiled form
// ---------------------------------------------------------------------------

/// What a step invokes.
#[derive(Debug, Clone)]
pub enum StepTarget {
    /// A registered deterministic tool.
    Tool { tool_id: String },
    /// A specific LLM provider, optionally with a fallback provider.
    Mcp {
        provider_id: String,
        fallback: Option<String>,
    },
}

impl StepTarget {
    /// The id used in logs and reports.
    pub fn id(&self) -> &str {
        match self {
            Self::Tool { tool_id } => tool_id,
            Self::Mcp { provider_id, .. } => provider_id,
        }
    }
}

/// A param value with its templates pre-parsed.
#[derive(Debug, Clone)]
enum CompiledValue {
    Literal(Value),
    Template(Template),
    Array(Vec<CompiledValue>),
    Object(BTreeMap<String, CompiledValue>),
}

impl CompiledValue {
    fn compile(value: &Value) -> Result<Self> {
        Ok(match value {
            Value::String(s) => {
                let template = Template::parse(s)?;
                if template.has_placeholders() {
                    Self::Template(template)
                } else {
                    // Render once now so `$${` escapes are resolved.
                    Self::Literal(template.render(&Value::Null).unwrap_or_else(|_| value.clone()))
                }
            }
            Value::Array(items) => {
                Self::Array(items.iter().map(Self::compile).collect::<Result<_>>()?)
            }
            Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), Self::compile(v)?)))
                    .collect::<Result<_>>()?,
            ),
            other => Self::Literal(other.clone()),
        })
    }

    fn roots(&self, out: &mut Vec<String>) {
        match self {
            Self::Template(t) => out.extend(t.roots().iter().map(|r| r.to_string())),
            Self::Array(items) => items.iter().for_each(|v| v.roots(out)),
            Self::Object(map) => map.values().for_each(|v| v.roots(out)),
            Self::Literal(_) => {}
        }
    }

    fn render(&self, ctx: &Value) -> Result<Value> {
        Ok(match self {
            Self::Literal(v) => v.clone(),
            Self::Template(t) => t.render(ctx)?,
            Self::Array(items) => {
                Value::Array(items.iter().map(|v| v.render(ctx)).collect::<Result<_>>()?)
            }
            Self::Object(map) => {
                let mut out = Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), v.render(ctx)?);
                }
                Value::Object(out)
            }
        })
    }
}

/// One compiled step.
#[derive(Debug, Clone)]
pub struct CompiledStep {
    pub order: u32,
    pub target: StepTarget,
    pub action: String,
    params: BTreeMap<String, CompiledValue>,
    pub on_success: OnSuccess,
    pub on_error: OnError,
}

/// A compiled, validated sequence ready for execution.
#[derive(Debug, Clone)]
pub struct CompiledSequence {
    pub id: String,
    pub steps: Vec<CompiledStep>,
    pub error_strategy: ErrorStrategy,
    pub retry: RetryConfig,
    pub breaker: Option<SequenceBreakerConfig>,
}

/// Compile a sequence config: parse every template, sort steps, and verify
/// that placeholders reference only `input` or strictly earlier steps.
pub fn compile(config: &SequenceConfig) -> Result<CompiledSequence> {
    let mut steps: Vec<CompiledStep> = Vec::with_capacity(config.steps.len());
    let mut seen_orders: BTreeSet<u32> = BTreeSet::new();

    let mut sorted = config.steps.clone();
    sorted.sort_by_key(|s| s.order);

    for step in &sorted {
        if !seen_orders.insert(step.order) {
            return Err(ToolError::InvalidParams {
                tool: config.id.clone(),
                reason: format!("duplicate step order {}", step.order),
            });
        }

        let target = match (&step.tool, &step.mcp) {
            (Some(tool_id), None) => StepTarget::Tool {
                tool_id: tool_id.clone(),
            },
            (None, Some(provider_id)) => StepTarget::Mcp {
                provider_id: provider_id.clone(),
                fallback: step.fallback_mcp.clone(),
            },
            _ => {
                return Err(ToolError::InvalidParams {
                    tool: config.id.clone(),
                    reason: format!("step {} must name exactly one of tool/mcp", step.order),
                });
            }
        };

        let mut params = BTreeMap::new();
        for (name, value) in &step.params {
            params.insert(name.clone(), CompiledValue::compile(value)?);
        }

        // Placeholders may only look backwards.
        let mut roots = Vec::new();
        for value in params.values() {
            value.roots(&mut roots);
        }
        for root in roots {
            if root == "input" {
                continue;
            }
            let valid_prior = root
                .strip_prefix("step")
                .and_then(|n| n.parse::<u32>().ok())
                .map(|n| n < step.order && seen_orders.contains(&n))
                .unwrap_or(false);
            if !valid_prior {
                return Err(ToolError::InvalidParams {
                    tool: config.id.clone(),
                    reason: format!(
                        "step {} references `{root}` which is not `input` or a prior step",
                        step.order
                    ),
                });
            }
        }

        steps.push(CompiledStep {
            order: step.order,
            target,
            action: step.action.clone(),
            params,
            on_success: step.on_success,
            on_error: step.on_error,
        });
    }

    Ok(CompiledSequence {
        id: config.id.clone(),
        steps,
        error_strategy: config.error_strategy,
        retry: config.retry,
        breaker: config.circuit_breaker,
    })
}

// ---------------------------------------------------------------------------
// Dispatch seam
// ---------------------------------------------------------------------------

/// Executes one step target.  Implemented by the orchestrator over its
/// registries and the provider cascade; permission checks live there.
#[async_trait]
pub trait StepDispatcher: Send + Sync {
    async fn run_tool(&self, tool_id: &str, action: &str, params: Value) -> Result<Value>;

    /// `params` carries the rendered prompt under the `prompt` key.
    async fn run_mcp(&self, provider_id: &str, params: Value) -> Result<Value>;
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of one executed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub order: u32,
    pub target: String,
    pub action: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the result was recorded under `stepN` for later steps.
    pub recorded: bool,
    pub duration_ms: u64,
}

/// Outcome of a whole sequence run.
#[derive(Debug, Clone, Serialize)]
pub struct SequenceReport {
    pub sequence_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<u32>,
    pub steps: Vec<StepOutcome>,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SeqBreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Executes compiled sequences.
pub struct SequenceRunner {
    logs: LogBuffer,
    metrics: MetricsHub,
    breakers: DashMap<String, SeqBreakerState>,
}

impl SequenceRunner {
    pub fn new(logs: LogBuffer, metrics: MetricsHub) -> Self {
        Self {
            logs,
            metrics,
            breakers: DashMap::new(),
        }
    }

    /// Run a sequence against `input`.
    pub async fn execute(
        &self,
        sequence: &CompiledSequence,
        input: Value,
        dispatcher: &dyn StepDispatcher,
        trace_id: &str,
    ) -> Result<SequenceReport> {
        self.check_breaker(sequence)?;

        let started = Instant::now();
        let metrics = self.metrics.component(&format!("sequence:{}", sequence.id));

        let mut ctx = json!({ "input": input });
        let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(sequence.steps.len());
        let mut stopped_at: Option<u32> = None;

        self.logs.push(
            LogEntry::new(
                LogLevel::Info,
                LogCategory::Tool,
                format!("sequence `{}` started ({} steps)", sequence.id, sequence.steps.len()),
            )
            .with_trace(trace_id),
        );

        for step in &sequence.steps {
            let step_started = Instant::now();
            let result = self.run_step(sequence, step, &ctx, dispatcher).await;
            let duration_ms = step_started.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    let mut recorded = false;
                    match step.on_success {
                        OnSuccess::Continue | OnSuccess::Stop => {
                            ctx[format!("step{}", step.order)] = output.clone();
                            recorded = true;
                        }
                        OnSuccess::Skip => {}
                    }

                    outcomes.push(StepOutcome {
                        order: step.order,
                        target: step.target.id().to_string(),
                        action: step.action.clone(),
                        ok: true,
                        output: Some(output),
                        error: None,
                        recorded,
                        duration_ms,
                    });

                    if step.on_success == OnSuccess::Stop {
                        stopped_at = Some(step.order);
                        break;
                    }
                }
                Err(e) => {
                    let policy = effective_on_error(sequence.error_strategy, step.on_error);
                    let level = if policy == OnError::Continue {
                        LogLevel::Info
                    } else {
                        LogLevel::Warn
                    };
                    self.logs.push(
                        LogEntry::new(
                            level,
                            LogCategory::Tool,
                            format!("step {} of `{}` failed: {e}", step.order, sequence.id),
                        )
                        .with_trace(trace_id),
                    );

                    outcomes.push(StepOutcome {
                        order: step.order,
                        target: step.target.id().to_string(),
                        action: step.action.clone(),
                        ok: false,
                        output: None,
                        error: Some(e.to_string()),
                        recorded: false,
                        duration_ms,
                    });

                    match policy {
                        OnError::Continue | OnError::LogWarning => {}
                        // Fallback exhaustion and stop behave the same here:
                        // run_step already tried the fallback provider.
                        OnError::Stop | OnError::Fallback => {
                            stopped_at = Some(step.order);
                            break;
                        }
                    }
                }
            }
        }

        let ok = outcomes.iter().all(|o| o.ok);
        let duration_ms = started.elapsed().as_millis() as u64;

        if ok {
            metrics.record_success(duration_ms);
            self.record_breaker(sequence, true);
        } else {
            metrics.record_failure(duration_ms);
            self.record_breaker(sequence, false);
        }

        self.logs.push(
            LogEntry::new(
                if ok { LogLevel::Success } else { LogLevel::Warn },
                LogCategory::Tool,
                format!("sequence `{}` finished (ok = {ok})", sequence.id),
            )
            .with_trace(trace_id)
            .with_meta("duration_ms", duration_ms.into()),
        );

        Ok(SequenceReport {
            sequence_id: sequence.id.clone(),
            ok,
            stopped_at,
            steps: outcomes,
            duration_ms,
        })
    }

    /// Render params and dispatch one step, applying retries and the mcp
    /// fallback provider.
    async fn run_step(
        &self,
        sequence: &CompiledSequence,
        step: &CompiledStep,
        ctx: &Value,
        dispatcher: &dyn StepDispatcher,
    ) -> Result<Value> {
        // Template failures are deterministic; retrying cannot help.
        let params = {
            let mut out = Map::new();
            for (name, value) in &step.params {
                out.insert(name.clone(), value.render(ctx)?);
            }
            Value::Object(out)
        };

        let retries = if retry_applies(sequence, step) {
            sequence.retry.max_retries
        } else {
            0
        };

        let mut attempt = 0u32;
        loop {
            let result = self.dispatch(step, &params, dispatcher).await;
            match result {
                Ok(output) => return Ok(output),
                Err(e) if attempt < retries => {
                    let backoff = backoff_for(&sequence.retry, attempt);
                    tracing::debug!(
                        sequence = %sequence.id,
                        step = step.order,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "retrying step"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    // Last resort for mcp steps: the declared fallback provider.
                    if let StepTarget::Mcp {
                        fallback: Some(fallback),
                        ..
                    } = &step.target
                    {
                        if step.on_error == OnError::Fallback {
                            return self.dispatch_mcp(fallback, &params, dispatcher).await;
                        }
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn dispatch(
        &self,
        step: &CompiledStep,
        params: &Value,
        dispatcher: &dyn StepDispatcher,
    ) -> Result<Value> {
        let deadline = Duration::from_millis(DEFAULT_STEP_TIMEOUT_MS);
        let target = step.target.id().to_string();

        let fut = async {
            match &step.target {
                StepTarget::Tool { tool_id } => {
                    dispatcher
                        .run_tool(tool_id, &step.action, params.clone())
                        .await
                }
                StepTarget::Mcp { provider_id, .. } => {
                    dispatcher.run_mcp(provider_id, params.clone()).await
                }
            }
        };

        tokio::time::timeout(deadline, fut)
            .await
            .map_err(|_| ToolError::StepTimeout {
                target,
                after_ms: deadline.as_millis() as u64,
            })?
    }

    async fn dispatch_mcp(
        &self,
        provider_id: &str,
        params: &Value,
        dispatcher: &dyn StepDispatcher,
    ) -> Result<Value> {
        let deadline = Duration::from_millis(DEFAULT_STEP_TIMEOUT_MS);
        tokio::time::timeout(deadline, dispatcher.run_mcp(provider_id, params.clone()))
            .await
            .map_err(|_| ToolError::StepTimeout {
                target: provider_id.to_string(),
                after_ms: deadline.as_millis() as u64,
            })?
    }

    // -- Sequence breaker ---------------------------------------------------

    fn check_breaker(&self, sequence: &CompiledSequence) -> Result<()> {
        let Some(config) = &sequence.breaker else {
            return Ok(());
        };

        let mut state = self.breakers.entry(sequence.id.clone()).or_default();
        if let Some(opened_at) = state.opened_at {
            if opened_at.elapsed() < Duration::from_millis(config.timeout_ms) {
                self.logs.log(
                    LogLevel::Warn,
                    LogCategory::Circuit,
                    format!("sequence `{}` short-circuited", sequence.id),
                );
                return Err(ToolError::SequenceCircuitOpen {
                    sequence: sequence.id.clone(),
                });
            }
            // Timeout elapsed: admit runs again.
            state.opened_at = None;
            state.consecutive_failures = 0;
        }
        Ok(())
    }

    fn record_breaker(&self, sequence: &CompiledSequence, ok: bool) {
        let Some(config) = &sequence.breaker else {
            return;
        };

        let mut state = self.breakers.entry(sequence.id.clone()).or_default();
        if ok {
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures += 1;
            if state.consecutive_failures >= config.failure_threshold && state.opened_at.is_none() {
                state.opened_at = Some(Instant::now());
                tracing::warn!(sequence = %sequence.id, "sequence circuit opened");
            }
        }
    }
}

fn effective_on_error(strategy: ErrorStrategy, on_error: OnError) -> OnError {
    match (strategy, on_error) {
        (ErrorStrategy::ContinueOnError, OnError::Stop) => OnError::Continue,
        _ => on_error,
    }
}

fn retry_applies(sequence: &CompiledSequence, step: &CompiledStep) -> bool {
    if !sequence.retry.enabled {
        return false;
    }
    match sequence.error_strategy {
        ErrorStrategy::RetryAll => true,
        _ => matches!(step.on_error, OnError::Stop | OnError::LogWarning),
    }
}

fn backoff_for(retry: &RetryConfig, attempt: u32) -> Duration {
    let ms = if retry.exponential_backoff {
        retry
            .backoff_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(MAX_BACKOFF_MS)
    } else {
        retry.backoff_ms
    };
    Duration::from_millis(ms)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use convoke_config::StepConfig;
    use std::sync::Mutex;

    /// Scripted dispatcher: tool ids ending in `_fail` error out; others echo
    /// their params.  Mcp targets answer with a fixed completion.
    struct ScriptedDispatcher {
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedDispatcher {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StepDispatcher for ScriptedDispatcher {
        async fn run_tool(&self, tool_id: &str, action: &str, params: Value) -> Result<Value> {
            self.calls.lock().unwrap().push(format!("tool:{tool_id}"));
            if tool_id.ends_with("_fail") {
                return Err(ToolError::ExecutionFailed {
                    tool: tool_id.to_string(),
                    reason: "scripted failure".into(),
                });
            }
            Ok(json!({"action": action, "params": params}))
        }

        async fn run_mcp(&self, provider_id: &str, _params: Value) -> Result<Value> {
            self.calls.lock().unwrap().push(format!("mcp:{provider_id}"));
            if provider_id.ends_with("_fail") {
                return Err(ToolError::ExecutionFailed {
                    tool: provider_id.to_string(),
                    reason: "scripted failure".into(),
                });
            }
            Ok(json!({"text": format!("answer from {provider_id}")}))
        }
    }

    fn step(order: u32, tool: &str, params: Value) -> StepConfig {
        StepConfig {
            order,
            tool: Some(tool.into()),
            mcp: None,
            action: "run".into(),
            params: match params {
                Value::Object(map) => map.into_iter().collect(),
                _ => BTreeMap::new(),
            },
            on_success: OnSuccess::Continue,
            on_error: OnError::Stop,
            fallback_mcp: None,
        }
    }

    fn sequence(id: &str, steps: Vec<StepConfig>) -> SequenceConfig {
        SequenceConfig {
            id: id.into(),
            enabled: true,
            description: String::new(),
            steps,
            error_strategy: ErrorStrategy::FailFast,
            retry: RetryConfig::default(),
            circuit_breaker: None,
        }
    }

    fn runner() -> SequenceRunner {
        SequenceRunner::new(LogBuffer::new(128), MetricsHub::new())
    }

    #[tokio::test]
    async fn results_chain_between_steps() {
        let config = sequence(
            "chained",
            vec![
                step(1, "alpha", json!({"src": "${input.path}"})),
                step(2, "beta", json!({"prior": "${step1.params.src}"})),
            ],
        );
        let compiled = compile(&config).expect("compiles");
        let dispatcher = ScriptedDispatcher::new();

        let report = runner()
            .execute(&compiled, json!({"path": "/tmp/a.csv"}), &dispatcher, "t-1")
            .await
            .expect("runs");

        assert!(report.ok);
        assert_eq!(report.steps.len(), 2);
        assert_eq!(
            report.steps[1].output.as_ref().unwrap()["params"]["prior"],
            "/tmp/a.csv"
        );
    }

    #[tokio::test]
    async fn stop_on_error_leaves_later_steps_unexecuted() {
        let config = sequence(
            "stops",
            vec![
                step(1, "alpha", json!({})),
                step(2, "beta_fail", json!({})),
                step(3, "gamma", json!({})),
            ],
        );
        let compiled = compile(&config).expect("compiles");
        let dispatcher = ScriptedDispatcher::new();

        let report = runner()
            .execute(&compiled, json!({}), &dispatcher, "t-1")
            .await
            .expect("runs");

        assert!(!report.ok);
        assert_eq!(report.stopped_at, Some(2));
        assert_eq!(report.steps.len(), 2);
        assert_eq!(dispatcher.calls(), vec!["tool:alpha", "tool:beta_fail"]);
    }

    #[tokio::test]
    async fn continue_on_error_strategy_overrides_stop() {
        let mut config = sequence(
            "tolerant",
            vec![
                step(1, "alpha_fail", json!({})),
                step(2, "beta", json!({})),
            ],
        );
        config.error_strategy = ErrorStrategy::ContinueOnError;
        let compiled = compile(&config).expect("compiles");
        let dispatcher = ScriptedDispatcher::new();

        let report = runner()
            .execute(&compiled, json!({}), &dispatcher, "t-1")
            .await
            .expect("runs");

        assert!(!report.ok);
        assert!(report.stopped_at.is_none());
        assert_eq!(report.steps.len(), 2);
        assert!(report.steps[1].ok);
    }

    #[tokio::test]
    async fn skipped_step_leaves_no_slot() {
        let mut steps = vec![
            step(1, "alpha", json!({})),
            step(2, "beta", json!({"prior": "${step1.action}"})),
        ];
        steps[0].on_success = OnSuccess::Skip;
        let config = sequence("skipper", steps);
        let compiled = compile(&config).expect("compiles");
        let dispatcher = ScriptedDispatcher::new();

        let report = runner()
            .execute(&compiled, json!({}), &dispatcher, "t-1")
            .await
            .expect("runs");

        // Step 2's placeholder references the skipped slot: TemplateError
        // routed through on_error = stop.
        assert!(!report.ok);
        assert_eq!(report.stopped_at, Some(2));
        assert!(report.steps[1].error.as_ref().unwrap().contains("step1"));
    }

    #[tokio::test]
    async fn retry_exhausts_then_policy_applies() {
        let mut config = sequence("retried", vec![step(1, "alpha_fail", json!({}))]);
        config.retry = RetryConfig {
            enabled: true,
            max_retries: 2,
            backoff_ms: 1,
            exponential_backoff: false,
        };
        let compiled = compile(&config).expect("compiles");
        let dispatcher = ScriptedDispatcher::new();

        let report = runner()
            .execute(&compiled, json!({}), &dispatcher, "t-1")
            .await
            .expect("runs");

        assert!(!report.ok);
        // 1 initial + 2 retries.
        assert_eq!(dispatcher.calls().len(), 3);
    }

    #[tokio::test]
    async fn mcp_fallback_provider_is_used() {
        let config = sequence(
            "fallback",
            vec![StepConfig {
                order: 1,
                tool: None,
                mcp: Some("primary_fail".into()),
                action: "complete".into(),
                params: BTreeMap::from([("prompt".to_string(), json!("hello"))]),
                on_success: OnSuccess::Continue,
                on_error: OnError::Fallback,
                fallback_mcp: Some("backup".into()),
            }],
        );
        let compiled = compile(&config).expect("compiles");
        let dispatcher = ScriptedDispatcher::new();

        let report = runner()
            .execute(&compiled, json!({}), &dispatcher, "t-1")
            .await
            .expect("runs");

        assert!(report.ok);
        assert_eq!(dispatcher.calls(), vec!["mcp:primary_fail", "mcp:backup"]);
        assert_eq!(
            report.steps[0].output.as_ref().unwrap()["text"],
            "answer from backup"
        );
    }

    #[tokio::test]
    async fn sequence_breaker_short_circuits() {
        let mut config = sequence("flaky", vec![step(1, "alpha_fail", json!({}))]);
        config.circuit_breaker = Some(SequenceBreakerConfig {
            failure_threshold: 2,
            timeout_ms: 60_000,
        });
        let compiled = compile(&config).expect("compiles");
        let dispatcher = ScriptedDispatcher::new();
        let runner = runner();

        for _ in 0..2 {
            let report = runner
                .execute(&compiled, json!({}), &dispatcher, "t-1")
                .await
                .expect("runs");
            assert!(!report.ok);
        }

        let err = runner
            .execute(&compiled, json!({}), &dispatcher, "t-1")
            .await
            .expect_err("short-circuited");
        assert!(matches!(err, ToolError::SequenceCircuitOpen { .. }));
        assert_eq!(dispatcher.calls().len(), 2);
    }

    #[test]
    fn compile_rejects_forward_references() {
        let config = sequence(
            "forward",
            vec![
                step(1, "alpha", json!({"next": "${step2.x}"})),
                step(2, "beta", json!({})),
            ],
        );
        let err = compile(&config).expect_err("forward reference");
        assert!(err.to_string().contains("step2"));
    }

    #[test]
    fn compile_rejects_duplicate_orders() {
        let config = sequence(
            "dupes",
            vec![step(1, "alpha", json!({})), step(1, "beta", json!({}))],
        );
        assert!(compile(&config).is_err());
    }

    #[test]
    fn backoff_caps_exponential_growth() {
        let retry = RetryConfig {
            enabled: true,
            max_retries: 10,
            backoff_ms: 500,
            exponential_backoff: true,
        };
        assert_eq!(backoff_for(&retry, 0), Duration::from_millis(500));
        assert_eq!(backoff_for(&retry, 1), Duration::from_millis(1_000));
        assert_eq!(backoff_for(&retry, 10), Duration::from_millis(MAX_BACKOFF_MS));
    }
}
