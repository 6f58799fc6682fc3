//! Typed configuration document.
//!
//! The whole core is instantiated from a single declarative document
//! (TOML or JSON, chosen by file extension).  This module holds the serde
//! types for every section, with defaults applied during deserialization so
//! downstream code never sees a missing knob.
//!
//! Ordering matters for `providers` (cascade order) and `decision.rules`
//! (first match wins), so both are arrays rather than maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

/// The fully parsed, substituted, validated configuration record.
///
/// Immutable after load; hot reload swaps a whole new instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub knowledge_bases: Vec<KnowledgeBaseConfig>,
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub tool_sequences: Vec<SequenceConfig>,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Top-level system identity and flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_system_name")]
    pub name: String,
    #[serde(default = "default_system_version")]
    pub version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    /// When set, validation warnings become hard errors.
    #[serde(default)]
    pub strict: bool,
    /// Watch the config file and swap snapshots on change.
    #[serde(default)]
    pub hot_reload: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: default_system_name(),
            version: default_system_version(),
            environment: default_environment(),
            strict: false,
            hot_reload: false,
        }
    }
}

fn default_system_name() -> String {
    "convoke".into()
}

fn default_system_version() -> String {
    "0.0.0".into()
}

fn default_environment() -> String {
    "development".into()
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Where a provider runs.  Local providers sort last in the default cascade
/// order and typically need no API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Local,
    Cloud,
}

/// Which wire format the provider speaks.  Adapters translate the core's
/// provider-agnostic request into this shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// `POST {base}/chat/completions`, OpenAI-compatible (also Ollama).
    OpenAi,
    /// `POST {base}/v1/messages`, Anthropic Messages API.
    Anthropic,
}

/// Circuit breaker thresholds for one provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            open_timeout_ms: default_open_timeout_ms(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_open_timeout_ms() -> u64 {
    30_000
}

/// A single LLM provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    #[serde(default = "default_wire")]
    pub wire: WireFormat,
    pub base_url: String,
    /// Candidate model ids, tried in order within this provider.
    pub models: Vec<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    /// Name of the environment variable holding the API key.  Empty for
    /// local providers.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Hoisted to the front of the cascade when set.
    #[serde(default)]
    pub primary: bool,
    /// Per-attempt deadline.
    #[serde(default = "default_attempt_timeout_ms")]
    pub timeout_ms: u64,
    /// Request a streaming response; the core still consumes it whole.
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub circuit_breaker: BreakerConfig,
    /// Next provider to try when this one fails; the resulting graph must be
    /// acyclic.
    #[serde(default)]
    pub fallback_provider: Option<String>,
}

fn default_wire() -> WireFormat {
    WireFormat::OpenAi
}

fn default_attempt_timeout_ms() -> u64 {
    15_000
}

// ---------------------------------------------------------------------------
// Knowledge bases
// ---------------------------------------------------------------------------

/// Distance metric used by the backing vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Dot,
    Euclidean,
}

/// A vector knowledge base plus the embedding model that feeds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub url: String,
    pub dimension: usize,
    #[serde(default = "default_distance")]
    pub distance: DistanceMetric,
    /// Provider id used for embedding calls.
    pub embedding_provider: String,
    pub embedding_model: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
}

fn default_distance() -> DistanceMetric {
    DistanceMetric::Cosine
}

fn default_top_k() -> usize {
    5
}

fn default_score_threshold() -> f32 {
    0.7
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Tool category, used for grouping and constraint defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Execution,
    File,
    Api,
    Data,
    System,
    Web,
    Io,
}

/// Primitive type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

/// Declared schema for one tool parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub kind: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Allowed values, when the parameter is an enumeration.
    #[serde(default, rename = "enum")]
    pub one_of: Vec<serde_json::Value>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

/// A named action exposing a subset of the tool's parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(default)]
    pub params: Vec<String>,
}

/// Execution constraints enforced around every call to the tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolConstraints {
    /// Per-call deadline; falls back to the 30 s step default when unset.
    #[serde(default)]
    pub max_execution_time_ms: Option<u64>,
    #[serde(default)]
    pub no_filesystem: bool,
    #[serde(default)]
    pub no_network: bool,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
}

/// A deterministic tool.  Stateless between calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub category: ToolCategory,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamSpec>,
    #[serde(default)]
    pub actions: BTreeMap<String, ActionSpec>,
    #[serde(default)]
    pub constraints: ToolConstraints,
    #[serde(default)]
    pub required_by: Vec<String>,
    #[serde(default)]
    pub conflicts_with: Vec<String>,
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// What an agent is allowed to do, enforced centrally before dispatch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AgentPermissions {
    #[serde(default)]
    pub read_file: bool,
    #[serde(default)]
    pub write_file: bool,
    #[serde(default)]
    pub execute_code: bool,
    #[serde(default)]
    pub network: bool,
    #[serde(default)]
    pub call_subagents: bool,
    #[serde(default = "default_true")]
    pub use_tools: bool,
}

impl Default for AgentPermissions {
    fn default() -> Self {
        Self {
            read_file: false,
            write_file: false,
            execute_code: false,
            network: false,
            call_subagents: false,
            use_tools: true,
        }
    }
}

/// Routing hints feeding the decision engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRouting {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub min_confidence: f32,
}

/// A domain agent instantiated through the factory registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    /// Factory name the application bound at startup.
    pub class: String,
    #[serde(default = "default_agent_version")]
    pub version: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    /// Tool ids this agent may call.  Empty means all tools.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Agent ids this agent may delegate to.  Empty means all agents.
    #[serde(default)]
    pub allowed_subagents: Vec<String>,
    #[serde(default)]
    pub routing: AgentRouting,
    #[serde(default)]
    pub permissions: AgentPermissions,
    #[serde(default)]
    pub mcp_preference: Option<ProviderKind>,
    #[serde(default = "default_true")]
    pub fallback_allowed: bool,
}

fn default_agent_version() -> String {
    "1.0.0".into()
}

// ---------------------------------------------------------------------------
// Tool sequences
// ---------------------------------------------------------------------------

/// What to do after a step succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnSuccess {
    #[default]
    Continue,
    Stop,
    /// Advance without recording a result slot for this step.
    Skip,
}

/// What to do after a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    Continue,
    #[default]
    Stop,
    LogWarning,
    /// Re-issue the step against `fallback_mcp`; only valid for mcp steps.
    Fallback,
}

/// Sequence-level error strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    #[default]
    FailFast,
    ContinueOnError,
    RetryAll,
}

/// Retry policy applied to steps whose error policy would otherwise stop or
/// warn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default)]
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            exponential_backoff: false,
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    500
}

/// Optional sequence-level circuit breaker, independent of per-provider
/// breakers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SequenceBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_open_timeout_ms")]
    pub timeout_ms: u64,
}

/// One step of a sequence.  Exactly one of `tool` / `mcp` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    pub order: u32,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub mcp: Option<String>,
    #[serde(default)]
    pub action: String,
    /// String values may contain `${input.*}` / `${stepN.*}` placeholders.
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub on_success: OnSuccess,
    #[serde(default)]
    pub on_error: OnError,
    #[serde(default)]
    pub fallback_mcp: Option<String>,
}

/// A named, ordered multi-step workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<StepConfig>,
    #[serde(default)]
    pub error_strategy: ErrorStrategy,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub circuit_breaker: Option<SequenceBreakerConfig>,
}

// ---------------------------------------------------------------------------
// Decision engine
// ---------------------------------------------------------------------------

/// Strategy names a rule can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStrategy {
    Llm,
    Rag,
    Agent,
    Tool,
}

/// One deterministic routing rule.  Rules are evaluated in declared order
/// against the lowercased, trimmed message; named regex captures become the
/// decision's extracted params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub pattern: String,
    pub strategy: RuleStrategy,
    #[serde(default = "default_rule_confidence")]
    pub confidence: f32,
    /// Suggested agent or tool id, depending on `strategy`.
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

fn default_rule_confidence() -> f32 {
    0.9
}

/// Decision engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Allow a Phase B LLM classification when Phase A is unsure.
    #[serde(default)]
    pub llm_assisted: bool,
    /// Extra rules evaluated before the built-in seed rules.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    #[serde(default = "default_decision_cache_ttl_s")]
    pub decision_cache_ttl_s: u64,
    #[serde(default = "default_decision_cache_size")]
    pub decision_cache_size: u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            llm_assisted: false,
            rules: Vec::new(),
            decision_cache_ttl_s: default_decision_cache_ttl_s(),
            decision_cache_size: default_decision_cache_size(),
        }
    }
}

fn default_confidence_threshold() -> f32 {
    0.7
}

fn default_decision_cache_ttl_s() -> u64 {
    300
}

fn default_decision_cache_size() -> u64 {
    512
}

// ---------------------------------------------------------------------------
// History / retrieval / logging
// ---------------------------------------------------------------------------

/// What to do with a request for a session that already has one in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Later requests wait for the session lock.
    #[default]
    Queue,
    /// Later requests are rejected with a validation error.
    Reject,
}

/// Conversation history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default)]
    pub busy_policy: BusyPolicy,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            busy_policy: BusyPolicy::default(),
        }
    }
}

fn default_max_turns() -> usize {
    20
}

/// Retrieval subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_embedding_cache_size")]
    pub embedding_cache_size: u64,
    /// Fall back to plain `llm` when nothing clears the score threshold.
    #[serde(default = "default_true")]
    pub rag_degrade_to_llm: bool,
    /// Character budget for the assembled context block.
    #[serde(default = "default_context_budget")]
    pub context_budget_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: default_score_threshold(),
            embedding_cache_size: default_embedding_cache_size(),
            rag_degrade_to_llm: true,
            context_budget_chars: default_context_budget(),
        }
    }
}

fn default_embedding_cache_size() -> u64 {
    256
}

fn default_context_budget() -> usize {
    6_000
}

/// Audit log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_ring_size")]
    pub ring_size: usize,
    #[serde(default = "default_min_level")]
    pub min_level: String,
    #[serde(default = "default_true")]
    pub colorize: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            ring_size: default_ring_size(),
            min_level: default_min_level(),
            colorize: true,
        }
    }
}

fn default_ring_size() -> usize {
    10_000
}

fn default_min_level() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_document_gets_defaults() {
        let config: CoreConfig = toml::from_str("").expect("empty doc parses");
        assert_eq!(config.system.name, "convoke");
        assert_eq!(config.decision.confidence_threshold, 0.7);
        assert_eq!(config.history.max_turns, 20);
        assert_eq!(config.retrieval.top_k, 5);
        assert!(config.retrieval.rag_degrade_to_llm);
        assert_eq!(config.logging.ring_size, 10_000);
    }

    #[test]
    fn provider_defaults() {
        let doc = r#"
            [[providers]]
            id = "main"
            type = "cloud"
            base_url = "https://api.example.com/v1"
            models = ["model-a", "model-b"]
        "#;
        let config: CoreConfig = toml::from_str(doc).expect("parses");
        let p = &config.providers[0];
        assert!(p.enabled);
        assert!(!p.primary);
        assert_eq!(p.timeout_ms, 15_000);
        assert_eq!(p.circuit_breaker.failure_threshold, 5);
        assert_eq!(p.circuit_breaker.open_timeout_ms, 30_000);
        assert_eq!(p.wire, WireFormat::OpenAi);
    }

    #[test]
    fn retry_defaults_fill_missing_fields() {
        let doc = r#"
            [[tool_sequences]]
            id = "s"
            [[tool_sequences.steps]]
            order = 1
            tool = "calculator"
            action = "soma"
            [tool_sequences.retry]
            enabled = true
        "#;
        let config: CoreConfig = toml::from_str(doc).expect("parses");
        let retry = config.tool_sequences[0].retry;
        assert!(retry.enabled);
        assert_eq!(retry.max_retries, 2);
        assert_eq!(retry.backoff_ms, 500);
    }

    #[test]
    fn step_policies_roundtrip() {
        let doc = r#"
            [[tool_sequences]]
            id = "s"
            error_strategy = "continue_on_error"
            [[tool_sequences.steps]]
            order = 1
            tool = "file_reader"
            action = "read"
            on_success = "skip"
            on_error = "log_warning"
        "#;
        let config: CoreConfig = toml::from_str(doc).expect("parses");
        let step = &config.tool_sequences[0].steps[0];
        assert_eq!(step.on_success, OnSuccess::Skip);
        assert_eq!(step.on_error, OnError::LogWarning);
        assert_eq!(
            config.tool_sequences[0].error_strategy,
            ErrorStrategy::ContinueOnError
        );
    }

    #[test]
    fn json_roundtrip_is_equivalent() {
        let doc = r#"
            [system]
            name = "gateway"
            [[providers]]
            id = "main"
            type = "cloud"
            base_url = "https://api.example.com/v1"
            models = ["m"]
        "#;
        let config: CoreConfig = toml::from_str(doc).expect("parses");
        let json = serde_json::to_string(&config).expect("serializes");
        let back: CoreConfig = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back.system.name, "gateway");
        assert_eq!(back.providers.len(), 1);
        assert_eq!(back.providers[0].id, "main");
    }
}
