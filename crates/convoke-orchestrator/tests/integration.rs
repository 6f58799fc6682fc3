//! End-to-end scenarios against a fully built core with mock transports,
//! embedders, and an in-memory vector store.  No network anywhere.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use convoke_agent::{
    Agent, AgentInput, AgentOutput, AgentServices, FactoryRegistry, Result as AgentResult,
};
use convoke_orchestrator::{ChatOrchestrator, ChatRequest, CoreContext, Strategy};
use convoke_provider::BreakerState;
use convoke_provider::mock::MockTransport;
use convoke_retrieval::{Embedder, InMemoryVectorStore, Result as RetrievalResult, VectorStore};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const BASE_DOC: &str = r#"
    [system]
    name = "convoke-test"

    [[providers]]
    id = "primary"
    type = "cloud"
    base_url = "https://api.example.com/v1"
    models = ["model-a"]
    primary = true

    [[providers]]
    id = "backup"
    type = "local"
    base_url = "http://localhost:11434/v1"
    models = ["model-b"]

    [[tools]]
    id = "soma"
    category = "execution"

    [[tools]]
    id = "file_reader"
    category = "file"

    [[tools]]
    id = "json_parser"
    category = "data"

    [[agents]]
    id = "code_analyzer"
    class = "code_analyzer"
    allowed_tools = ["file_reader", "soma"]
"#;

fn load(doc: &str) -> convoke_config::CoreConfig {
    convoke_config::load_str(doc, false).expect("test config loads")
}

/// Maps the seeded knowledge query onto a fixed unit vector.
struct StaticEmbedder;

#[async_trait]
impl Embedder for StaticEmbedder {
    async fn embed(&self, text: &str) -> RetrievalResult<Vec<f32>> {
        Ok(if text.contains("sistema") {
            vec![1.0, 0.0]
        } else {
            vec![0.0, 1.0]
        })
    }
}

// ---------------------------------------------------------------------------
// Scenario 1 — simple greeting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn greeting_goes_to_primary_provider() {
    let core = CoreContext::builder(load(BASE_DOC))
        .with_transport("primary", Arc::new(MockTransport::always_ok("Hello! How can I help?")))
        .with_transport("backup", Arc::new(MockTransport::always_ok("backup says hi")))
        .build()
        .expect("core builds");
    let orchestrator = ChatOrchestrator::new(core).expect("orchestrator");

    let response = orchestrator.handle(ChatRequest::new("hi")).await;

    assert!(response.ok);
    assert_eq!(response.strategy, Strategy::Llm);
    assert!((response.confidence - 0.95).abs() < f32::EPSILON);
    assert_eq!(response.provider.as_deref(), Some("primary"));
    assert!(!response.text.is_empty());
    assert!(response.rag_hits.is_none());
    assert!(response.tool_used.is_none());
    assert!(response.agent_used.is_none());
}

// ---------------------------------------------------------------------------
// Scenario 2 — arithmetic via tool
// ---------------------------------------------------------------------------

#[tokio::test]
async fn arithmetic_answers_without_any_provider() {
    let core = CoreContext::builder(load(BASE_DOC))
        .with_transport("primary", Arc::new(MockTransport::always_failing(500)))
        .with_transport("backup", Arc::new(MockTransport::always_failing(500)))
        .build()
        .expect("core builds");
    let orchestrator = ChatOrchestrator::new(core).expect("orchestrator");

    let response = orchestrator.handle(ChatRequest::new("quanto é 7 + 5")).await;

    assert!(response.ok);
    assert_eq!(response.strategy, Strategy::Tool);
    assert_eq!(response.tool_used.as_deref(), Some("soma"));
    assert_eq!(response.text, "7 + 5 = 12");
    assert!(response.provider.is_none());
}

// ---------------------------------------------------------------------------
// Scenario 3 — knowledge question hitting retrieval
// ---------------------------------------------------------------------------

#[tokio::test]
async fn knowledge_question_retrieves_then_completes() {
    const KB_DOC: &str = r#"
        [[knowledge_bases]]
        id = "docs"
        url = "http://localhost:6333"
        dimension = 2
        embedding_provider = "primary"
        embedding_model = "embed-small"
    "#;
    let doc = format!("{BASE_DOC}\n{KB_DOC}");

    let store = Arc::new(InMemoryVectorStore::new(2));
    store
        .upsert(
            "doc-1",
            // Unit vector at cosine 0.82 from the query direction.
            &[0.82, 0.5724],
            json!({"text": "O sistema roteia mensagens entre provedores de LLM."}),
        )
        .await
        .expect("seed");

    let core = CoreContext::builder(load(&doc))
        .with_transport(
            "primary",
            Arc::new(MockTransport::always_ok("O sistema é um gateway conversacional.")),
        )
        .with_transport("backup", Arc::new(MockTransport::always_ok("unused")))
        .with_embedder(Arc::new(StaticEmbedder))
        .with_vector_store(store)
        .build()
        .expect("core builds");
    let orchestrator = ChatOrchestrator::new(core).expect("orchestrator");

    let response = orchestrator
        .handle(ChatRequest::new("o que é o sistema?"))
        .await;

    assert!(response.ok);
    assert_eq!(response.strategy, Strategy::Rag);
    assert_eq!(response.provider.as_deref(), Some("primary"));
    assert!(!response.text.is_empty());

    let hits = response.rag_hits.expect("hits present");
    assert_eq!(hits.len(), 1);
    assert!((hits[0].score - 0.82).abs() < 0.01, "score was {}", hits[0].score);
    assert!(hits[0].snippet.contains("roteia mensagens"));
}

// ---------------------------------------------------------------------------
// Scenario 4 — cascade exhaustion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn both_providers_down_yields_structured_exhaustion() {
    let core = CoreContext::builder(load(BASE_DOC))
        .with_transport("primary", Arc::new(MockTransport::always_failing(503)))
        .with_transport("backup", Arc::new(MockTransport::always_failing(500)))
        .build()
        .expect("core builds");
    let orchestrator = ChatOrchestrator::new(core).expect("orchestrator");

    let response = orchestrator.handle(ChatRequest::new("hello friend of mine")).await;

    assert!(!response.ok);
    assert_eq!(response.strategy, Strategy::Error);
    assert_eq!(response.text, "Sorry, an internal error occurred.");

    let error = response.error.expect("structured error");
    assert_eq!(error.kind, "AllProvidersExhausted");
    let attempts = error.attempts.expect("attempt records");
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].provider_id, "primary");
    assert_eq!(attempts[0].reason, "http_503");
    assert_eq!(attempts[1].provider_id, "backup");
}

// ---------------------------------------------------------------------------
// Scenario 5 — circuit opens, then recovers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn breaker_opens_after_threshold_and_suppresses_calls() {
    const DOC: &str = r#"
        [[providers]]
        id = "only"
        type = "cloud"
        base_url = "https://api.example.com/v1"
        models = ["model-a"]
        [providers.circuit_breaker]
        failure_threshold = 3
        open_timeout_ms = 60000
    "#;

    let transport = Arc::new(MockTransport::always_failing(500));
    let core = CoreContext::builder(load(DOC))
        .with_transport("only", transport.clone())
        .build()
        .expect("core builds");
    let orchestrator = ChatOrchestrator::new(core.clone()).expect("orchestrator");

    // Three failing requests reach the provider and open the breaker.
    for i in 0..3 {
        let response = orchestrator
            .handle(ChatRequest::new(format!("tell me something new {i}")))
            .await;
        assert!(!response.ok);
    }
    assert_eq!(transport.calls(), 3);
    assert_eq!(core.cascade.health()[0].breaker.state, BreakerState::Open);

    // The fourth request is suppressed: no network call, circuit_open record.
    let response = orchestrator
        .handle(ChatRequest::new("is anyone out there"))
        .await;
    assert!(!response.ok);
    assert_eq!(transport.calls(), 3);
    let attempts = response.error.unwrap().attempts.expect("records");
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].reason, "circuit_open");
}

#[tokio::test]
async fn breaker_recovers_through_half_open_probe() {
    const DOC: &str = r#"
        [[providers]]
        id = "only"
        type = "cloud"
        base_url = "https://api.example.com/v1"
        models = ["model-a"]
        [providers.circuit_breaker]
        failure_threshold = 3
        success_threshold = 1
        open_timeout_ms = 0
    "#;

    let transport = Arc::new(MockTransport::fail_then_succeed(3, "back online"));
    let core = CoreContext::builder(load(DOC))
        .with_transport("only", transport.clone())
        .build()
        .expect("core builds");
    let orchestrator = ChatOrchestrator::new(core.clone()).expect("orchestrator");

    for i in 0..3 {
        let _ = orchestrator
            .handle(ChatRequest::new(format!("anyone home {i}")))
            .await;
    }

    // Zero open timeout: the next request is admitted as the half-open
    // probe, succeeds, and closes the breaker.
    let response = orchestrator
        .handle(ChatRequest::new("good to have you back"))
        .await;
    assert!(response.ok);
    assert_eq!(response.text, "back online");
    assert_eq!(core.cascade.health()[0].breaker.state, BreakerState::Closed);
}

// ---------------------------------------------------------------------------
// Scenario 6 — permission denial through an agent
// ---------------------------------------------------------------------------

/// An agent that (wrongly) reaches for a tool outside its allow-list.
struct SneakyAgent {
    id: String,
}

#[async_trait]
impl Agent for SneakyAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(
        &self,
        _input: AgentInput,
        services: &dyn AgentServices,
    ) -> AgentResult<AgentOutput> {
        let result = services
            .run_tool(&self.id, "json_parser", "parse", json!({"json": "{}"}))
            .await?;
        Ok(AgentOutput::text_only(result.to_string()))
    }
}

#[tokio::test]
async fn agent_calling_disallowed_tool_surfaces_permission_error() {
    const DOC: &str = r#"
        [[providers]]
        id = "primary"
        type = "cloud"
        base_url = "https://api.example.com/v1"
        models = ["model-a"]

        [[tools]]
        id = "file_reader"
        category = "file"

        [[tools]]
        id = "json_parser"
        category = "data"

        [[agents]]
        id = "code_analyzer"
        class = "sneaky"
        allowed_tools = ["file_reader"]

        [[decision.rules]]
        pattern = "^probe the parser$"
        strategy = "agent"
        confidence = 0.99
        component = "code_analyzer"
    "#;

    let factories = FactoryRegistry::with_builtins();
    factories.bind("sneaky", |config| {
        Ok(Arc::new(SneakyAgent {
            id: config.id.clone(),
        }) as Arc<dyn Agent>)
    });

    let core = CoreContext::builder(load(DOC))
        .with_factories(factories)
        .with_transport("primary", Arc::new(MockTransport::always_ok("unused")))
        .build()
        .expect("core builds");
    let orchestrator = ChatOrchestrator::new(core).expect("orchestrator");

    let response = orchestrator.handle(ChatRequest::new("probe the parser")).await;

    assert!(!response.ok);
    assert_eq!(response.strategy, Strategy::Error);
    assert_eq!(response.text, "Sorry, an internal error occurred.");
    let error = response.error.expect("structured error");
    assert_eq!(error.kind, "permission");
    assert!(error.message.contains("json_parser"));
}

// ---------------------------------------------------------------------------
// Tool sequences — chaining, mcp fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn configured_sequence_reads_then_summarizes_with_fallback() {
    const SEQ_DOC: &str = r#"
        [[tool_sequences]]
        id = "read_and_summarize"

        [[tool_sequences.steps]]
        order = 1
        tool = "file_reader"
        action = "read"
        params = { path = "note.txt" }

        [[tool_sequences.steps]]
        order = 2
        mcp = "primary"
        action = "complete"
        on_error = "fallback"
        fallback_mcp = "backup"
        params = { prompt = "Summarize in one line:\n${step1.content}" }
    "#;
    let doc = format!("{BASE_DOC}\n{SEQ_DOC}");

    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("note.txt"), "the gateway routes messages").expect("seed file");

    // Primary is down; the mcp step falls back to the local provider.
    let core = CoreContext::builder(load(&doc))
        .with_transport("primary", Arc::new(MockTransport::always_failing(503)))
        .with_transport("backup", Arc::new(MockTransport::echo_user("summary of: ")))
        .with_files_root(dir.path())
        .build()
        .expect("core builds");
    let orchestrator = ChatOrchestrator::new(core).expect("orchestrator");

    let report = orchestrator
        .run_sequence("read_and_summarize", json!({}))
        .await
        .expect("sequence runs");

    assert!(report.ok);
    assert!(report.stopped_at.is_none());
    assert_eq!(report.steps.len(), 2);

    let step2 = &report.steps[1];
    assert!(step2.ok);
    let output = step2.output.as_ref().expect("mcp output");
    assert_eq!(output["provider"], "backup");
    assert!(
        output["text"]
            .as_str()
            .unwrap()
            .contains("the gateway routes messages")
    );
}

// ---------------------------------------------------------------------------
// Cross-cutting invariants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trace_logs_are_ordered_and_categorized() {
    let core = CoreContext::builder(load(BASE_DOC))
        .with_transport("primary", Arc::new(MockTransport::always_ok("fine")))
        .with_transport("backup", Arc::new(MockTransport::always_ok("fine")))
        .build()
        .expect("core builds");
    let orchestrator = ChatOrchestrator::new(core.clone()).expect("orchestrator");

    let response = orchestrator.handle(ChatRequest::new("hi")).await;
    assert!(response.ok);

    let entries = core.logs.query(&convoke_kernel::LogFilter {
        trace_id: Some(response.trace_id.clone()),
        ..Default::default()
    });
    assert!(entries.len() >= 3, "expected request/decision/response entries");
    assert_eq!(entries.first().unwrap().category, convoke_kernel::LogCategory::Request);
    assert_eq!(entries.last().unwrap().category, convoke_kernel::LogCategory::Response);
}

#[tokio::test]
async fn decision_cache_records_hit_on_repeat() {
    let core = CoreContext::builder(load(BASE_DOC))
        .with_transport("primary", Arc::new(MockTransport::always_ok("fine")))
        .with_transport("backup", Arc::new(MockTransport::always_ok("fine")))
        .build()
        .expect("core builds");
    let orchestrator = ChatOrchestrator::new(core).expect("orchestrator");

    let first = orchestrator.handle(ChatRequest::new("quanto é 2 + 2")).await;
    let second = orchestrator.handle(ChatRequest::new("quanto é 2 + 2")).await;

    assert_eq!(first.strategy, second.strategy);
    assert_eq!(first.tool_used, second.tool_used);
    assert_eq!(orchestrator.engine().cache_stats().hits(), 1);
}
