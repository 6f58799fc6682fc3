//! REST API route handlers.
//!
//! Chat, health, and the registry introspection endpoints.  Validation
//! failures come back from the orchestrator as `ok = false` envelopes and
//! are mapped onto 4xx statuses here; everything else is 200 with the
//! envelope speaking for itself.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use convoke_kernel::{LogFilter, MetricsSnapshot};
use convoke_orchestrator::ChatRequest;
use convoke_provider::BreakerState;

use crate::state::AppState;

// ---------------------------------------------------------------------------
// POST /chat
// ---------------------------------------------------------------------------

/// Request body for the chat endpoint.
#[derive(Deserialize)]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Include this trace's log entries in the response.
    #[serde(default)]
    pub debug: bool,
}

/// Run one request through the orchestrator.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatBody>,
) -> impl IntoResponse {
    let request = ChatRequest {
        message: body.message,
        session_id: body.session_id,
        trace_id: None,
    };

    let mut response = state.orchestrator.handle(request).await;

    if body.debug {
        let entries = state.core().logs.query(&LogFilter {
            trace_id: Some(response.trace_id.clone()),
            ..LogFilter::default()
        });
        response.logs = Some(entries.iter().map(|e| e.as_ref().clone()).collect());
    }

    let status = match &response.error {
        Some(error) if error.kind == "validation" => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    };

    (status, Json(response))
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Component health summary.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let core = state.core();
    let breakers = core.cascade.health();
    let any_open = breakers
        .iter()
        .any(|h| h.breaker.state == BreakerState::Open);

    let vector_store = match &core.retriever {
        Some(retriever) => match retriever.store().info().await {
            Ok(info) => json!({"reachable": true, "count": info.count, "dim": info.dim}),
            Err(_) => json!({"reachable": false}),
        },
        None => json!({"configured": false}),
    };
    let store_down = vector_store["reachable"] == json!(false);

    let retrieval = core.retriever.as_ref().map(|retriever| {
        let cache = retriever.embedding_cache();
        json!({"embedding_cache": {
            "hits": cache.hits(),
            "misses": cache.misses(),
            "hit_rate": cache.hit_rate(),
        }})
    });

    let status = if any_open || store_down { "degraded" } else { "ok" };

    Json(json!({
        "status": status,
        "components": {
            "provider_cascade": {"breakers": breakers},
            "vector_store": vector_store,
            "retrieval": retrieval,
            "config": {
                "name": core.config.system.name,
                "version": core.config.system.version,
                "environment": core.config.system.environment,
            },
        },
    }))
}

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

/// One registry entry plus its runtime metrics.
#[derive(Serialize)]
pub struct IntrospectionEntry {
    pub id: String,
    pub description: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSnapshot>,
}

/// List registered tools.
pub async fn tools(State(state): State<Arc<AppState>>) -> Json<Vec<IntrospectionEntry>> {
    let core = state.core();
    let entries = core
        .tools
        .list(false)
        .into_iter()
        .map(|info| IntrospectionEntry {
            metrics: Some(core.metrics.component(&format!("tool:{}", info.id)).snapshot()),
            id: info.id,
            description: info.description,
            enabled: info.enabled,
            load_error: info.load_error,
        })
        .collect();
    Json(entries)
}

/// List registered agents with their rolling metrics.
pub async fn agents(State(state): State<Arc<AppState>>) -> Json<Vec<IntrospectionEntry>> {
    let core = state.core();
    let entries = core
        .agents
        .list(false)
        .into_iter()
        .map(|info| {
            let metrics = core.agents.get(&info.id).ok().map(|handle| handle.metrics());
            IntrospectionEntry {
                id: info.id,
                description: info.description,
                enabled: info.enabled,
                load_error: info.load_error,
                metrics,
            }
        })
        .collect();
    Json(entries)
}

/// List providers with breaker state and call metrics.
pub async fn providers(State(state): State<Arc<AppState>>) -> Json<Value> {
    let core = state.core();
    let health = core.cascade.health();
    let entries: Vec<Value> = core
        .providers
        .list(false)
        .into_iter()
        .map(|info| {
            let breaker = health.iter().find(|h| h.id == info.id);
            json!({
                "id": info.id,
                "description": info.description,
                "enabled": info.enabled,
                "breaker": breaker.map(|h| json!(h.breaker)),
                "metrics": core.metrics.component(&format!("provider:{}", info.id)).snapshot(),
            })
        })
        .collect();
    Json(json!(entries))
}

/// List configured tool sequences.
pub async fn sequences(State(state): State<Arc<AppState>>) -> Json<Value> {
    let core = state.core();
    let mut entries: Vec<Value> = core
        .sequences
        .values()
        .map(|sequence| {
            json!({
                "id": sequence.id,
                "steps": sequence.steps.len(),
                "error_strategy": sequence.error_strategy,
                "retry_enabled": sequence.retry.enabled,
                "metrics": core
                    .metrics
                    .component(&format!("sequence:{}", sequence.id))
                    .snapshot(),
            })
        })
        .collect();
    entries.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));
    Json(json!(entries))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use convoke_orchestrator::{ChatOrchestrator, CoreContext};
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
    "#;

    fn state() -> Arc<AppState> {
        let config = convoke_config::load_str(DOC, false).expect("loads");
        let core = CoreContext::builder(config)
            .with_transport("main", Arc::new(MockTransport::always_ok("fine")))
            .build()
            .expect("builds");
        AppState::new(ChatOrchestrator::new(core).expect("orchestrator"))
    }

    #[tokio::test]
    async fn health_reports_ok_with_closed_breakers() {
        let Json(body) = health(State(state())).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["components"]["vector_store"]["configured"], false);
        assert!(body["components"]["provider_cascade"]["breakers"].is_array());
    }

    #[tokio::test]
    async fn tools_listing_includes_metrics() {
        let Json(entries) = tools(State(state())).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "soma");
        assert!(entries[0].enabled);
        assert!(entries[0].metrics.is_some());
    }

    #[tokio::test]
    async fn providers_listing_carries_breaker_state() {
        let Json(body) = providers(State(state())).await;
        assert_eq!(body[0]["id"], "main");
        assert_eq!(body[0]["breaker"]["state"], "closed");
    }
}
