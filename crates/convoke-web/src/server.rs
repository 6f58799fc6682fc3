//! Server setup and startup.
//!
//! [`WebServer`] composes the axum router, registers all routes, and runs
//! the HTTP listener.

use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use convoke_orchestrator::ChatOrchestrator;

use crate::api;
use crate::sse;
use crate::state::AppState;

/// Bind configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: 8900,
        }
    }
}

/// The convoke HTTP server.
pub struct WebServer {
    config: WebConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: WebConfig, orchestrator: ChatOrchestrator) -> Self {
        Self {
            config,
            state: AppState::new(orchestrator),
        }
    }

    /// The `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    /// Build the router with all routes registered.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);

        Router::new()
            .route("/chat", post(api::chat))
            .route("/health", get(api::health))
            .route("/tools", get(api::tools))
            .route("/agents", get(api::agents))
            .route("/providers", get(api::providers))
            .route("/sequences", get(api::sequences))
            .route("/logs/stream", get(sse::log_stream))
            .layer(cors)
            .with_state(Arc::clone(&self.state))
    }

    /// Start the server and block until shutdown.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.addr();
        let router = self.router();

        tracing::info!(addr = %addr, "starting web server");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use convoke_orchestrator::CoreContext;
    use convoke_provider::mock::MockTransport;

    #[test]
    fn router_builds_with_all_routes() {
        let config = convoke_config::load_str(
            r#"
            [[providers]]
            id = "main"
            type = "cloud"
            base_url = "https://api.example.com/v1"
            models = ["m"]
            "#,
            false,
        )
        .expect("loads");
        let core = CoreContext::builder(config)
            .with_transport("main", Arc::new(MockTransport::always_ok("x")))
            .build()
            .expect("builds");
        let orchestrator = ChatOrchestrator::new(core).expect("orchestrator");

        let server = WebServer::new(WebConfig::default(), orchestrator);
        assert_eq!(server.addr(), "127.0.0.1:8900");
        let _router = server.router();
    }
}
