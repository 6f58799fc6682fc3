//! Shared state for the web layer.

use std::sync::Arc;

use convoke_orchestrator::{ChatOrchestrator, CoreContext};

/// State handed to every handler.
pub struct AppState {
    pub orchestrator: ChatOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: ChatOrchestrator) -> Arc<Self> {
        Arc::new(Self { orchestrator })
    }

    pub fn core(&self) -> &Arc<CoreContext> {
        self.orchestrator.core()
    }
}
