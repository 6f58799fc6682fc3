//! Agent factory registry.
//!
//! Configuration names an agent *class*; the application binds a factory
//! function per class at startup, and registration resolves through this
//! registry.  This replaces discovery-by-class-name with an explicit,
//! typed binding.

use std::sync::Arc;

use dashmap::DashMap;

use convoke_config::AgentConfig;

use crate::error::{AgentError, Result};
use crate::traits::Agent;

/// Constructor for one agent class.
pub type AgentFactory =
    Arc<dyn Fn(&AgentConfig) -> Result<Arc<dyn Agent>> + Send + Sync + 'static>;

/// Class-name-indexed factory bindings.
#[derive(Clone, Default)]
pub struct FactoryRegistry {
    factories: Arc<DashMap<String, AgentFactory>>,
}

impl FactoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a factory for `class`.  Rebinding replaces the previous factory.
    pub fn bind<F>(&self, class: impl Into<String>, factory: F)
    where
        F: Fn(&AgentConfig) -> Result<Arc<dyn Agent>> + Send + Sync + 'static,
    {
        let class = class.into();
        tracing::debug!(class = %class, "agent factory bound");
        self.factories.insert(class, Arc::new(factory));
    }

    /// Construct an agent instance for `config`.
    pub fn build(&self, config: &AgentConfig) -> Result<Arc<dyn Agent>> {
        let factory = self
            .factories
            .get(&config.class)
            .ok_or_else(|| AgentError::UnknownFactory {
                class: config.class.clone(),
            })?;
        factory(config)
    }

    /// Registered class names.
    pub fn classes(&self) -> Vec<String> {
        self.factories.iter().map(|e| e.key().clone()).collect()
    }

    /// A registry with the built-in agent classes pre-bound.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.bind("code_analyzer", |config| {
            Ok(Arc::new(crate::builtin::CodeAnalyzer::new(&config.id)) as Arc<dyn Agent>)
        });
        registry.bind("data_processor", |config| {
            Ok(Arc::new(crate::builtin::DataProcessor::new(&config.id)) as Arc<dyn Agent>)
        });
        registry.bind("task_manager", |config| {
            Ok(Arc::new(crate::builtin::TaskManager::new(&config.id)) as Arc<dyn Agent>)
        });
        registry
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config(class: &str) -> AgentConfig {
        AgentConfig {
            id: "a1".into(),
            class: class.into(),
            version: "1.0.0".into(),
            enabled: true,
            description: String::new(),
            allowed_tools: vec![],
            allowed_subagents: vec![],
            routing: Default::default(),
            permissions: Default::default(),
            mcp_preference: None,
            fallback_allowed: true,
        }
    }

    #[test]
    fn builtins_are_bound() {
        let registry = FactoryRegistry::with_builtins();
        for class in ["code_analyzer", "data_processor", "task_manager"] {
            let agent = registry.build(&config(class)).expect("builds");
            assert_eq!(agent.id(), "a1");
        }
    }

    #[test]
    fn unknown_class_is_an_error() {
        let registry = FactoryRegistry::with_builtins();
        assert!(matches!(
            registry.build(&config("ghost")),
            Err(AgentError::UnknownFactory { .. })
        ));
    }
}
