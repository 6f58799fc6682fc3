//! Core context: construction and shutdown.
//!
//! [`CoreContext`] is the single value holding every process-wide piece of
//! the core — registries, cascade, retriever, sequence runner, log buffer,
//! metrics, history.  It is built once from a validated [`CoreConfig`]
//! (and swapped whole on hot reload), passed into every public entry
//! point, and torn down explicitly.
//!
//! One bad component never blocks boot: construction failures are recorded
//! as `load_failed` registry slots.  Invalid sequences are the exception —
//! they are configuration errors and fail startup.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use convoke_agent::{AgentHandle, FactoryRegistry};
use convoke_config::{CoreConfig, KnowledgeBaseConfig, ProviderConfig, ToolConfig};
use convoke_kernel::{
    LogBuffer, LogCategory, LogLevel, MetricsHub, Registry, TraceIdGen,
};
use convoke_provider::{
    CompletionTransport, HttpTransport, ProviderCandidate, ProviderCascade,
};
use convoke_retrieval::{Embedder, HttpEmbedder, HttpVectorStore, Retriever, VectorStore};
use convoke_tools::{
    Calculator, CompiledSequence, FileReader, JsonParser, SequenceRunner, Tool, ToolError,
};

use crate::error::{OrchestratorError, Result};
use crate::history::HistoryStore;

// ---------------------------------------------------------------------------
// Registered tool
// ---------------------------------------------------------------------------

/// A tool instance paired with its declared schema and constraints.
pub struct RegisteredTool {
    pub config: ToolConfig,
    pub tool: Arc<dyn Tool>,
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything the orchestrator needs, built once from configuration.
pub struct CoreContext {
    pub config: Arc<CoreConfig>,
    pub logs: LogBuffer,
    pub metrics: MetricsHub,
    pub traces: TraceIdGen,
    pub tools: Registry<RegisteredTool>,
    pub agents: Registry<AgentHandle>,
    pub knowledge_bases: Registry<KnowledgeBaseConfig>,
    pub providers: Registry<ProviderConfig>,
    pub cascade: Arc<ProviderCascade>,
    pub retriever: Option<Arc<Retriever>>,
    pub sequences: HashMap<String, CompiledSequence>,
    pub runner: SequenceRunner,
    pub history: HistoryStore,
}

impl CoreContext {
    /// Start building a context from a validated configuration.
    pub fn builder(config: CoreConfig) -> CoreContextBuilder {
        CoreContextBuilder::new(config)
    }

    /// Tear the context down: destroy every ready agent and emit the final
    /// system log entry.
    pub async fn shutdown(&self) {
        for info in self.agents.list(true) {
            if let Ok(handle) = self.agents.get(&info.id) {
                if let Err(e) = handle.destroy().await {
                    tracing::warn!(agent = %info.id, error = %e, "agent teardown failed");
                }
            }
        }
        self.logs
            .log(LogLevel::Info, LogCategory::System, "core shut down");
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds a [`CoreContext`], with seams for tests and embedders/stores/
/// transports supplied by the application.
pub struct CoreContextBuilder {
    config: CoreConfig,
    factories: FactoryRegistry,
    transports: HashMap<String, Arc<dyn CompletionTransport>>,
    embedder: Option<Arc<dyn Embedder>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    extra_tools: Vec<Arc<dyn Tool>>,
    files_root: PathBuf,
}

impl CoreContextBuilder {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            factories: FactoryRegistry::with_builtins(),
            transports: HashMap::new(),
            embedder: None,
            vector_store: None,
            extra_tools: Vec::new(),
            files_root: PathBuf::from("."),
        }
    }

    /// Replace the agent factory bindings.
    pub fn with_factories(mut self, factories: FactoryRegistry) -> Self {
        self.factories = factories;
        self
    }

    /// Use a specific transport for one provider instead of HTTP.
    pub fn with_transport(
        mut self,
        provider_id: impl Into<String>,
        transport: Arc<dyn CompletionTransport>,
    ) -> Self {
        self.transports.insert(provider_id.into(), transport);
        self
    }

    /// Use this embedder instead of the HTTP one derived from config.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Use this vector store instead of the HTTP one derived from config.
    pub fn with_vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Register an application-provided tool implementation; matched to a
    /// `tools` entry by id.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    /// Root directory for the built-in file reader.
    pub fn with_files_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.files_root = root.into();
        self
    }

    /// Construct the context.
    pub fn build(self) -> Result<Arc<CoreContext>> {
        let config = Arc::new(self.config.clone());
        let logs = LogBuffer::new(config.logging.ring_size);
        let metrics = MetricsHub::new();

        let providers = self.build_providers(&config, &logs);
        let cascade = Arc::new(ProviderCascade::new(
            self.build_candidates(&config, &providers),
            logs.clone(),
            metrics.clone(),
            None,
        ));
        let tools = self.build_tools(&config);
        let agents = self.build_agents(&config);
        let knowledge_bases = self.build_knowledge_bases(&config);
        let retriever = self.build_retriever(&config, &logs, &metrics)?;
        let sequences = build_sequences(&config)?;

        logs.log(
            LogLevel::Success,
            LogCategory::System,
            format!(
                "{} v{} initialized ({} providers, {} tools, {} agents)",
                config.system.name,
                config.system.version,
                providers.size(),
                tools.size(),
                agents.size(),
            ),
        );

        Ok(Arc::new(CoreContext {
            history: HistoryStore::new(config.history.clone()),
            runner: SequenceRunner::new(logs.clone(), metrics.clone()),
            config,
            logs,
            metrics,
            traces: TraceIdGen::new(),
            tools,
            agents,
            knowledge_bases,
            providers,
            cascade,
            retriever,
            sequences,
        }))
    }

    fn build_providers(
        &self,
        config: &CoreConfig,
        logs: &LogBuffer,
    ) -> Registry<ProviderConfig> {
        let registry = Registry::new("provider");
        for provider in &config.providers {
            registry.register(
                &provider.id,
                format!("{:?} provider ({})", provider.kind, provider.base_url),
                provider.enabled,
                provider.clone(),
            );
        }
        logs.log(
            LogLevel::Info,
            LogCategory::Config,
            format!("{} provider(s) registered", registry.size()),
        );
        registry
    }

    fn build_candidates(
        &self,
        config: &CoreConfig,
        registry: &Registry<ProviderConfig>,
    ) -> Vec<ProviderCandidate> {
        let mut candidates = Vec::new();
        for provider in config.providers.iter().filter(|p| p.enabled) {
            let transport = match self.transports.get(&provider.id) {
                Some(transport) => Arc::clone(transport),
                None => match HttpTransport::from_config(provider) {
                    Ok(transport) => Arc::new(transport) as Arc<dyn CompletionTransport>,
                    Err(e) => {
                        // Keep the descriptor visible but out of the cascade.
                        registry.register_failed(
                            &provider.id,
                            format!("{:?} provider", provider.kind),
                            e.to_string(),
                        );
                        continue;
                    }
                },
            };
            candidates.push(ProviderCandidate::new(provider.clone(), transport));
        }
        candidates
    }

    fn build_tools(&self, config: &CoreConfig) -> Registry<RegisteredTool> {
        let registry: Registry<RegisteredTool> = Registry::new("tool");

        for tool_config in &config.tools {
            match self.instantiate_tool(tool_config) {
                Ok(tool) => registry.register(
                    &tool_config.id,
                    tool_config.description.clone(),
                    tool_config.enabled,
                    RegisteredTool {
                        config: tool_config.clone(),
                        tool,
                    },
                ),
                Err(e) => registry.register_failed(
                    &tool_config.id,
                    tool_config.description.clone(),
                    e.to_string(),
                ),
            }
        }
        registry
    }

    fn instantiate_tool(&self, config: &ToolConfig) -> std::result::Result<Arc<dyn Tool>, ToolError> {
        if let Some(tool) = self.extra_tools.iter().find(|t| t.id() == config.id) {
            return Ok(Arc::clone(tool));
        }

        let id = config.id.as_str();
        Ok(match id {
            "calculator" | "soma" | "subtracao" | "multiplicacao" | "divisao" => {
                Arc::new(Calculator::new(id))
            }
            "file_reader" => {
                let root = config
                    .constraints
                    .allowed_paths
                    .first()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| self.files_root.clone());
                Arc::new(FileReader::new(
                    id,
                    root,
                    config.constraints.allowed_extensions.clone(),
                ))
            }
            "json_parser" => Arc::new(JsonParser::new(id)),
            other => {
                return Err(ToolError::TargetUnavailable {
                    target: format!("no implementation bound for tool `{other}`"),
                });
            }
        })
    }

    fn build_agents(&self, config: &CoreConfig) -> Registry<AgentHandle> {
        let registry: Registry<AgentHandle> = Registry::new("agent");
        for agent_config in &config.agents {
            match self.factories.build(agent_config) {
                Ok(agent) => registry.register(
                    &agent_config.id,
                    agent_config.description.clone(),
                    agent_config.enabled,
                    AgentHandle::new(agent_config.clone(), agent),
                ),
                Err(e) => registry.register_failed(
                    &agent_config.id,
                    agent_config.description.clone(),
                    e.to_string(),
                ),
            }
        }
        registry
    }

    fn build_knowledge_bases(&self, config: &CoreConfig) -> Registry<KnowledgeBaseConfig> {
        let registry = Registry::new("knowledge base");
        for kb in &config.knowledge_bases {
            registry.register(
                &kb.id,
                format!("vector store at {} (dim {})", kb.url, kb.dimension),
                kb.enabled,
                kb.clone(),
            );
        }
        registry
    }

    fn build_retriever(
        &self,
        config: &CoreConfig,
        logs: &LogBuffer,
        metrics: &MetricsHub,
    ) -> Result<Option<Arc<Retriever>>> {
        let Some(kb) = config.knowledge_bases.iter().find(|kb| kb.enabled) else {
            return Ok(None);
        };

        let embedder: Arc<dyn Embedder> = match &self.embedder {
            Some(embedder) => Arc::clone(embedder),
            None => {
                let provider = config
                    .providers
                    .iter()
                    .find(|p| p.id == kb.embedding_provider)
                    .ok_or_else(|| OrchestratorError::Validation {
                        reason: format!(
                            "knowledge base `{}` references unknown provider `{}`",
                            kb.id, kb.embedding_provider
                        ),
                    })?;
                let api_key = provider
                    .api_key_env
                    .as_ref()
                    .and_then(|env_var| std::env::var(env_var).ok());
                Arc::new(
                    HttpEmbedder::new(&provider.base_url, &kb.embedding_model, api_key)
                        .map_err(OrchestratorError::Retrieval)?,
                )
            }
        };
        let store: Arc<dyn VectorStore> = match &self.vector_store {
            Some(store) => Arc::clone(store),
            None => Arc::new(
                HttpVectorStore::new(&kb.url, &kb.id).map_err(OrchestratorError::Retrieval)?,
            ),
        };

        Ok(Some(Arc::new(Retriever::new(
            embedder,
            config.retrieval.embedding_cache_size,
            store,
            config.retrieval.clone(),
            logs.clone(),
            metrics.clone(),
        ))))
    }
}

fn build_sequences(config: &CoreConfig) -> Result<HashMap<String, CompiledSequence>> {
    let mut sequences = HashMap::new();
    for sequence in config.tool_sequences.iter().filter(|s| s.enabled) {
        let compiled = convoke_tools::compile(sequence).map_err(OrchestratorError::Tool)?;
        sequences.insert(sequence.id.clone(), compiled);
    }
    Ok(sequences)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
