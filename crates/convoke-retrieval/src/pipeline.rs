//! The retrieval pipeline: embed, search, assemble.
//!
//! The LLM completion itself belongs to the orchestrator, which feeds the
//! assembled system prompt into the provider cascade.  When no document
//! clears the score threshold, the pipeline reports
//! [`RetrievalOutcome::NoRelevantContext`] and the orchestrator decides
//! (per `rag_degrade_to_llm`) whether to degrade to a plain completion or
//! surface a "no knowledge available" answer.

use std::sync::Arc;

use serde::Serialize;

use convoke_config::RetrievalConfig;
use convoke_kernel::{LogBuffer, LogCategory, LogEntry, LogLevel, MetricsHub};

use crate::chunk::Chunker;
use crate::context::{assemble_context, build_system_prompt};
use crate::embedding::{CacheStats, CachedEmbedder, Embedder};
use crate::error::Result;
use crate::store::VectorStore;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// One hit as surfaced in the chat response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct RagHit {
    pub score: f32,
    pub snippet: String,
}

/// What retrieval produced for a query.
#[derive(Debug, Clone)]
pub enum RetrievalOutcome {
    /// At least one document cleared the threshold; the system prompt embeds
    /// the assembled context.
    Context {
        hits: Vec<RagHit>,
        system_prompt: String,
    },
    /// Nothing scored above the threshold.
    NoRelevantContext,
}

// ---------------------------------------------------------------------------
// Retriever
// ---------------------------------------------------------------------------

/// Embed → search → assemble, with logging and metrics.
pub struct Retriever {
    embedder: CachedEmbedder,
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
    logs: LogBuffer,
    metrics: MetricsHub,
}

impl Retriever {
    /// Wrap `embedder` in the query LRU and build the pipeline.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        cache_capacity: u64,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
        logs: LogBuffer,
        metrics: MetricsHub,
    ) -> Self {
        Self {
            embedder: CachedEmbedder::new(embedder, cache_capacity),
            store,
            config,
            logs,
            metrics,
        }
    }

    /// The backing store, exposed for health probes and seeding.
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Embedding-cache effectiveness counters.
    pub fn embedding_cache(&self) -> &CacheStats {
        self.embedder.stats()
    }

    /// Chunk a document, embed every chunk, and upsert the points.
    ///
    /// Point ids are `{id_prefix}-{index}`; the chunk text and `source`
    /// label land in the point metadata.  Returns the number of chunks
    /// written.
    pub async fn ingest(&self, id_prefix: &str, source: &str, text: &str) -> Result<usize> {
        let chunks = Chunker::default().chunk(text);

        for (index, chunk) in chunks.iter().enumerate() {
            let vector = self.embedder.embed(chunk).await?;
            self.store
                .upsert(
                    &format!("{id_prefix}-{index}"),
                    &vector,
                    serde_json::json!({"text": chunk, "source": source, "chunk": index}),
                )
                .await?;
        }

        self.logs.push(
            LogEntry::new(
                LogLevel::Info,
                LogCategory::Rag,
                format!("ingested {} chunk(s) from `{source}`", chunks.len()),
            )
            .with_meta("id_prefix", id_prefix.into()),
        );

        Ok(chunks.len())
    }

    /// Run the pipeline for one query.
    pub async fn retrieve(&self, query: &str, trace_id: &str) -> Result<RetrievalOutcome> {
        let metrics = self.metrics.component("retrieval");
        let started = std::time::Instant::now();

        let vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                metrics.record_failure(started.elapsed().as_millis() as u64);
                self.logs.push(
                    LogEntry::new(LogLevel::Warn, LogCategory::Rag, format!("embedding failed: {e}"))
                        .with_trace(trace_id),
                );
                return Err(e);
            }
        };

        let hits = match self
            .store
            .search(&vector, self.config.top_k, self.config.score_threshold)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                metrics.record_failure(started.elapsed().as_millis() as u64);
                self.logs.push(
                    LogEntry::new(LogLevel::Warn, LogCategory::Rag, format!("vector search failed: {e}"))
                        .with_trace(trace_id),
                );
                return Err(e);
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        metrics.record_success(duration_ms);

        if hits.is_empty() {
            self.logs.push(
                LogEntry::new(
                    LogLevel::Info,
                    LogCategory::Rag,
                    "no documents above score threshold",
                )
                .with_trace(trace_id)
                .with_meta("score_threshold", self.config.score_threshold.into()),
            );
            return Ok(RetrievalOutcome::NoRelevantContext);
        }

        self.logs.push(
            LogEntry::new(
                LogLevel::Info,
                LogCategory::Rag,
                format!("retrieved {} context snippets", hits.len()),
            )
            .with_trace(trace_id)
            .with_meta("top_score", f64::from(hits[0].score).into())
            .with_meta("duration_ms", duration_ms.into()),
        );

        let context = assemble_context(&hits, self.config.context_budget_chars);
        let rag_hits = hits
            .into_iter()
            .map(|hit| RagHit {
                score: hit.score,
                snippet: hit.text,
            })
            .collect();

        Ok(RetrievalOutcome::Context {
            hits: rag_hits,
            system_prompt: build_system_prompt(&context),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryVectorStore;
    use async_trait::async_trait;
    use serde_json::json;

    /// Maps a few known phrases onto fixed unit vectors.
    struct PhraseEmbedder;

    #[async_trait]
    impl Embedder for PhraseEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(if text.contains("sistema") {
                vec![1.0, 0.0]
            } else {
                vec![0.0, 1.0]
            })
        }
    }

    async fn retriever_with_doc() -> Retriever {
        let store = Arc::new(InMemoryVectorStore::new(2));
        store
            .upsert(
                "doc-1",
                &[0.95, 0.31],
                json!({"text": "O sistema roteia mensagens entre provedores."}),
            )
            .await
            .expect("seed");

        Retriever::new(
            Arc::new(PhraseEmbedder),
            16,
            store,
            RetrievalConfig::default(),
            LogBuffer::new(64),
            MetricsHub::new(),
        )
    }

    #[tokio::test]
    async fn relevant_query_yields_context() {
        let retriever = retriever_with_doc().await;
        let outcome = retriever
            .retrieve("o que é o sistema?", "t-1")
            .await
            .expect("pipeline");

        match outcome {
            RetrievalOutcome::Context { hits, system_prompt } => {
                assert_eq!(hits.len(), 1);
                assert!(hits[0].score > 0.7);
                assert!(system_prompt.contains("roteia mensagens"));
                assert!(system_prompt.starts_with(crate::context::CONTEXT_INSTRUCTION));
            }
            RetrievalOutcome::NoRelevantContext => panic!("expected context"),
        }
    }

    #[tokio::test]
    async fn irrelevant_query_reports_no_context() {
        let retriever = retriever_with_doc().await;
        let outcome = retriever
            .retrieve("unrelated question", "t-1")
            .await
            .expect("pipeline");
        assert!(matches!(outcome, RetrievalOutcome::NoRelevantContext));
    }

    #[tokio::test]
    async fn ingest_then_retrieve_roundtrip() {
        let store = Arc::new(InMemoryVectorStore::new(2));
        let retriever = Retriever::new(
            Arc::new(PhraseEmbedder),
            16,
            store,
            RetrievalConfig::default(),
            LogBuffer::new(64),
            MetricsHub::new(),
        );

        let written = retriever
            .ingest("manual", "docs/manual.md", "O sistema responde perguntas.")
            .await
            .expect("ingest");
        assert_eq!(written, 1);

        let outcome = retriever
            .retrieve("o que faz o sistema?", "t-1")
            .await
            .expect("retrieve");
        match outcome {
            RetrievalOutcome::Context { hits, .. } => {
                assert_eq!(hits.len(), 1);
                assert!(hits[0].snippet.contains("responde perguntas"));
            }
            RetrievalOutcome::NoRelevantContext => panic!("expected the ingested chunk"),
        }
    }

    #[tokio::test]
    async fn repeated_query_hits_the_embedding_cache() {
        let retriever = retriever_with_doc().await;
        retriever.retrieve("o que é o sistema?", "t-1").await.expect("first");
        retriever.retrieve("o que é o sistema?", "t-2").await.expect("second");

        assert_eq!(retriever.embedding_cache().hits(), 1);
        assert_eq!(retriever.embedding_cache().misses(), 1);
    }
}
