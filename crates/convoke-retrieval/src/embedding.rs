//! Embedding generation.
//!
//! The [`Embedder`] trait is the seam between the retrieval pipeline and
//! whatever service computes vectors.  [`HttpEmbedder`] speaks the
//! OpenAI-compatible `/embeddings` endpoint (also served by Ollama);
//! [`CachedEmbedder`] wraps any embedder with a keyed LRU so repeated
//! queries skip the network, reporting its hit rate as a metric.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use moka::future::Cache;
use serde_json::{Value, json};

use crate::error::{Result, RetrievalError};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Turns text into a vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ---------------------------------------------------------------------------
// HTTP embedder
// ---------------------------------------------------------------------------

/// OpenAI-compatible embeddings client.
pub struct HttpEmbedder {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| RetrievalError::EmbeddingFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            http,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = json!({"model": self.model, "input": [text]});

        tracing::debug!(url = %url, model = %self.model, "sending embedding request");

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let text_body = resp
            .text()
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed {
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(RetrievalError::EmbeddingFailed {
                reason: format!("API returned {status}: {text_body}"),
            });
        }

        let v: Value =
            serde_json::from_str(&text_body).map_err(|e| RetrievalError::EmbeddingFailed {
                reason: format!("invalid JSON response: {e}"),
            })?;

        let vector = v["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| RetrievalError::EmbeddingFailed {
                reason: "missing data[0].embedding".into(),
            })?
            .iter()
            .map(|x| x.as_f64().unwrap_or(0.0) as f32)
            .collect();

        Ok(vector)
    }
}

// ---------------------------------------------------------------------------
// Cache stats
// ---------------------------------------------------------------------------

/// Counters tracking embedding-cache effectiveness.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hit rate between 0.0 and 1.0; 0.0 when no lookups happened.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            return 0.0;
        }
        self.hits() as f64 / total as f64
    }
}

// ---------------------------------------------------------------------------
// Cached embedder
// ---------------------------------------------------------------------------

/// LRU-caching wrapper around any [`Embedder`].
///
/// Keys are the raw query text; values are shared vectors so cache hits do
/// not copy the embedding.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Cache<String, Arc<Vec<f32>>>,
    stats: Arc<CacheStats>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, capacity: u64) -> Self {
        Self {
            inner,
            cache: Cache::new(capacity),
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.cache.get(text).await {
            self.stats.record_hit();
            tracing::debug!(chars = text.len(), "embedding cache hit");
            return Ok(vector.as_ref().clone());
        }

        self.stats.record_miss();
        let vector = self.inner.embed(text).await?;
        self.cache
            .insert(text.to_string(), Arc::new(vector.clone()))
            .await;
        Ok(vector)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
