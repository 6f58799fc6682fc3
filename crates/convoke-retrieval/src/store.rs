//! Vector store contract and implementations.
//!
//! The core speaks to the store in vectors it has already computed; the
//! contract is upsert, similarity search, and collection info.
//! [`InMemoryVectorStore`] is a cosine-scoring map used in tests and small
//! deployments; [`HttpVectorStore`] adapts a points-style REST API.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::{Result, RetrievalError};

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// One search result from the store.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub score: f32,
    pub text: String,
    pub metadata: Value,
}

/// Collection-level information.
#[derive(Debug, Clone, Serialize)]
pub struct StoreInfo {
    pub count: usize,
    pub dim: usize,
    pub distance: String,
}

/// The vector-store seam consumed by the retrieval pipeline.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace a point.  `metadata` should carry the snippet text
    /// under the `text` key.
    async fn upsert(&self, id: &str, vector: &[f32], metadata: Value) -> Result<()>;

    /// Nearest-neighbor query returning hits scoring at least `min_score`,
    /// best first.
    async fn search(&self, vector: &[f32], k: usize, min_score: f32) -> Result<Vec<SearchHit>>;

    /// Collection info, also used as a reachability probe by `/health`.
    async fn info(&self) -> Result<StoreInfo>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Cosine-similarity store over a `HashMap`.
pub struct InMemoryVectorStore {
    dim: usize,
    points: RwLock<HashMap<String, (Vec<f32>, Value)>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            points: RwLock::new(HashMap::new()),
        }
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }

    fn check_dim(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dim,
                got: vector.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, id: &str, vector: &[f32], metadata: Value) -> Result<()> {
        self.check_dim(vector)?;
        self.points
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), (vector.to_vec(), metadata));
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize, min_score: f32) -> Result<Vec<SearchHit>> {
        self.check_dim(vector)?;

        let points = self.points.read().unwrap_or_else(|e| e.into_inner());
        let mut hits: Vec<SearchHit> = points
            .values()
            .map(|(v, metadata)| SearchHit {
                score: Self::cosine(vector, v),
                text: metadata["text"].as_str().unwrap_or_default().to_string(),
                metadata: metadata.clone(),
            })
            .filter(|hit| hit.score >= min_score)
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn info(&self) -> Result<StoreInfo> {
        Ok(StoreInfo {
            count: self.points.read().unwrap_or_else(|e| e.into_inner()).len(),
            dim: self.dim,
            distance: "cosine".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// HTTP store
// ---------------------------------------------------------------------------

/// Adapter for a points-style vector database REST API (collection info,
/// point upsert, similarity search).
pub struct HttpVectorStore {
    base_url: String,
    collection: String,
    http: reqwest::Client,
}

impl HttpVectorStore {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| RetrievalError::StoreUnreachable {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            http,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    async fn read_json(resp: reqwest::Response) -> Result<Value> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| RetrievalError::StoreUnreachable {
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(RetrievalError::StoreUnreachable {
                reason: format!("store returned {status}: {body}"),
            });
        }

        serde_json::from_str(&body).map_err(|e| RetrievalError::StoreParseFailed {
            reason: format!("invalid JSON response: {e}"),
        })
    }
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    async fn upsert(&self, id: &str, vector: &[f32], metadata: Value) -> Result<()> {
        let url = format!("{}/points", self.collection_url());
        let body = json!({
            "points": [{"id": id, "vector": vector, "payload": metadata}]
        });

        let resp = self.http.put(&url).json(&body).send().await.map_err(|e| {
            RetrievalError::StoreUnreachable {
                reason: e.to_string(),
            }
        })?;

        Self::read_json(resp).await.map(|_| ())
    }

    async fn search(&self, vector: &[f32], k: usize, min_score: f32) -> Result<Vec<SearchHit>> {
        let url = format!("{}/points/search", self.collection_url());
        let body = json!({
            "vector": vector,
            "limit": k,
            "score_threshold": min_score,
            "with_payload": true,
        });

        let resp = self.http.post(&url).json(&body).send().await.map_err(|e| {
            RetrievalError::StoreUnreachable {
                reason: e.to_string(),
            }
        })?;

        let v = Self::read_json(resp).await?;
        let hits = v["result"]
            .as_array()
            .ok_or_else(|| RetrievalError::StoreParseFailed {
                reason: "missing `result` array".into(),
            })?
            .iter()
            .map(|point| SearchHit {
                score: point["score"].as_f64().unwrap_or(0.0) as f32,
                text: point["payload"]["text"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                metadata: point["payload"].clone(),
            })
            .collect();

        Ok(hits)
    }

    async fn info(&self) -> Result<StoreInfo> {
        let resp = self
            .http
            .get(self.collection_url())
            .send()
            .await
            .map_err(|e| RetrievalError::StoreUnreachable {
                reason: e.to_string(),
            })?;

        let v = Self::read_json(resp).await?;
        Ok(StoreInfo {
            count: v["result"]["points_count"].as_u64().unwrap_or(0) as usize,
            dim: v["result"]["config"]["params"]["vectors"]["size"]
                .as_u64()
                .unwrap_or(0) as usize,
            distance: v["result"]["config"]["params"]["vectors"]["distance"]
                .as_str()
                .unwrap_or("unknown")
                .to_lowercase(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
