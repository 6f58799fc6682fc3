//! Per-component call counters.
//!
//! Each component (provider, tool, agent, cache) owns a [`ComponentMetrics`]
//! value; the [`MetricsHub`] indexes them by name for the introspection
//! endpoints.  Counters are plain atomics — no external metrics protocol is
//! involved.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Rolling call counters for one component.
#[derive(Debug, Default)]
pub struct ComponentMetrics {
    total_calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    sum_duration_ms: AtomicU64,
    count_for_avg: AtomicU64,
    last_duration_ms: AtomicU64,
}

/// Point-in-time copy of a component's counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub average_duration_ms: f64,
    pub last_duration_ms: u64,
}

impl ComponentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful call and its wall-clock duration.
    pub fn record_success(&self, duration_ms: u64) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.record_duration(duration_ms);
    }

    /// Record a failed call and its wall-clock duration.
    pub fn record_failure(&self, duration_ms: u64) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.record_duration(duration_ms);
    }

    fn record_duration(&self, duration_ms: u64) {
        self.sum_duration_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.count_for_avg.fetch_add(1, Ordering::Relaxed);
        self.last_duration_ms.store(duration_ms, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let sum = self.sum_duration_ms.load(Ordering::Relaxed);
        let count = self.count_for_avg.load(Ordering::Relaxed);
        MetricsSnapshot {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            average_duration_ms: if count == 0 { 0.0 } else { sum as f64 / count as f64 },
            last_duration_ms: self.last_duration_ms.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// Name-indexed collection of [`ComponentMetrics`], shared process-wide.
#[derive(Clone, Default)]
pub struct MetricsHub {
    inner: Arc<DashMap<String, Arc<ComponentMetrics>>>,
}

impl MetricsHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or lazily create) the counters for `name`.
    pub fn component(&self, name: &str) -> Arc<ComponentMetrics> {
        self.inner
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ComponentMetrics::new()))
            .clone()
    }

    /// Snapshot every registered component, sorted by name.
    pub fn snapshot_all(&self) -> Vec<(String, MetricsSnapshot)> {
        let mut all: Vec<(String, MetricsSnapshot)> = self
            .inner
            .iter()
            .map(|e| (e.key().clone(), e.value().snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
