//! Ring-buffered audit log.
//!
//! Every component of the core writes [`LogEntry`] values to a process-wide
//! [`LogBuffer`].  The buffer keeps the most recent N entries for filtered
//! queries, mirrors each write to `tracing` (the console sink), and fans out
//! to live subscribers over [`tokio::sync::broadcast`] for the SSE log
//! stream.
//!
//! Entries are wrapped in [`Arc`] so broadcasting to multiple subscribers
//! does not clone the payload.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Entry types
// ---------------------------------------------------------------------------

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warn,
    Error,
}

/// The closed set of log categories.
///
/// Every entry belongs to exactly one category; queries filter on it and the
/// streaming UI groups by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    System,
    Config,
    Decision,
    Llm,
    Rag,
    Agent,
    Tool,
    Provider,
    Circuit,
    Request,
    Response,
}

impl LogCategory {
    /// Stable string form used in console output and metrics keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Config => "config",
            Self::Decision => "decision",
            Self::Llm => "llm",
            Self::Rag => "rag",
            Self::Agent => "agent",
            Self::Tool => "tool",
            Self::Provider => "provider",
            Self::Circuit => "circuit",
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

/// A single audit log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unix epoch milliseconds when the entry was written.
    pub timestamp_ms: i64,
    /// Severity.
    pub level: LogLevel,
    /// Which subsystem produced the entry.
    pub category: LogCategory,
    /// Human-readable message.
    pub message: String,
    /// Structured context (component ids, durations, counts).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// The request trace this entry belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl LogEntry {
    /// Create an entry stamped with the current wall clock.
    pub fn new(level: LogLevel, category: LogCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            level,
            category,
            message: message.into(),
            metadata: serde_json::Map::new(),
            trace_id: None,
        }
    }

    /// Builder: attach a trace id.
    pub fn with_trace(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Builder: attach one metadata key/value pair.
    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// Query filter
// ---------------------------------------------------------------------------

/// Filter for [`LogBuffer::query`].  Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Only entries at or above this level.
    pub min_level: Option<LogLevel>,
    /// Only entries in this category.
    pub category: Option<LogCategory>,
    /// Only entries belonging to this trace.
    pub trace_id: Option<String>,
    /// Return at most this many entries (most recent last).
    pub limit: Option<usize>,
}

impl LogFilter {
    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(min) = self.min_level {
            if entry.level < min {
                return false;
            }
        }
        if let Some(cat) = self.category {
            if entry.category != cat {
                return false;
            }
        }
        if let Some(ref trace) = self.trace_id {
            if entry.trace_id.as_deref() != Some(trace.as_str()) {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Buffer
// ---------------------------------------------------------------------------

/// Bounded ring buffer of log entries with broadcast fan-out.
///
/// Cheaply cloneable (`Arc`-backed) and `Send + Sync`.  Appends from a
/// single trace arrive in execution order because each request runs on one
/// logical task; ordering between traces is undefined.
#[derive(Clone)]
pub struct LogBuffer {
    inner: Arc<LogBufferInner>,
}

struct LogBufferInner {
    capacity: usize,
    ring: Mutex<VecDeque<Arc<LogEntry>>>,
    stream: broadcast::Sender<Arc<LogEntry>>,
}

/// Default number of entries retained.
pub const DEFAULT_RING_CAPACITY: usize = 10_000;

impl LogBuffer {
    /// Create a buffer retaining at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (stream, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(LogBufferInner {
                capacity: capacity.max(1),
                ring: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
                stream,
            }),
        }
    }

    /// Append an entry: store it in the ring, mirror it to `tracing`, and
    /// fan out to any live stream subscribers.
    pub fn push(&self, entry: LogEntry) {
        self.mirror_to_tracing(&entry);

        let entry = Arc::new(entry);
        {
            let mut ring = self.inner.ring.lock().unwrap_or_else(|e| e.into_inner());
            if ring.len() == self.inner.capacity {
                ring.pop_front();
            }
            ring.push_back(Arc::clone(&entry));
        }

        // No subscribers is the common case outside of SSE sessions.
        let _ = self.inner.stream.send(entry);
    }

    /// Convenience: build and push in one call.
    pub fn log(&self, level: LogLevel, category: LogCategory, message: impl Into<String>) {
        self.push(LogEntry::new(level, category, message));
    }

    /// Return entries matching `filter`, oldest first.
    pub fn query(&self, filter: &LogFilter) -> Vec<Arc<LogEntry>> {
        let ring = self.inner.ring.lock().unwrap_or_else(|e| e.into_inner());
        let matching: Vec<Arc<LogEntry>> = ring
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        match filter.limit {
            Some(limit) if matching.len() > limit => {
                matching[matching.len() - limit..].to_vec()
            }
            _ => matching,
        }
    }

    /// Number of entries currently retained.
    pub fn len(&self) -> usize {
        self.inner.ring.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to all future entries.  Entries pushed before this call are
    /// not replayed; use [`LogBuffer::query`] for history.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<LogEntry>> {
        self.inner.stream.subscribe()
    }

    /// Current number of live stream subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.stream.receiver_count()
    }

    fn mirror_to_tracing(&self, entry: &LogEntry) {
        let category = entry.category.as_str();
        let trace = entry.trace_id.as_deref().unwrap_or("-");
        match entry.level {
            LogLevel::Debug => {
                tracing::debug!(category, trace, "{}", entry.message);
            }
            LogLevel::Info | LogLevel::Success => {
                tracing::info!(category, trace, "{}", entry.message);
            }
            LogLevel::Warn => {
                tracing::warn!(category, trace, "{}", entry.message);
            }
            LogLevel::Error => {
                tracing::error!(category, trace, "{}", entry.message);
            }
        }
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_query() {
        let buffer = LogBuffer::new(16);
        buffer.log(LogLevel::Info, LogCategory::System, "boot");
        buffer.log(LogLevel::Error, LogCategory::Provider, "timeout");

        assert_eq!(buffer.len(), 2);

        let errors = buffer.query(&LogFilter {
            min_level: Some(LogLevel::Error),
            ..LogFilter::default()
        });
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "timeout");
    }

    #[test]
    fn ring_evicts_oldest() {
        let buffer = LogBuffer::new(3);
        for i in 0..5 {
            buffer.log(LogLevel::Info, LogCategory::System, format!("entry-{i}"));
        }

        assert_eq!(buffer.len(), 3);
        let all = buffer.query(&LogFilter::default());
        assert_eq!(all[0].message, "entry-2");
        assert_eq!(all[2].message, "entry-4");
    }

    #[test]
    fn filter_by_trace_id() {
        let buffer = LogBuffer::new(16);
        buffer.push(
            LogEntry::new(LogLevel::Info, LogCategory::Request, "received").with_trace("t-1"),
        );
        buffer.push(
            LogEntry::new(LogLevel::Info, LogCategory::Request, "received").with_trace("t-2"),
        );
        buffer.push(
            LogEntry::new(LogLevel::Info, LogCategory::Response, "done").with_trace("t-1"),
        );

        let t1 = buffer.query(&LogFilter {
            trace_id: Some("t-1".into()),
            ..LogFilter::default()
        });
        assert_eq!(t1.len(), 2);
        assert_eq!(t1[1].category, LogCategory::Response);
    }

    #[test]
    fn trace_entries_keep_execution_order() {
        let buffer = LogBuffer::new(64);
        for i in 0..10 {
            buffer.push(
                LogEntry::new(LogLevel::Debug, LogCategory::Decision, format!("step-{i}"))
                    .with_trace("t-9"),
            );
        }

        let entries = buffer.query(&LogFilter {
            trace_id: Some("t-9".into()),
            ..LogFilter::default()
        });
        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("step-{i}")).collect();
        assert_eq!(messages, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn limit_returns_most_recent() {
        let buffer = LogBuffer::new(16);
        for i in 0..6 {
            buffer.log(LogLevel::Info, LogCategory::Llm, format!("call-{i}"));
        }

        let last_two = buffer.query(&LogFilter {
            limit: Some(2),
            ..LogFilter::default()
        });
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].message, "call-4");
        assert_eq!(last_two[1].message, "call-5");
    }

    #[tokio::test]
    async fn stream_subscribers_receive_entries() {
        let buffer = LogBuffer::new(16);
        let mut rx = buffer.subscribe();
        assert_eq!(buffer.subscriber_count(), 1);

        buffer.log(LogLevel::Success, LogCategory::Response, "answered");

        let entry = rx.recv().await.expect("entry");
        assert_eq!(entry.level, LogLevel::Success);
        assert_eq!(entry.message, "answered");
    }

    #[test]
    fn level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warn < LogLevel::Error);
    }
}
