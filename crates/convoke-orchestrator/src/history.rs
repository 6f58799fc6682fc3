//! Per-session conversation history.
//!
//! History is in-memory and per process; durable persistence belongs to an
//! external collaborator.  Each session's entries sit behind their own
//! `tokio::sync::Mutex`, and the orchestrator holds the lock for the life
//! of a request, which serializes requests within a session.  The busy
//! policy decides whether a second request queues or is rejected.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use convoke_config::{BusyPolicy, HistoryConfig};
use convoke_provider::Role;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One turn in a session.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// The decision reasoning that produced this turn, for assistant turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    /// Which provider answered, for assistant turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            intent: None,
            provider: None,
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        intent: Option<String>,
        provider: Option<String>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            intent,
            provider,
        }
    }
}

/// The entries of one session.  Only ever touched under the session lock.
#[derive(Debug, Default)]
pub struct SessionState {
    entries: VecDeque<HistoryEntry>,
}

impl SessionState {
    /// Append an entry, evicting the oldest beyond the turn bound.
    /// `max_turns` counts user/assistant pairs.
    pub fn append(&mut self, entry: HistoryEntry, max_turns: usize) {
        let max_entries = max_turns.saturating_mul(2).max(2);
        if self.entries.len() == max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// All sessions, keyed by session id.
pub struct HistoryStore {
    sessions: DashMap<String, Arc<Mutex<SessionState>>>,
    config: HistoryConfig,
}

/// The session lock could not be acquired under the `reject` policy.
#[derive(Debug, thiserror::Error)]
#[error("session `{session_id}` already has a request in flight")]
pub struct SessionBusy {
    pub session_id: String,
}

impl HistoryStore {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    pub fn max_turns(&self) -> usize {
        self.config.max_turns
    }

    fn session(&self, session_id: &str) -> Arc<Mutex<SessionState>> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionState::default())))
            .clone()
    }

    /// Acquire the session for one request.  Under `queue` the caller
    /// waits; under `reject` a busy session is an immediate error.
    pub async fn acquire(
        &self,
        session_id: &str,
    ) -> std::result::Result<OwnedMutexGuard<SessionState>, SessionBusy> {
        let session = self.session(session_id);
        match self.config.busy_policy {
            BusyPolicy::Queue => Ok(session.lock_owned().await),
            BusyPolicy::Reject => session.try_lock_owned().map_err(|_| SessionBusy {
                session_id: session_id.to_string(),
            }),
        }
    }

    /// Number of sessions seen so far.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
