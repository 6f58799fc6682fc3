//! Per-provider circuit breaker.
//!
//! A three-state machine that suppresses calls to a repeatedly failing
//! provider:
//!
//! | Transition | Condition |
//! |---|---|
//! | closed → open | `failure_threshold` consecutive failures |
//! | open → half-open | `open_timeout_ms` elapsed since opening |
//! | half-open → closed | `success_threshold` consecutive successes |
//! | half-open → open | any failure |
//!
//! State lives behind a `Mutex`; contention is bounded by one writer per
//! provider attempt.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use convoke_config::BreakerConfig;
use serde::Serialize;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// The breaker's externally visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Serializable view of a breaker for `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    /// Milliseconds the breaker has been open, when open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_for_ms: Option<u64>,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker guarding a single provider.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether an attempt may proceed right now.
    ///
    /// An open breaker whose timeout has elapsed transitions to half-open
    /// and admits the probe attempt.
    pub fn allows_attempt(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= Duration::from_millis(self.config.open_timeout_ms) {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_successes = 0;
                    tracing::debug!("circuit half-open, admitting probe");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.consecutive_failures = 0;
        match inner.state {
            BreakerState::Closed => {}
            BreakerState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.opened_at = None;
                    tracing::info!("circuit closed after successful probes");
                }
            }
            BreakerState::Open => {
                // A success while nominally open means the caller raced the
                // half-open transition; treat it as a probe success.
                inner.state = BreakerState::HalfOpen;
                inner.half_open_successes = 1;
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.consecutive_failures += 1;
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_successes = 0;
                tracing::warn!("circuit re-opened after half-open failure");
            }
            BreakerState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "circuit opened"
                    );
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Current state without side effects.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    /// Point-in-time view for health reporting.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            open_for_ms: inner
                .opened_at
                .filter(|_| inner.state == BreakerState::Open)
                .map(|at| at.elapsed().as_millis() as u64),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
