//! Scriptable transport for tests.
//!
//! Lets unit and integration tests exercise the cascade, the decision
//! engine's LLM-assisted phase, and the orchestrator without any network.
//! Shipped as a normal module (not `cfg(test)`) so downstream crates can use
//! it in their own test suites.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{ProviderError, Result};
use crate::transport::CompletionTransport;
use crate::types::{CompletionRequest, TransportReply};

enum Script {
    AlwaysOk(String),
    AlwaysFailing(u16),
    /// Fail the first `n` calls, then answer.
    FailThenSucceed(usize, String),
    /// Answer with the last user message, prefixed.
    EchoUser(String),
}

/// A transport whose behavior is fixed at construction.
pub struct MockTransport {
    script: Script,
    calls: AtomicUsize,
}

impl MockTransport {
    /// Every call succeeds with `text`.
    pub fn always_ok(text: impl Into<String>) -> Self {
        Self {
            script: Script::AlwaysOk(text.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails with the given HTTP status.
    pub fn always_failing(status: u16) -> Self {
        Self {
            script: Script::AlwaysFailing(status),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail the first `failures` calls with a 500, then succeed with `text`.
    pub fn fail_then_succeed(failures: usize, text: impl Into<String>) -> Self {
        Self {
            script: Script::FailThenSucceed(failures, text.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Succeed with `prefix` + the last user message.  Useful for asserting
    /// which prompt reached the provider.
    pub fn echo_user(prefix: impl Into<String>) -> Self {
        Self {
            script: Script::EchoUser(prefix.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of calls observed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionTransport for MockTransport {
    async fn complete(&self, _model: &str, request: &CompletionRequest) -> Result<TransportReply> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::AlwaysOk(text) => Ok(TransportReply {
                text: text.clone(),
                usage: None,
            }),
            Script::AlwaysFailing(status) => Err(ProviderError::HttpStatus {
                provider: "mock".into(),
                status: *status,
                body: "mock failure".into(),
            }),
            Script::FailThenSucceed(failures, text) => {
                if call < *failures {
                    Err(ProviderError::HttpStatus {
                        provider: "mock".into(),
                        status: 500,
                        body: "mock failure".into(),
                    })
                } else {
                    Ok(TransportReply {
                        text: text.clone(),
                        usage: None,
                    })
                }
            }
            Script::EchoUser(prefix) => {
                let last_user = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == crate::types::Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                Ok(TransportReply {
                    text: format!("{prefix}{last_user}"),
                    usage: None,
                })
            }
        }
    }
}
