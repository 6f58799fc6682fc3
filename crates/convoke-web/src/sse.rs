//! Live log streaming over server-sent events.
//!
//! `GET /logs/stream` opens an SSE channel: one `{"type":"connected"}`
//! event on open, then a `{"type":"log","log":{...}}` event per ring
//! buffer write.  A client that falls behind the broadcast channel misses
//! the lagged entries and keeps receiving from the current position; a
//! closed connection drops the subscriber and releases its slot.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use tokio::sync::broadcast;

use convoke_kernel::LogEntry;

use crate::state::AppState;

/// Open the log stream.
pub async fn log_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.core().logs.subscribe();
    tracing::debug!("log stream subscriber connected");

    let connected = json!({"type": "connected"});
    let initial = futures::stream::once(async move {
        Ok(Event::default().data(connected.to_string()))
    });

    let entries = futures::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(entry) => {
                    let event = Event::default().data(log_event(&entry).to_string());
                    return Some((Ok(event), receiver));
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "log stream subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(futures::StreamExt::chain(initial, entries)).keep_alive(KeepAlive::default())
}

fn log_event(entry: &LogEntry) -> serde_json::Value {
    json!({"type": "log", "log": entry})
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use convoke_kernel::{LogCategory, LogLevel};

    #[test]
    fn log_event_shape() {
        let entry = LogEntry::new(LogLevel::Info, LogCategory::Request, "received");
        let event = log_event(&entry);
        assert_eq!(event["type"], "log");
        assert_eq!(event["log"]["category"], "request");
        assert_eq!(event["log"]["message"], "received");
    }
}
