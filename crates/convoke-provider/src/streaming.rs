//! SSE stream parsing for streaming completions.
//!
//! Providers configured with `stream = true` answer with server-sent
//! events.  The cascade still awaits the whole completion — streaming is
//! consumed to completion, never surfaced incrementally — so the parser
//! only has to accumulate text deltas and token usage until the terminal
//! event.
//!
//! Two dialects are handled: OpenAI-style chunks (`data: {...}` lines
//! ending with `data: [DONE]`) and Anthropic-style typed events
//! (`event:` + `data:` line pairs).

use serde_json::Value;

use convoke_config::WireFormat;

use crate::error::{ProviderError, Result};
use crate::types::Usage;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// One parsed streaming event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of assistant text.
    TextDelta(String),
    /// Token accounting, possibly partial (input and output arrive in
    /// different events on some providers).
    Usage { input: Option<u64>, output: Option<u64> },
    /// The stream is complete.
    Done,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// What one raw line contributes to the event stream.
#[derive(Debug, PartialEq, Eq)]
enum SseLine<'a> {
    /// Blank separators, `:` comments/keepalives, and anything else that
    /// carries no payload.
    Noise,
    /// An `event:` header naming the payload that follows (Anthropic).
    Header(&'a str),
    /// A `data:` payload.
    Payload(&'a str),
}

/// Classify a raw line.  The space after the field name is optional in SSE,
/// so `data:x` and `data: x` are equivalent.
fn classify(line: &str) -> SseLine<'_> {
    let line = line.trim_end();
    if let Some(name) = line.strip_prefix("event:") {
        SseLine::Header(name.trim_start())
    } else if let Some(payload) = line.strip_prefix("data:") {
        SseLine::Payload(payload.trim_start())
    } else {
        SseLine::Noise
    }
}

/// Parses raw SSE lines into [`StreamEvent`] values.
///
/// A header line only stashes the event name; the payload line that follows
/// resolves it, so the parser is stateful across calls.
#[derive(Debug)]
pub struct SseParser {
    provider_id: String,
    wire: WireFormat,
    /// Event name stashed by the last header line, awaiting its payload.
    pending_event: Option<String>,
}

impl SseParser {
    pub fn new(provider_id: impl Into<String>, wire: WireFormat) -> Self {
        Self {
            provider_id: provider_id.into(),
            wire,
            pending_event: None,
        }
    }

    /// Feed one line; yields an event once a payload line resolves.
    pub fn parse_line(&mut self, line: &str) -> Result<Option<StreamEvent>> {
        match classify(line) {
            SseLine::Noise => Ok(None),
            SseLine::Header(name) => {
                self.pending_event = Some(name.to_owned());
                Ok(None)
            }
            SseLine::Payload(payload) => match self.wire {
                WireFormat::OpenAi => self.parse_openai_data(payload),
                WireFormat::Anthropic => {
                    let kind = self.pending_event.take();
                    self.parse_anthropic_event(kind.as_deref().unwrap_or(""), payload)
                }
            },
        }
    }

    // -- OpenAI dialect -----------------------------------------------------

    fn parse_openai_data(&self, data: &str) -> Result<Option<StreamEvent>> {
        if data.trim() == "[DONE]" {
            return Ok(Some(StreamEvent::Done));
        }

        let v = self.parse_json(data)?;

        if let Some(text) = v["choices"][0]["delta"]["content"].as_str() {
            if !text.is_empty() {
                return Ok(Some(StreamEvent::TextDelta(text.to_owned())));
            }
        }

        // The final chunk may carry usage without any delta.
        if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
            return Ok(Some(StreamEvent::Usage {
                input: usage["prompt_tokens"].as_u64(),
                output: usage["completion_tokens"].as_u64(),
            }));
        }

        Ok(None)
    }

    // -- Anthropic dialect --------------------------------------------------

    fn parse_anthropic_event(&self, event_type: &str, data: &str) -> Result<Option<StreamEvent>> {
        match event_type {
            "message_start" => {
                let v = self.parse_json(data)?;
                Ok(Some(StreamEvent::Usage {
                    input: v["message"]["usage"]["input_tokens"].as_u64(),
                    output: None,
                }))
            }

            "content_block_delta" => {
                let v = self.parse_json(data)?;
                match v["delta"]["type"].as_str() {
                    Some("text_delta") => Ok(v["delta"]["text"]
                        .as_str()
                        .map(|t| StreamEvent::TextDelta(t.to_owned()))),
                    other => {
                        tracing::trace!(delta_type = ?other, "ignoring non-text delta");
                        Ok(None)
                    }
                }
            }

            "message_delta" => {
                let v = self.parse_json(data)?;
                Ok(Some(StreamEvent::Usage {
                    input: None,
                    output: v["usage"]["output_tokens"].as_u64(),
                }))
            }

            "message_stop" => Ok(Some(StreamEvent::Done)),

            "ping" | "content_block_start" | "content_block_stop" => Ok(None),

            // Some gateways terminate Anthropic-shaped streams the OpenAI
            // way; anything else unrecognised is skipped.
            _ if data.trim() == "[DONE]" => Ok(Some(StreamEvent::Done)),
            other => {
                tracing::trace!(event = other, "skipping unhandled stream event");
                Ok(None)
            }
        }
    }

    fn parse_json(&self, data: &str) -> Result<Value> {
        serde_json::from_str(data).map_err(|e| ProviderError::ParseFailed {
            provider: self.provider_id.clone(),
            reason: format!("stream payload is not valid JSON: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Line assembly
// ---------------------------------------------------------------------------

/// Reassembles SSE lines from arbitrarily sliced network chunks.
///
/// HTTP bodies arrive in chunks that cut lines anywhere; only text up to
/// the last `\n` of each chunk is line-complete.  The unterminated
/// remainder waits here for the next chunk.
#[derive(Debug, Default)]
pub struct LineFeed {
    remainder: String,
}

impl LineFeed {
    /// Absorb one chunk and return every line it completed, in order.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.remainder.push_str(chunk);
        if !self.remainder.contains('\n') {
            return Vec::new();
        }

        let mut lines: Vec<String> = self.remainder.split('\n').map(str::to_owned).collect();
        // `split` always yields a final element: the text after the last
        // newline, which becomes the new remainder (empty when the chunk
        // ended exactly on a line break).
        self.remainder = lines.pop().unwrap_or_default();
        lines
    }
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Folds a sequence of [`StreamEvent`]s into the final text and usage.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    done: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::TextDelta(t) => self.text.push_str(&t),
            StreamEvent::Usage { input, output } => {
                if input.is_some() {
                    self.input_tokens = input;
                }
                if output.is_some() {
                    self.output_tokens = output;
                }
            }
            StreamEvent::Done => self.done = true,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The accumulated text plus usage, if any usage was reported.
    pub fn finish(self) -> (String, Option<Usage>) {
        let usage = (self.input_tokens.is_some() || self.output_tokens.is_some()).then(|| Usage {
            input_tokens: self.input_tokens.unwrap_or(0),
            output_tokens: self.output_tokens.unwrap_or(0),
        });
        (self.text, usage)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_chunks_accumulate() {
        let mut parser = SseParser::new("p", WireFormat::OpenAi);
        let mut acc = StreamAccumulator::new();

        let lines = [
            r#"data: {"choices":[{"delta":{"role":"assistant","content":""}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":", world"}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":9,"completion_tokens":3}}"#,
            "data: [DONE]",
        ];
        for line in lines {
            if let Some(event) = parser.parse_line(line).expect("parses") {
                acc.apply(event);
            }
        }

        assert!(acc.is_done());
        let (text, usage) = acc.finish();
        assert_eq!(text, "Hello, world");
        assert_eq!(usage.unwrap().output_tokens, 3);
    }

    #[test]
    fn anthropic_events_accumulate() {
        let mut parser = SseParser::new("p", WireFormat::Anthropic);
        let mut acc = StreamAccumulator::new();

        let lines = [
            "event: message_start",
            r#"data: {"type":"message_start","message":{"id":"msg_01","usage":{"input_tokens":12,"output_tokens":0}}}"#,
            "event: content_block_delta",
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Olá"}}"#,
            "event: content_block_delta",
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"!"}}"#,
            "event: message_delta",
            r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":2}}"#,
            "event: message_stop",
            "data: {}",
        ];
        for line in lines {
            if let Some(event) = parser.parse_line(line).expect("parses") {
                acc.apply(event);
            }
        }

        assert!(acc.is_done());
        let (text, usage) = acc.finish();
        assert_eq!(text, "Olá!");
        let usage = usage.unwrap();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 2);
    }

    #[test]
    fn blank_and_comment_lines_ignored() {
        let mut parser = SseParser::new("p", WireFormat::OpenAi);
        assert!(parser.parse_line("").expect("ok").is_none());
        assert!(parser.parse_line(": keepalive").expect("ok").is_none());
    }

    #[test]
    fn field_space_is_optional() {
        assert_eq!(classify("data:{}"), SseLine::Payload("{}"));
        assert_eq!(classify("data: {}"), SseLine::Payload("{}"));
        assert_eq!(classify("event:ping"), SseLine::Header("ping"));
        assert_eq!(classify(": comment"), SseLine::Noise);
        assert_eq!(classify("retry: 500"), SseLine::Noise);
    }

    #[test]
    fn line_feed_reassembles_split_lines() {
        let mut feed = LineFeed::default();

        assert!(feed.feed("data: {\"a\"").is_empty());
        let lines = feed.feed(": 1}\ndata: [DO");
        assert_eq!(lines, vec![r#"data: {"a": 1}"#]);

        let lines = feed.feed("NE]\n");
        assert_eq!(lines, vec!["data: [DONE]"]);
        assert!(feed.feed("").is_empty());
    }

    #[test]
    fn line_feed_handles_multiple_lines_per_chunk() {
        let mut feed = LineFeed::default();
        let lines = feed.feed("event: a\ndata: 1\n\ndata: 2\ntail");
        assert_eq!(lines, vec!["event: a", "data: 1", "", "data: 2"]);
        assert_eq!(feed.feed("\n"), vec!["tail"]);
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let mut parser = SseParser::new("p", WireFormat::OpenAi);
        let err = parser.parse_line("data: {broken").expect_err("must fail");
        assert!(matches!(err, ProviderError::ParseFailed { .. }));
    }

    #[test]
    fn done_without_usage() {
        let mut acc = StreamAccumulator::new();
        acc.apply(StreamEvent::TextDelta("x".into()));
        acc.apply(StreamEvent::Done);
        let (text, usage) = acc.finish();
        assert_eq!(text, "x");
        assert!(usage.is_none());
    }
}
