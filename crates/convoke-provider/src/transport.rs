//! Provider transports.
//!
//! A [`CompletionTransport`] turns the provider-agnostic
//! [`CompletionRequest`] into one HTTP request against a concrete provider
//! and extracts the assistant text from the reply.  Two wire formats are
//! supported: OpenAI-compatible chat completions (also spoken by Ollama and
//! most gateways) and the Anthropic Messages API.  Providers configured
//! with `stream = true` answer over SSE; the stream is consumed to
//! completion, so callers always see one whole reply per attempt.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use convoke_config::{ProviderConfig, WireFormat};

use crate::error::{ProviderError, Result};
use crate::streaming::{LineFeed, SseParser, StreamAccumulator};
use crate::types::{CompletionRequest, Role, TransportReply, Usage};

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One attempt against one provider.  Implementations are cheap to share;
/// the cascade owns one per candidate.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Issue the call for `model` and return the raw assistant text.
    ///
    /// Implementations classify transport, HTTP, and parse failures into
    /// [`ProviderError`] variants; the cascade maps those onto attempt
    /// records and breaker transitions.
    async fn complete(&self, model: &str, request: &CompletionRequest) -> Result<TransportReply>;
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

/// reqwest-backed transport for a single configured provider.
pub struct HttpTransport {
    provider_id: String,
    base_url: String,
    wire: WireFormat,
    api_key: Option<String>,
    stream: bool,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport from the provider's configuration, resolving the
    /// API key from its declared env var.  Local providers may omit the key.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = match &config.api_key_env {
            Some(env_var) if !env_var.is_empty() => {
                let key = std::env::var(env_var).ok().filter(|k| !k.is_empty());
                if key.is_none() && config.kind == convoke_config::ProviderKind::Cloud {
                    return Err(ProviderError::MissingApiKey {
                        provider: config.id.clone(),
                        env_var: env_var.clone(),
                    });
                }
                key
            }
            _ => None,
        };

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ProviderError::Transport {
                provider: config.id.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            provider_id: config.id.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            wire: config.wire,
            api_key,
            stream: config.stream,
            http,
        })
    }

    /// Consume an SSE body to completion, accumulating text and usage.
    ///
    /// Returns as soon as the terminal event arrives.  A connection that
    /// closes early yields whatever was accumulated — the cascade's empty-
    /// completion check decides whether that counts as a failure.
    async fn consume_stream(&self, resp: reqwest::Response) -> Result<TransportReply> {
        let mut parser = SseParser::new(&self.provider_id, self.wire);
        let mut lines = LineFeed::default();
        let mut reply = StreamAccumulator::new();
        let mut body = resp.bytes_stream();

        while let Some(chunk) = body.next().await {
            let bytes = chunk.map_err(|e| ProviderError::Transport {
                provider: self.provider_id.clone(),
                reason: format!("stream interrupted: {e}"),
            })?;
            let text = std::str::from_utf8(&bytes).map_err(|e| ProviderError::ParseFailed {
                provider: self.provider_id.clone(),
                reason: format!("stream chunk is not UTF-8: {e}"),
            })?;

            for line in lines.feed(text) {
                let Some(event) = parser.parse_line(&line)? else {
                    continue;
                };
                reply.apply(event);
                if reply.is_done() {
                    let (text, usage) = reply.finish();
                    return Ok(TransportReply { text, usage });
                }
            }
        }

        let (text, usage) = reply.finish();
        Ok(TransportReply { text, usage })
    }

    // -- Request building ---------------------------------------------------

    fn build_openai_body(&self, model: &str, request: &CompletionRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    /// Anthropic expects the system prompt as a top-level field, not in the
    /// messages array; multiple system messages are concatenated.
    fn build_anthropic_body(&self, model: &str, request: &CompletionRequest) -> Value {
        let mut system: Option<String> = None;
        let mut messages: Vec<Value> = Vec::with_capacity(request.messages.len());

        for msg in &request.messages {
            match msg.role {
                Role::System => match &mut system {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(&msg.content);
                    }
                    None => system = Some(msg.content.clone()),
                },
                Role::User | Role::Assistant => {
                    messages.push(json!({"role": msg.role.as_str(), "content": msg.content}));
                }
            }
        }

        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens.unwrap_or(1024),
            "messages": messages,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    fn endpoint(&self) -> String {
        match self.wire {
            WireFormat::OpenAi => format!("{}/chat/completions", self.base_url),
            WireFormat::Anthropic => format!("{}/v1/messages", self.base_url),
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(key) = &self.api_key {
            match self.wire {
                WireFormat::OpenAi => {
                    let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                        ProviderError::Transport {
                            provider: self.provider_id.clone(),
                            reason: format!("invalid authorization header: {e}"),
                        }
                    })?;
                    headers.insert(reqwest::header::AUTHORIZATION, value);
                }
                WireFormat::Anthropic => {
                    let value =
                        HeaderValue::from_str(key).map_err(|e| ProviderError::Transport {
                            provider: self.provider_id.clone(),
                            reason: format!("invalid api key header: {e}"),
                        })?;
                    headers.insert("x-api-key", value);
                    headers.insert(
                        "anthropic-version",
                        HeaderValue::from_static(ANTHROPIC_VERSION),
                    );
                }
            }
        }
        Ok(headers)
    }

    // -- Response parsing ---------------------------------------------------

    fn parse_openai(&self, v: &Value) -> Result<TransportReply> {
        let text = v["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::ParseFailed {
                provider: self.provider_id.clone(),
                reason: "missing choices[0].message.content".into(),
            })?
            .to_owned();

        let usage = v.get("usage").map(|u| Usage {
            input_tokens: u["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: u["completion_tokens"].as_u64().unwrap_or(0),
        });

        Ok(TransportReply { text, usage })
    }

    fn parse_anthropic(&self, v: &Value) -> Result<TransportReply> {
        let content = v["content"]
            .as_array()
            .ok_or_else(|| ProviderError::ParseFailed {
                provider: self.provider_id.clone(),
                reason: "missing `content` array in response".into(),
            })?;

        let text: String = content
            .iter()
            .filter(|block| block["type"] == "text")
            .filter_map(|block| block["text"].as_str())
            .collect();

        let usage = v.get("usage").map(|u| Usage {
            input_tokens: u["input_tokens"].as_u64().unwrap_or(0),
            output_tokens: u["output_tokens"].as_u64().unwrap_or(0),
        });

        Ok(TransportReply { text, usage })
    }
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn complete(&self, model: &str, request: &CompletionRequest) -> Result<TransportReply> {
        let mut body = match self.wire {
            WireFormat::OpenAi => self.build_openai_body(model, request),
            WireFormat::Anthropic => self.build_anthropic_body(model, request),
        };
        if self.stream {
            body["stream"] = json!(true);
        }
        let url = self.endpoint();

        tracing::debug!(
            provider = %self.provider_id,
            url = %url,
            model,
            stream = self.stream,
            "sending completion request"
        );

        let resp = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                provider: self.provider_id.clone(),
                reason: e.to_string(),
            })?;

        let status = resp.status();

        if self.stream && status.is_success() {
            return self.consume_stream(resp).await;
        }

        let text = resp.text().await.map_err(|e| ProviderError::Transport {
            provider: self.provider_id.clone(),
            reason: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(ProviderError::HttpStatus {
                provider: self.provider_id.clone(),
                status: status.as_u16(),
                body: text.chars().take(512).collect(),
            });
        }

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyCompletion {
                provider: self.provider_id.clone(),
            });
        }

        let v: Value = serde_json::from_str(&text).map_err(|e| ProviderError::ParseFailed {
            provider: self.provider_id.clone(),
            reason: format!("invalid JSON response: {e}"),
        })?;

        match self.wire {
            WireFormat::OpenAi => self.parse_openai(&v),
            WireFormat::Anthropic => self.parse_anthropic(&v),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    fn transport(wire: WireFormat) -> HttpTransport {
        // OpenAI-style bases include the /v1 segment; Anthropic bases do not.
        let base_url = match wire {
            WireFormat::OpenAi => "https://api.example.com/v1",
            WireFormat::Anthropic => "https://api.example.com",
        };
        HttpTransport {
            provider_id: "test".into(),
            base_url: base_url.into(),
            wire,
            api_key: Some("key".into()),
            stream: false,
            http: reqwest::Client::new(),
        }
    }

    #[test]
    fn openai_body_shape() {
        let t = transport(WireFormat::OpenAi);
        let request = CompletionRequest {
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("hi")],
            model: None,
            max_tokens: Some(256),
            temperature: Some(0.2),
        };

        let body = t.build_openai_body("model-a", &request);
        assert_eq!(body["model"], "model-a");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn anthropic_body_hoists_system() {
        let t = transport(WireFormat::Anthropic);
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system("rule one"),
                ChatMessage::system("rule two"),
                ChatMessage::user("hi"),
            ],
            model: None,
            max_tokens: None,
            temperature: None,
        };

        let body = t.build_anthropic_body("model-b", &request);
        assert_eq!(body["system"], "rule one\nrule two");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn parse_openai_reply() {
        let t = transport(WireFormat::OpenAi);
        let v = json!({
            "choices": [{"message": {"role": "assistant", "content": "hello there"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4}
        });
        let reply = t.parse_openai(&v).expect("parses");
        assert_eq!(reply.text, "hello there");
        assert_eq!(reply.usage.unwrap().output_tokens, 4);
    }

    #[test]
    fn parse_anthropic_reply_concatenates_text_blocks() {
        let t = transport(WireFormat::Anthropic);
        let v = json!({
            "content": [
                {"type": "text", "text": "part one "},
                {"type": "text", "text": "part two"}
            ],
            "usage": {"input_tokens": 8, "output_tokens": 3}
        });
        let reply = t.parse_anthropic(&v).expect("parses");
        assert_eq!(reply.text, "part one part two");
    }

    #[test]
    fn parse_failure_on_missing_fields() {
        let t = transport(WireFormat::OpenAi);
        let err = t.parse_openai(&json!({"choices": []})).expect_err("fails");
        assert!(matches!(err, ProviderError::ParseFailed { .. }));
    }

    #[test]
    fn endpoints_per_wire() {
        assert_eq!(
            transport(WireFormat::OpenAi).endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            transport(WireFormat::Anthropic).endpoint(),
            "https://api.example.com/v1/messages"
        );
    }
}
