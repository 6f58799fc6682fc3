//! Core types for LLM interaction.
//!
//! Provider-agnostic request/response shapes.  The [`super::transport`]
//! module translates them into provider-specific wire formats.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions that shape model behavior.
    System,
    /// Input from the human user.
    User,
    /// Output from the LLM.
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// A provider-agnostic completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Overrides the provider's default model when set.
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Single user message, everything else defaulted.
    pub fn from_user(text: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(text)],
            ..Self::default()
        }
    }
}

/// Token accounting reported by the provider, when available.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Raw outcome of one transport call: the assistant text plus usage.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub text: String,
    pub usage: Option<Usage>,
}

/// The final result of a cascade walk: which provider/model produced what.
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub text: String,
    pub provider_id: String,
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let msg = ChatMessage::system("be brief");
        assert_eq!(msg.role, Role::System);
        assert_eq!(msg.content, "be brief");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn request_from_user() {
        let request = CompletionRequest::from_user("hello");
        assert_eq!(request.messages.len(), 1);
        assert!(request.model.is_none());
    }
}
