pub mod google;
#[path = "openai-compat.rs"]
pub mod openai_compat;

use async_trait::async_trait;

/// Failure kinds a completion call can surface.
///
/// Callers map each kind to a different user-facing reply, so the HTTP
/// status is folded into the variant rather than kept as a number.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Request body rejected as too large (HTTP 413).
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Provider throttled the request (HTTP 429).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Network or DNS failure before any response arrived.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// No response within the configured budget.
    #[error("completion timed out after {0}s")]
    Timeout(u64),

    /// Anything else: other statuses, malformed bodies, empty choices.
    #[error("completion failed: {0}")]
    Other(String),
}

/// A text completion backend
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String, LlmError>;
}

/// A chat message for agent communication
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}
