//! Chat-completion client seam
//!
//! The model policy talks to a remote language model only through
//! [`LLMProvider`]. The binary wires in [`openai::OpenAIProvider`]; tests use
//! scripted providers or a wiremock endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod openai;

pub type Result<T> = std::result::Result<T, LLMError>;

/// Failure talking to the completion endpoint
///
/// Messages carry the response body or transport error, never the API key.
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Completion endpoint unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("API key rejected: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limited by completion endpoint")]
    RateLimitExceeded,

    #[error("Request rejected: {0}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Completion request timed out")]
    Timeout,

    #[error("Unreadable completion: {0}")]
    ParseError(String),
}

/// Who authored a history entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Task instructions, pinned at the head of the history
    System,
    /// Actions the agent played
    Assistant,
    /// Game text, rewards and prompts
    User,
}

impl MessageRole {
    /// Wire name used by chat-completion APIs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Assistant => "assistant",
            Self::User => "user",
        }
    }
}

/// One entry of the conversation sent to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn is_system(&self) -> bool {
        self.role == MessageRole::System
    }
}

/// Remote model that turns a conversation into one reply
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Short provider label for logs
    fn name(&self) -> &str;

    /// Model identifier sent with every request
    fn model(&self) -> &str;

    /// Complete the conversation and return the raw assistant text, untrimmed
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Cheap local readiness check; no request is made
    async fn check_health(&self) -> bool {
        true
    }
}
