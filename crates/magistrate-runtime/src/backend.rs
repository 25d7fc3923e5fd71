//! The backend invocation capability.
//!
//! A backend is anything that can take an assembled [`BackendRequest`]
//! and come back with raw reply text: a hosted chat completion API, a
//! local model server, or an in-process fake in tests. The pipeline
//! depends on nothing beyond this trait.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use magistrate_core::Metadata;

/// Errors from backend invocations.
///
/// `Timeout` and `Cancelled` are produced by the executor when its
/// deadline or the caller's cancellation wins the race; backends may
/// also return `Timeout` themselves when their transport notices first.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP transport failure: {0}")]
    Http(String),

    #[error("Backend API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited by the backend, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Authentication rejected by the backend")]
    Auth,

    #[error("Could not read the backend response: {0}")]
    Parse(String),

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Cancelled by caller")]
    Cancelled,

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

/// Attribution of a chat message.
///
/// Serializes to the lowercase role names the chat completion dialects
/// expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message in an assembled request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One fully-assembled backend invocation.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    /// Ordered messages: preambles first, then the instruction, then the
    /// literal subject text.
    pub messages: Vec<Message>,

    /// Maximum output length hint, in tokens.
    pub max_tokens: u32,

    /// Sampling temperature (0.0 for deterministic).
    pub temperature: f32,

    /// JSON schema the reply text must parse as. Backends that support
    /// structured output should forward it; all backends must produce
    /// conforming text regardless, at every fidelity level.
    pub schema: JsonValue,

    /// Backend-specific pass-through entries. Unrecognized keys are
    /// ignored.
    pub metadata: Metadata,

    /// Resolved deadline. The executor enforces it either way; backends
    /// may additionally apply it at the transport layer to fail faster.
    pub timeout: Duration,
}

/// A pluggable text-generation backend.
///
/// Implementations hold no per-call state: cancelling or timing out one
/// invocation must leave the handle usable for the next.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute one completion and return the raw reply text.
    async fn invoke(&self, request: BackendRequest) -> Result<String, BackendError>;

    /// Backend name for logs and diagnostics.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_serialize_lowercase() {
        assert_eq!(serde_json::to_value(Role::System).unwrap(), "system");
        assert_eq!(serde_json::to_value(Role::User).unwrap(), "user");
        assert_eq!(serde_json::to_value(Role::Assistant).unwrap(), "assistant");
    }

    #[test]
    fn test_message_serializes_flat() {
        let json = serde_json::to_value(Message::new(Role::User, "hello")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hello"}));
    }
}
