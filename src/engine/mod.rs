//! Connection to the external inference engine.
//!
//! The engine (vLLM, SGLang, ...) is launched separately and exposes an
//! OpenAI-compatible API. [`EngineConnector`] establishes a handle during
//! session init; [`ChatEngine`] is the handle every stage call goes through.

mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ModelConfig;
use crate::session::InitError;

pub use openai::{HttpConnector, OpenAiEngine};

/// Sampling parameters sent with every completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// A single non-streaming chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub user: String,
    pub params: GenerationParams,
}

/// Failures talking to the inference engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("engine unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("engine request timed out: {0}")]
    Timeout(String),

    #[error("engine returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("engine returned no completion content")]
    EmptyResponse,

    #[error("could not decode engine response: {0}")]
    Decode(String),
}

impl EngineError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable { .. } | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::EmptyResponse | Self::Decode(_) => false,
        }
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(url.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Unreachable {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// Handle to a served model.
#[async_trait]
pub trait ChatEngine: Send + Sync {
    /// The served model name requests are addressed to.
    fn model_id(&self) -> &str;

    /// Send one chat completion and return the assistant message text.
    async fn complete(&self, request: ChatRequest) -> Result<String, EngineError>;
}

/// Establishes [`ChatEngine`] handles for session init.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn connect(&self, config: &ModelConfig) -> Result<Arc<dyn ChatEngine>, InitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        let status = |status| EngineError::Status {
            status,
            body: String::new(),
        };
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(400).is_transient());
        assert!(!status(404).is_transient());
    }

    #[test]
    fn malformed_replies_are_not_transient() {
        assert!(!EngineError::EmptyResponse.is_transient());
        assert!(!EngineError::Decode("bad".into()).is_transient());
        assert!(EngineError::Timeout("http://x".into()).is_transient());
    }
}
