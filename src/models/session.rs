use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default OpenAI-compatible endpoint of the local inference server.
pub const DEFAULT_ENGINE_URL: &str = "http://localhost:12349/v1";

/// Default served model name.
pub const DEFAULT_MODEL_ID: &str = "Qwen3-8B";

/// Where and what to connect to when initializing a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_id", alias = "model")]
    pub model_id: String,
    /// Bearer token for engines started with `--api-key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_ENGINE_URL.to_string()
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model_id: default_model_id(),
            api_key: None,
        }
    }
}

impl ModelConfig {
    pub fn new(base_url: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model_id: model_id.into(),
            api_key: None,
        }
    }
}

/// The lifecycle state of the engine session.
///
/// - `Uninitialized`: `/api/init` has never been called
/// - `Initializing`: An init is in flight; other inits fail fast
/// - `Ready`: Stage calls may run
/// - `Failed`: The last init attempt failed; call `/api/init` again
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// Public description of a ready session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: Uuid,
    pub model_id: String,
    pub base_url: String,
    pub initialized_at: DateTime<Utc>,
}

/// Snapshot returned by `/api/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub status: SessionState,
    /// Model of the current, pending, or last failed session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,
    /// Reason the last init failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response from `/api/init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitResponse {
    pub session: SessionInfo,
    /// `true` when an existing ready session with the same config was returned.
    pub reused: bool,
}
