//! OpenAI-compatible HTTP client for vLLM / SGLang style servers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{ChatEngine, ChatRequest, EngineConnector, EngineError};
use crate::models::ModelConfig;
use crate::session::InitError;

// ============================================================
// Wire types
// ============================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

// ============================================================
// Engine handle
// ============================================================

/// Chat completions against one served model.
#[derive(Debug, Clone)]
pub struct OpenAiEngine {
    base_url: String,
    model_id: String,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiEngine {
    pub fn new(client: Client, config: &ModelConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model_id: config.model_id.clone(),
            api_key: config.api_key.clone(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request with optional auth header.
    fn request(&self, method: reqwest::Method, path: &str) -> (String, reqwest::RequestBuilder) {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, &url);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        (url, req)
    }

    /// Handle response, converting HTTP errors to EngineError.
    async fn handle_response<T: DeserializeOwned>(
        url: &str,
        response: reqwest::Response,
    ) -> Result<T, EngineError> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| EngineError::from_reqwest(url, e))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(EngineError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Ids of the models the server is serving.
    pub async fn list_models(&self) -> Result<Vec<String>, EngineError> {
        let (url, req) = self.request(reqwest::Method::GET, "/models");
        let response = req
            .send()
            .await
            .map_err(|e| EngineError::from_reqwest(&url, e))?;
        let list: ModelList = Self::handle_response(&url, response).await?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl ChatEngine for OpenAiEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, EngineError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.user,
        });

        let body = ChatCompletionRequest {
            model: &self.model_id,
            messages,
            max_tokens: request.params.max_tokens,
            temperature: request.params.temperature,
            stream: false,
        };

        let (url, req) = self.request(reqwest::Method::POST, "/chat/completions");
        let response = req
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::from_reqwest(&url, e))?;
        let completion: ChatCompletionResponse = Self::handle_response(&url, response).await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(EngineError::EmptyResponse)
    }
}

// ============================================================
// Connector
// ============================================================

/// Connects sessions to an engine over HTTP, probing `/models` first.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EngineConnector for HttpConnector {
    async fn connect(&self, config: &ModelConfig) -> Result<Arc<dyn ChatEngine>, InitError> {
        let engine = OpenAiEngine::new(self.client.clone(), config);

        let served = engine
            .list_models()
            .await
            .map_err(|e| InitError::Unreachable {
                base_url: engine.base_url().to_string(),
                reason: e.to_string(),
            })?;

        if served.is_empty() {
            tracing::warn!(
                "Engine at {} listed no models; assuming {} is served",
                engine.base_url(),
                config.model_id
            );
        } else if !served.iter().any(|id| id == &config.model_id) {
            return Err(InitError::ModelNotServed {
                model_id: config.model_id.clone(),
                served,
            });
        }

        tracing::info!(
            "Connected to engine at {} (model {})",
            engine.base_url(),
            config.model_id
        );
        Ok(Arc::new(engine))
    }
}
