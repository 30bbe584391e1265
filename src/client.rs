//! HTTP client for a running test generation service.
//!
//! Used by the CLI subcommands. Configuration is via environment variables:
//! - `TESTGEN_URL` - Base URL (default: `http://localhost:8080/api`)
//! - `TESTGEN_API_KEY` - API key for authentication (optional for local)

use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::api::ErrorBody;
use crate::models::*;
use crate::quality::{EvaluateInput, QualityReport};

/// Default URL for local development.
const DEFAULT_URL: &str = "http://localhost:8080/api";

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: API key required or invalid")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Generation failed: {message}")]
    BadGateway {
        message: String,
        stage: Option<StageKind>,
        raw_response: Option<String>,
    },

    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Server error: {0}")]
    Server(String),
}

/// HTTP client for the `/api` surface.
#[derive(Debug, Clone)]
pub struct TestGenClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl TestGenClient {
    /// Create client from environment variables.
    pub fn from_env() -> Self {
        let base_url = std::env::var("TESTGEN_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        let api_key = std::env::var("TESTGEN_API_KEY").ok();
        Self::new(base_url, api_key)
    }

    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request with optional auth header.
    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, &url);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    /// Convert non-2xx responses into `ClientError`.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let body: Option<ErrorBody> = serde_json::from_str(&text).ok();
        let message = body
            .as_ref()
            .map(|b| b.message.clone())
            .unwrap_or_else(|| text.clone());

        Err(match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                ClientError::BadRequest(message)
            }
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
            StatusCode::CONFLICT => ClientError::Conflict(message),
            StatusCode::BAD_GATEWAY => {
                let (stage, raw_response) = body
                    .map(|b| (b.stage, b.raw_response))
                    .unwrap_or_default();
                ClientError::BadGateway {
                    message,
                    stage,
                    raw_response,
                }
            }
            StatusCode::SERVICE_UNAVAILABLE => ClientError::Unavailable(message),
            _ => ClientError::Server(format!("{}: {}", status, message)),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.request(Method::GET, path).send().await?;
        self.handle_response(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self.request(Method::POST, path).json(body).send().await?;
        self.handle_response(response).await
    }

    // ============================================================
    // Session Operations
    // ============================================================

    /// Liveness check.
    pub async fn health(&self) -> Result<serde_json::Value, ClientError> {
        self.get("/health").await
    }

    pub async fn status(&self) -> Result<SessionStatus, ClientError> {
        self.get("/status").await
    }

    /// Initialize the session; `None` fields take the server's defaults.
    pub async fn init(
        &self,
        base_url: Option<&str>,
        model_id: Option<&str>,
    ) -> Result<InitResponse, ClientError> {
        let mut body = serde_json::Map::new();
        if let Some(url) = base_url {
            body.insert("base_url".into(), url.into());
        }
        if let Some(model) = model_id {
            body.insert("model_id".into(), model.into());
        }
        self.post("/init", &body).await
    }

    // ============================================================
    // Stage Operations
    // ============================================================

    pub async fn extract_features(
        &self,
        input: &ExtractFeaturesInput,
    ) -> Result<FeaturesResponse, ClientError> {
        self.post("/features", input).await
    }

    pub async fn generate_test_points(
        &self,
        input: &GenerateTestPointsInput,
    ) -> Result<TestPointsResponse, ClientError> {
        self.post("/test-points", input).await
    }

    pub async fn generate_test_cases(
        &self,
        input: &GenerateTestCasesInput,
    ) -> Result<TestCasesResponse, ClientError> {
        self.post("/test-cases", input).await
    }

    pub async fn run_full_pipeline(
        &self,
        input: &FullPipelineInput,
    ) -> Result<PipelineReport, ClientError> {
        self.post("/full-pipeline", input).await
    }

    pub async fn evaluate(&self, input: &EvaluateInput) -> Result<QualityReport, ClientError> {
        self.post("/evaluate", input).await
    }
}
