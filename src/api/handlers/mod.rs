use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::AppState;
use crate::models::*;
use crate::pipeline::PipelineError;
use crate::quality::{EvaluateInput, QualityReport};
use crate::session::InitError;
use crate::stage::StageError;

// ============================================================
// Error Handling
// ============================================================

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable kind, e.g. `session_not_ready`.
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// Everything a handler can fail with.
#[derive(Debug)]
pub enum ApiError {
    Body(JsonRejection),
    Init(InitError),
    Stage(StageError),
    Pipeline(PipelineError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body(rejection)
    }
}

impl From<InitError> for ApiError {
    fn from(err: InitError) -> Self {
        Self::Init(err)
    }
}

impl From<StageError> for ApiError {
    fn from(err: StageError) -> Self {
        Self::Stage(err)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self::Pipeline(err)
    }
}

fn init_status(err: &InitError) -> (StatusCode, &'static str) {
    match err {
        InitError::Unreachable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "engine_unreachable"),
        InitError::AlreadyInitializing => (StatusCode::CONFLICT, "already_initializing"),
        InitError::ModelNotServed { .. } => (StatusCode::BAD_REQUEST, "model_not_served"),
        InitError::InvalidConfig(_) => (StatusCode::BAD_REQUEST, "invalid_config"),
    }
}

fn stage_status(err: &StageError) -> (StatusCode, &'static str) {
    match err {
        StageError::SessionNotReady => (StatusCode::CONFLICT, "session_not_ready"),
        StageError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
        StageError::ParseFailure { .. } => (StatusCode::BAD_GATEWAY, "parse_failure"),
        StageError::Engine(_) => (StatusCode::BAD_GATEWAY, "engine_error"),
    }
}

fn raw_response(err: &StageError) -> Option<String> {
    match err {
        StageError::ParseFailure { raw_response, .. } => Some(raw_response.clone()),
        _ => None,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Body(rejection) => (
                rejection.status(),
                ErrorBody {
                    error: "invalid_input".to_string(),
                    message: rejection.body_text(),
                    stage: None,
                    raw_response: None,
                },
            ),
            ApiError::Init(err) => {
                let (status, kind) = init_status(err);
                (
                    status,
                    ErrorBody {
                        error: kind.to_string(),
                        message: err.to_string(),
                        stage: None,
                        raw_response: None,
                    },
                )
            }
            ApiError::Stage(err) => {
                let (status, kind) = stage_status(err);
                let stage = match err {
                    StageError::ParseFailure { stage, .. } => Some(*stage),
                    _ => None,
                };
                (
                    status,
                    ErrorBody {
                        error: kind.to_string(),
                        message: err.to_string(),
                        stage,
                        raw_response: raw_response(err),
                    },
                )
            }
            ApiError::Pipeline(err) => {
                let status = match err.cause() {
                    StageError::SessionNotReady => StatusCode::CONFLICT,
                    StageError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (
                    status,
                    ErrorBody {
                        error: "stage_failed".to_string(),
                        message: err.to_string(),
                        stage: Some(err.stage()),
                        raw_response: raw_response(err.cause()),
                    },
                )
            }
        };

        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", status, body.message);
        } else {
            tracing::warn!("Request rejected ({}): {}", status, body.message);
        }
        (status, Json(body)).into_response()
    }
}

/// `Json` extractor whose rejections render as [`ErrorBody`].
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Session
// ============================================================

/// `/api/init` body; omitted fields take the server defaults.
#[derive(Debug, Default, Deserialize)]
pub struct InitRequest {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default, alias = "model")]
    pub model_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl InitRequest {
    fn into_config(self, defaults: &ModelConfig) -> ModelConfig {
        ModelConfig {
            base_url: self.base_url.unwrap_or_else(|| defaults.base_url.clone()),
            model_id: self.model_id.unwrap_or_else(|| defaults.model_id.clone()),
            api_key: self.api_key.or_else(|| defaults.api_key.clone()),
        }
    }
}

pub async fn init_session(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<InitRequest>,
) -> Result<Json<InitResponse>, ApiError> {
    let config = req.into_config(&state.default_model);
    let initialized = state.sessions.init(config).await?;
    Ok(Json(InitResponse {
        session: initialized.session.info().clone(),
        reused: initialized.reused,
    }))
}

pub async fn get_status(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.sessions.status())
}

// ============================================================
// Stages
// ============================================================

pub async fn extract_features(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ExtractFeaturesInput>,
) -> Result<Json<FeaturesResponse>, ApiError> {
    let session = state.sessions.ready_session()?;
    let output = state.executor.extract_features(&session, &input).await?;
    Ok(Json(FeaturesResponse {
        features: output.records,
        raw_response: output.raw_response,
    }))
}

pub async fn generate_test_points(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<GenerateTestPointsInput>,
) -> Result<Json<TestPointsResponse>, ApiError> {
    let session = state.sessions.ready_session()?;
    let output = state.executor.generate_test_points(&session, &input).await?;
    Ok(Json(TestPointsResponse {
        test_points: output.records,
        raw_response: output.raw_response,
    }))
}

pub async fn generate_test_cases(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<GenerateTestCasesInput>,
) -> Result<Json<TestCasesResponse>, ApiError> {
    let session = state.sessions.ready_session()?;
    let output = state.executor.generate_test_cases(&session, &input).await?;
    Ok(Json(TestCasesResponse {
        test_cases: output.records,
        raw_response: output.raw_response,
    }))
}

pub async fn run_full_pipeline(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<FullPipelineInput>,
) -> Result<Json<PipelineReport>, ApiError> {
    let session = state
        .sessions
        .ready_session()
        .map_err(|cause| PipelineError::StageFailed {
            stage: StageKind::Features,
            cause,
        })?;
    let report = state.orchestrator.run_full(&session, &input).await?;
    Ok(Json(report))
}

// ============================================================
// Quality
// ============================================================

pub async fn evaluate(
    JsonBody(input): JsonBody<EvaluateInput>,
) -> Result<Json<QualityReport>, ApiError> {
    Ok(Json(QualityReport::evaluate(&input)))
}
