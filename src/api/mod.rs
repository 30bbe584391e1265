mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::engine::HttpConnector;
use crate::models::ModelConfig;
use crate::pipeline::Orchestrator;
use crate::session::SessionManager;
use crate::stage::StageExecutor;

pub use handlers::{ApiError, ErrorBody};
pub use middleware::{RateLimiter, SecurityConfig};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub executor: Arc<StageExecutor>,
    pub orchestrator: Arc<Orchestrator>,
    /// Filled into `/api/init` requests that omit fields.
    pub default_model: ModelConfig,
}

impl AppState {
    pub fn new(sessions: SessionManager, executor: StageExecutor) -> Self {
        let executor = Arc::new(executor);
        Self {
            sessions: Arc::new(sessions),
            orchestrator: Arc::new(Orchestrator::new(executor.clone())),
            executor,
            default_model: ModelConfig::default(),
        }
    }

    pub fn with_default_model(mut self, model: ModelConfig) -> Self {
        self.default_model = model;
        self
    }

    /// State wired to a real OpenAI-compatible engine.
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let connector = HttpConnector::new(config.request_timeout, config.connect_timeout)?;
        let executor = StageExecutor::new(config.prompts()?, config.params)
            .with_engine_retries(config.engine_retries);
        Ok(Self::new(SessionManager::new(Arc::new(connector)), executor)
            .with_default_model(config.default_model.clone()))
    }
}

/// Router with security taken from the environment.
pub fn create_router(state: AppState) -> Router {
    create_router_with_security(state, SecurityConfig::from_env())
}

pub fn create_router_with_security(state: AppState, security: SecurityConfig) -> Router {
    let mut protected = Router::new()
        // Session
        .route("/init", post(handlers::init_session))
        .route("/status", get(handlers::get_status))
        // Stages
        .route("/features", post(handlers::extract_features))
        .route("/test-points", post(handlers::generate_test_points))
        .route("/test-cases", post(handlers::generate_test_cases))
        .route("/full-pipeline", post(handlers::run_full_pipeline))
        // Quality
        .route("/evaluate", post(handlers::evaluate));

    if let Some(limiter) = security.rate_limiter.clone() {
        protected = protected.layer(from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }
    // Outermost so unauthenticated requests never count against the limit.
    protected = protected.layer(from_fn_with_state(
        security.clone(),
        middleware::auth_middleware,
    ));

    let api = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected);

    Router::new()
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&security)),
        )
        .with_state(state)
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    match &security.cors_origins {
        Some(origins) if !origins.is_empty() => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match origin.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        _ => CorsLayer::permissive(),
    }
}
