use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prd_testgen::engine::{
    ChatEngine, ChatRequest, EngineConnector, EngineError, GenerationParams, HttpConnector,
};
use prd_testgen::models::ModelConfig;
use prd_testgen::session::InitError;
use serde_json::{json, Value};

/// In-process stand-in for an OpenAI-compatible inference server.
#[derive(Default)]
struct MockEngine {
    models: Vec<String>,
    reply_status: u16,
    reply_content: Option<String>,
    bodies: Mutex<Vec<Value>>,
    auth_headers: Mutex<Vec<Option<String>>>,
}

async fn list_models(State(mock): State<Arc<MockEngine>>) -> Json<Value> {
    let data: Vec<Value> = mock
        .models
        .iter()
        .map(|id| json!({ "id": id, "object": "model" }))
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

async fn chat_completions(
    State(mock): State<Arc<MockEngine>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    mock.bodies.lock().unwrap().push(body);
    mock.auth_headers.lock().unwrap().push(
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );

    let status = StatusCode::from_u16(mock.reply_status).unwrap();
    if !status.is_success() {
        return (status, Json(json!({ "error": "engine overloaded" })));
    }
    (
        status,
        Json(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": mock.reply_content },
                "finish_reason": "stop"
            }]
        })),
    )
}

async fn spawn_engine(mock: MockEngine) -> (Arc<MockEngine>, String) {
    let mock = Arc::new(MockEngine {
        reply_status: if mock.reply_status == 0 { 200 } else { mock.reply_status },
        ..mock
    });
    let app = Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (mock, format!("http://{}/v1", addr))
}

fn connector() -> HttpConnector {
    HttpConnector::new(Duration::from_secs(5), Duration::from_secs(2)).unwrap()
}

fn request(user: &str) -> ChatRequest {
    ChatRequest {
        system: Some("You are a QA analyst.".into()),
        user: user.into(),
        params: GenerationParams::default(),
    }
}

mod connect {
    use super::*;

    #[tokio::test]
    async fn succeeds_when_model_is_served() {
        let (_mock, url) = spawn_engine(MockEngine {
            models: vec!["Qwen3-8B".into()],
            ..MockEngine::default()
        })
        .await;

        let engine = connector()
            .connect(&ModelConfig::new(url, "Qwen3-8B"))
            .await
            .unwrap();
        assert_eq!(engine.model_id(), "Qwen3-8B");
    }

    #[tokio::test]
    async fn rejects_model_the_engine_does_not_serve() {
        let (_mock, url) = spawn_engine(MockEngine {
            models: vec!["Llama-3-8B".into()],
            ..MockEngine::default()
        })
        .await;

        let err = connector()
            .connect(&ModelConfig::new(url, "Qwen3-8B"))
            .await
            .err()
            .unwrap();
        match err {
            InitError::ModelNotServed { model_id, served } => {
                assert_eq!(model_id, "Qwen3-8B");
                assert_eq!(served, vec!["Llama-3-8B".to_string()]);
            }
            other => panic!("expected ModelNotServed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn proceeds_when_engine_lists_no_models() {
        let (_mock, url) = spawn_engine(MockEngine::default()).await;

        let result = connector().connect(&ModelConfig::new(url, "Qwen3-8B")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn reports_unreachable_engine() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connector()
            .connect(&ModelConfig::new(format!("http://{}/v1", addr), "Qwen3-8B"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, InitError::Unreachable { .. }));
    }
}

mod complete {
    use super::*;

    #[tokio::test]
    async fn sends_chat_completion_and_returns_content() {
        let (mock, url) = spawn_engine(MockEngine {
            models: vec!["Qwen3-8B".into()],
            reply_content: Some("{\"features\": []}".into()),
            ..MockEngine::default()
        })
        .await;
        let mut config = ModelConfig::new(url, "Qwen3-8B");
        config.api_key = Some("engine-secret".into());

        let engine = connector().connect(&config).await.unwrap();
        let text = engine.complete(request("Extract features")).await.unwrap();
        assert_eq!(text, "{\"features\": []}");

        let body = mock.bodies.lock().unwrap()[0].clone();
        assert_eq!(body["model"], "Qwen3-8B");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Extract features");
        assert_eq!(
            mock.auth_headers.lock().unwrap()[0].as_deref(),
            Some("Bearer engine-secret")
        );
    }

    #[tokio::test]
    async fn server_error_is_transient_status() {
        let (_mock, url) = spawn_engine(MockEngine {
            reply_status: 503,
            ..MockEngine::default()
        })
        .await;

        let engine = connector()
            .connect(&ModelConfig::new(url, "Qwen3-8B"))
            .await
            .unwrap();
        let err = engine.complete(request("hi")).await.unwrap_err();

        assert!(matches!(err, EngineError::Status { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn missing_content_is_empty_response() {
        let (_mock, url) = spawn_engine(MockEngine::default()).await;

        let engine = connector()
            .connect(&ModelConfig::new(url, "Qwen3-8B"))
            .await
            .unwrap();
        let err = engine.complete(request("hi")).await.unwrap_err();

        assert!(matches!(err, EngineError::EmptyResponse));
    }
}
