mod common;

use std::sync::Arc;

use common::*;
use prd_testgen::api::{create_router_with_security, AppState, SecurityConfig};
use prd_testgen::client::{ClientError, TestGenClient};
use prd_testgen::models::*;
use prd_testgen::quality::EvaluateInput;
use prd_testgen::session::SessionManager;

async fn spawn_service(engine: Arc<ScriptedEngine>, security: SecurityConfig) -> String {
    let state = AppState::new(
        SessionManager::new(ScriptedConnector::new(engine)),
        executor(),
    );
    let app = create_router_with_security(state, security);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/api", addr)
}

#[tokio::test]
async fn health_and_status_round_trip() {
    let url = spawn_service(ScriptedEngine::replying(&[]), SecurityConfig::disabled()).await;
    let client = TestGenClient::new(url, None);

    client.health().await.unwrap();
    let status = client.status().await.unwrap();
    assert_eq!(status.status, SessionState::Uninitialized);
}

#[tokio::test]
async fn runs_full_pipeline_after_init() {
    let url = spawn_service(ScriptedEngine::full_pipeline(), SecurityConfig::disabled()).await;
    let client = TestGenClient::new(format!("{}/", url), None);

    let init = client.init(None, Some("Qwen3-8B")).await.unwrap();
    assert_eq!(init.session.model_id, "Qwen3-8B");

    let report = client
        .run_full_pipeline(&FullPipelineInput {
            prd_text: PRD.to_string(),
            ..FullPipelineInput::default()
        })
        .await
        .unwrap();
    assert_eq!(report.session_id, init.session.id);
    assert_eq!(report.test_cases.len(), 3);
}

#[tokio::test]
async fn stage_before_init_is_conflict() {
    let url = spawn_service(ScriptedEngine::replying(&[]), SecurityConfig::disabled()).await;
    let client = TestGenClient::new(url, None);

    let err = client
        .extract_features(&ExtractFeaturesInput {
            prd_text: PRD.to_string(),
            additional_requirement: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Conflict(_)), "got {:?}", err);
}

#[tokio::test]
async fn parse_failure_carries_stage_and_raw_response() {
    let url = spawn_service(
        ScriptedEngine::replying(&["nothing useful"]),
        SecurityConfig::disabled(),
    )
    .await;
    let client = TestGenClient::new(url, None);
    client.init(None, None).await.unwrap();

    let err = client
        .extract_features(&ExtractFeaturesInput {
            prd_text: PRD.to_string(),
            additional_requirement: None,
        })
        .await
        .unwrap_err();

    match err {
        ClientError::BadGateway {
            stage,
            raw_response,
            ..
        } => {
            assert_eq!(stage, Some(StageKind::Features));
            assert_eq!(raw_response.as_deref(), Some("nothing useful"));
        }
        other => panic!("expected BadGateway, got {:?}", other),
    }
}

#[tokio::test]
async fn api_key_is_sent_as_bearer_token() {
    let url = spawn_service(
        ScriptedEngine::replying(&[]),
        SecurityConfig::with_api_key("secret"),
    )
    .await;

    let anonymous = TestGenClient::new(url.clone(), None);
    assert!(matches!(
        anonymous.status().await,
        Err(ClientError::Unauthorized)
    ));

    let authorized = TestGenClient::new(url, Some("secret".into()));
    authorized.status().await.unwrap();
}

#[tokio::test]
async fn evaluate_scores_lists() {
    let url = spawn_service(ScriptedEngine::replying(&[]), SecurityConfig::disabled()).await;
    let client = TestGenClient::new(url, None);

    let report = client
        .evaluate(&EvaluateInput {
            features: Some(vec![Feature {
                id: "1".into(),
                title: "Login".into(),
                description: "Users sign in with their email address and password".into(),
            }]),
            ..EvaluateInput::default()
        })
        .await
        .unwrap();
    assert!(report.features.is_some());
    assert!(report.test_cases.is_none());
}
