#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use prd_testgen::engine::{ChatEngine, ChatRequest, EngineConnector, EngineError, GenerationParams};
use prd_testgen::models::ModelConfig;
use prd_testgen::session::{InitError, Session, SessionManager};
use prd_testgen::stage::{PromptSet, StageExecutor};

pub const PRD: &str = "Users sign in with email and password. Users can reset a forgotten password by email.";

pub const FEATURES_REPLY: &str = r#"<think>The PRD mentions login and password reset.</think>
```json
{"features": [
  {"id": 1, "name": "Login", "description": "Users sign in with email and password"},
  {"id": 2, "name": "Password reset", "description": "Users reset a forgotten password via an emailed link"}
]}
```"#;

pub const TEST_POINTS_REPLY: &str = r#"{"test_points": [
  {"id": 1, "feature_id": 1, "name": "Valid credentials accepted", "description": "Registered user signs in", "type": "functional", "priority": "high"},
  {"id": 2, "feature_id": 1, "name": "Invalid password rejected", "description": "Wrong password shows an error", "type": "security", "priority": "high"},
  {"id": 3, "feature_id": 2, "name": "Reset email sent", "description": "Reset link arrives by email", "type": "functional", "priority": "medium"}
]}"#;

pub const TEST_CASES_REPLY: &str = r#"{"test_cases": [
  {"case_id": "TC-001", "test_point_id": 1, "title": "Sign in with a registered account", "priority": "high", "test_steps": [{"step": 1, "action": "Open the login page", "expected": "Form is shown"}, {"step": 2, "action": "Submit valid credentials", "expected": "Dashboard opens"}], "expected_result": "User is signed in"},
  {"case_id": "TC-002", "test_point_id": 2, "title": "Sign in with a wrong password", "test_steps": [{"step": 1, "action": "Submit a wrong password"}], "expected_result": "Error message is shown"},
  {"case_id": "TC-003", "test_point_id": 3, "title": "Request a reset link", "test_steps": [{"action": "Request a reset for a known email"}], "expected_result": "Reset email is delivered"}
]}"#;

/// Engine double that replays queued replies in order.
pub struct ScriptedEngine {
    model_id: String,
    replies: Mutex<VecDeque<Result<String, EngineError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedEngine {
    pub fn new<I>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Result<String, EngineError>>,
    {
        Arc::new(Self {
            model_id: "Qwen3-8B".to_string(),
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Engine that answers each reply text once, in order.
    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(r.to_string())))
    }

    /// Engine that answers every pipeline stage once.
    pub fn full_pipeline() -> Arc<Self> {
        Self::replying(&[FEATURES_REPLY, TEST_POINTS_REPLY, TEST_CASES_REPLY])
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatEngine for ScriptedEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, EngineError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(EngineError::EmptyResponse))
    }
}

/// Connector double that hands out one shared [`ScriptedEngine`].
pub struct ScriptedConnector {
    engine: Arc<ScriptedEngine>,
    connects: AtomicUsize,
    delay: Duration,
    failures: Mutex<VecDeque<InitError>>,
}

impl ScriptedConnector {
    pub fn new(engine: Arc<ScriptedEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            connects: AtomicUsize::new(0),
            delay: Duration::ZERO,
            failures: Mutex::new(VecDeque::new()),
        })
    }

    /// Connector whose `connect` takes `delay` before succeeding.
    pub fn slow(engine: Arc<ScriptedEngine>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            engine,
            connects: AtomicUsize::new(0),
            delay,
            failures: Mutex::new(VecDeque::new()),
        })
    }

    /// Connector whose first `connect` fails with `failure`; later ones succeed.
    pub fn failing(failure: InitError) -> Arc<Self> {
        Arc::new(Self {
            engine: ScriptedEngine::replying(&[]),
            connects: AtomicUsize::new(0),
            delay: Duration::ZERO,
            failures: Mutex::new(VecDeque::from([failure])),
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineConnector for ScriptedConnector {
    async fn connect(&self, _config: &ModelConfig) -> Result<Arc<dyn ChatEngine>, InitError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(failure) = self.failures.lock().unwrap().pop_front() {
            return Err(failure);
        }
        let engine: Arc<dyn ChatEngine> = self.engine.clone();
        Ok(engine)
    }
}

pub fn executor() -> StageExecutor {
    StageExecutor::new(PromptSet::default(), GenerationParams::default())
        .with_retry_backoff(Duration::from_millis(1))
}

pub fn model_config() -> ModelConfig {
    ModelConfig::new("http://localhost:12349/v1", "Qwen3-8B")
}

/// A manager with a ready session backed by `engine`.
pub async fn ready_session(engine: Arc<ScriptedEngine>) -> (SessionManager, Session) {
    let manager = SessionManager::new(ScriptedConnector::new(engine));
    let session = manager
        .init(model_config())
        .await
        .expect("init should succeed")
        .session;
    (manager, session)
}
