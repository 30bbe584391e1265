//! Stage execution: one templated prompt, one engine round trip, one typed list.

mod parse;
mod prompts;

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;

use crate::engine::{ChatRequest, EngineError, GenerationParams};
use crate::models::*;
use crate::session::Session;

pub use parse::{extract_json, parse_records, strip_think, Record};
pub use prompts::{render, PromptSet, PromptTemplate};

/// Stage failures.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    #[error("model session is not ready; call /api/init first")]
    SessionNotReady,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("could not parse {stage} from model response: {reason}")]
    ParseFailure {
        stage: StageKind,
        reason: String,
        raw_response: String,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Records produced by a stage plus the reply they were parsed from.
#[derive(Debug, Clone)]
pub struct StageOutput<T> {
    pub records: Vec<T>,
    pub raw_response: String,
}

/// Static description of one stage: its input, its record type, and how the
/// input fills the prompt.
pub trait Stage {
    const KIND: StageKind;
    type Input: Sync;
    type Record: Record + Send;

    fn prd_text(input: &Self::Input) -> &str;

    fn additional_requirement(input: &Self::Input) -> Option<&str>;

    /// Checks beyond a non-empty PRD.
    fn validate(_input: &Self::Input) -> Result<(), StageError> {
        Ok(())
    }

    /// Placeholder values other than `prd_text`.
    fn prompt_vars(input: &Self::Input) -> Vec<(&'static str, String)>;

    /// Ids the produced records must reference, if any.
    fn parent_ids(_input: &Self::Input) -> Option<HashSet<String>> {
        None
    }
}

/// PRD → FeatureList.
pub struct Features;

/// FeatureList → TestPointList.
pub struct TestPoints;

/// TestPointList → TestCaseList.
pub struct TestCases;

impl Stage for Features {
    const KIND: StageKind = StageKind::Features;
    type Input = ExtractFeaturesInput;
    type Record = Feature;

    fn prd_text(input: &Self::Input) -> &str {
        &input.prd_text
    }

    fn additional_requirement(input: &Self::Input) -> Option<&str> {
        input.additional_requirement.as_deref()
    }

    fn prompt_vars(_input: &Self::Input) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

impl Stage for TestPoints {
    const KIND: StageKind = StageKind::TestPoints;
    type Input = GenerateTestPointsInput;
    type Record = TestPoint;

    fn prd_text(input: &Self::Input) -> &str {
        &input.prd_text
    }

    fn additional_requirement(input: &Self::Input) -> Option<&str> {
        input.additional_requirement.as_deref()
    }

    fn validate(input: &Self::Input) -> Result<(), StageError> {
        if input.features.is_empty() {
            return Err(StageError::InvalidInput(
                "at least one feature is required".into(),
            ));
        }
        Ok(())
    }

    fn prompt_vars(input: &Self::Input) -> Vec<(&'static str, String)> {
        vec![("features_json", to_prompt_json(&input.features))]
    }

    fn parent_ids(input: &Self::Input) -> Option<HashSet<String>> {
        Some(input.features.iter().map(|f| f.id.clone()).collect())
    }
}

impl Stage for TestCases {
    const KIND: StageKind = StageKind::TestCases;
    type Input = GenerateTestCasesInput;
    type Record = TestCase;

    fn prd_text(input: &Self::Input) -> &str {
        &input.prd_text
    }

    fn additional_requirement(input: &Self::Input) -> Option<&str> {
        input.additional_requirement.as_deref()
    }

    fn validate(input: &Self::Input) -> Result<(), StageError> {
        if input.test_points.is_empty() {
            return Err(StageError::InvalidInput(
                "at least one test point is required".into(),
            ));
        }
        Ok(())
    }

    fn prompt_vars(input: &Self::Input) -> Vec<(&'static str, String)> {
        vec![
            ("features_json", to_prompt_json(&input.features)),
            ("test_points_json", to_prompt_json(&input.test_points)),
        ]
    }

    fn parent_ids(input: &Self::Input) -> Option<HashSet<String>> {
        Some(input.test_points.iter().map(|tp| tp.id.clone()).collect())
    }
}

fn to_prompt_json<T: serde::Serialize>(records: &[T]) -> String {
    // Plain data structs always serialize.
    serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".to_string())
}

/// Runs stages against a session.
#[derive(Debug, Clone)]
pub struct StageExecutor {
    prompts: PromptSet,
    params: GenerationParams,
    engine_retries: u32,
    retry_backoff: Duration,
}

impl StageExecutor {
    pub fn new(prompts: PromptSet, params: GenerationParams) -> Self {
        Self {
            prompts,
            params,
            engine_retries: 1,
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Extra attempts after a transient engine error.
    pub fn with_engine_retries(mut self, retries: u32) -> Self {
        self.engine_retries = retries;
        self
    }

    /// Base delay between retries; grows linearly with the attempt number.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    /// Build the chat request for a stage without sending it.
    pub fn build_request<S: Stage>(&self, input: &S::Input) -> ChatRequest {
        let template = self.prompts.for_stage(S::KIND);

        let mut vars = S::prompt_vars(input);
        vars.push(("prd_text", S::prd_text(input).to_string()));

        let mut user = render(&template.user, &vars);
        if let Some(extra) = S::additional_requirement(input)
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            user.push_str("\n\nAdditional requirement: ");
            user.push_str(extra);
        }

        ChatRequest {
            system: Some(template.system.clone()),
            user,
            params: self.params,
        }
    }

    /// Run one stage: check readiness, prompt the engine, parse the reply.
    pub async fn run<S: Stage>(
        &self,
        session: &Session,
        input: &S::Input,
    ) -> Result<StageOutput<S::Record>, StageError> {
        if !session.is_ready() {
            return Err(StageError::SessionNotReady);
        }
        if S::prd_text(input).trim().is_empty() {
            return Err(StageError::InvalidInput("prd_text must not be empty".into()));
        }
        S::validate(input)?;

        let request = self.build_request::<S>(input);
        tracing::info!("Running {} stage on session {}", S::KIND, session.id());
        let raw_response = self.complete_with_retry(session, S::KIND, request).await?;

        let parents = S::parent_ids(input);
        let records = parse_records::<S::Record>(S::KIND, &raw_response, parents.as_ref())
            .map_err(|reason| {
                tracing::warn!("{} stage produced unusable output: {}", S::KIND, reason);
                StageError::ParseFailure {
                    stage: S::KIND,
                    reason,
                    raw_response: raw_response.clone(),
                }
            })?;

        tracing::info!("{} stage produced {} records", S::KIND, records.len());
        Ok(StageOutput {
            records,
            raw_response,
        })
    }

    pub async fn extract_features(
        &self,
        session: &Session,
        input: &ExtractFeaturesInput,
    ) -> Result<StageOutput<Feature>, StageError> {
        self.run::<Features>(session, input).await
    }

    pub async fn generate_test_points(
        &self,
        session: &Session,
        input: &GenerateTestPointsInput,
    ) -> Result<StageOutput<TestPoint>, StageError> {
        self.run::<TestPoints>(session, input).await
    }

    pub async fn generate_test_cases(
        &self,
        session: &Session,
        input: &GenerateTestCasesInput,
    ) -> Result<StageOutput<TestCase>, StageError> {
        self.run::<TestCases>(session, input).await
    }

    async fn complete_with_retry(
        &self,
        session: &Session,
        kind: StageKind,
        request: ChatRequest,
    ) -> Result<String, StageError> {
        let mut attempt = 0u32;
        loop {
            match session.engine().complete(request.clone()).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_transient() && attempt < self.engine_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "{} stage engine call failed ({}); retry {}/{}",
                        kind,
                        err,
                        attempt,
                        self.engine_retries
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    if !session.is_ready() {
                        return Err(StageError::SessionNotReady);
                    }
                }
                Err(err) => {
                    tracing::error!("{} stage engine call failed: {}", kind, err);
                    return Err(err.into());
                }
            }
        }
    }
}
