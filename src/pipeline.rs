//! Full pipeline: PRD → features → test points → test cases.
//!
//! Runs as an explicit state machine so every failure is reported the same
//! way, as the stage it happened in plus its cause. The first failure aborts
//! the run; no partial report is returned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::models::*;
use crate::quality::QualityReport;
use crate::session::Session;
use crate::stage::{StageError, StageExecutor};

/// Full pipeline failures.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("{stage} stage failed: {cause}")]
    StageFailed {
        stage: StageKind,
        #[source]
        cause: StageError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> StageKind {
        match self {
            Self::StageFailed { stage, .. } => *stage,
        }
    }

    pub fn cause(&self) -> &StageError {
        match self {
            Self::StageFailed { cause, .. } => cause,
        }
    }
}

enum PipelineState {
    Start,
    Features,
    TestPoints {
        features: Vec<Feature>,
    },
    TestCases {
        features: Vec<Feature>,
        test_points: Vec<TestPoint>,
    },
    Done(PipelineReport),
    Failed {
        stage: StageKind,
        cause: StageError,
    },
}

impl PipelineState {
    fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Features => "features",
            Self::TestPoints { .. } => "test_points",
            Self::TestCases { .. } => "test_cases",
            Self::Done(_) => "done",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Sequences the three stages for `full-pipeline`.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    executor: Arc<StageExecutor>,
}

impl Orchestrator {
    pub fn new(executor: Arc<StageExecutor>) -> Self {
        Self { executor }
    }

    pub async fn run_full(
        &self,
        session: &Session,
        input: &FullPipelineInput,
    ) -> Result<PipelineReport, PipelineError> {
        let mut timings = Vec::with_capacity(3);
        let mut state = PipelineState::Start;

        loop {
            tracing::debug!("Pipeline on session {} at {}", session.id(), state.name());
            state = match state {
                PipelineState::Start => PipelineState::Features,

                PipelineState::Features => {
                    let stage_input = ExtractFeaturesInput {
                        prd_text: input.prd_text.clone(),
                        additional_requirement: input.additional_requirement.clone(),
                    };
                    let started = Instant::now();
                    match self.executor.extract_features(session, &stage_input).await {
                        Ok(output) => {
                            let mut features = output.records;
                            if let Some(max) = limit(input.max_features) {
                                features.truncate(max);
                            }
                            timings.push(timing(StageKind::Features, features.len(), started));
                            PipelineState::TestPoints { features }
                        }
                        Err(cause) => PipelineState::Failed {
                            stage: StageKind::Features,
                            cause,
                        },
                    }
                }

                PipelineState::TestPoints { features } => {
                    let stage_input = GenerateTestPointsInput {
                        prd_text: input.prd_text.clone(),
                        features,
                        additional_requirement: input.additional_requirement.clone(),
                    };
                    let started = Instant::now();
                    match self
                        .executor
                        .generate_test_points(session, &stage_input)
                        .await
                    {
                        Ok(output) => {
                            let mut test_points = output.records;
                            if let Some(max) = limit(input.max_test_points_per_feature) {
                                test_points = cap_per_feature(test_points, max);
                            }
                            timings.push(timing(
                                StageKind::TestPoints,
                                test_points.len(),
                                started,
                            ));
                            PipelineState::TestCases {
                                features: stage_input.features,
                                test_points,
                            }
                        }
                        Err(cause) => PipelineState::Failed {
                            stage: StageKind::TestPoints,
                            cause,
                        },
                    }
                }

                PipelineState::TestCases {
                    features,
                    test_points,
                } => {
                    let stage_input = GenerateTestCasesInput {
                        prd_text: input.prd_text.clone(),
                        features,
                        test_points,
                        additional_requirement: input.additional_requirement.clone(),
                    };
                    let started = Instant::now();
                    match self
                        .executor
                        .generate_test_cases(session, &stage_input)
                        .await
                    {
                        Ok(output) => {
                            let test_cases = output.records;
                            timings.push(timing(StageKind::TestCases, test_cases.len(), started));

                            let GenerateTestCasesInput {
                                features,
                                test_points,
                                ..
                            } = stage_input;
                            let quality = input.evaluate.then(|| {
                                QualityReport::for_lists(&features, &test_points, &test_cases)
                            });

                            PipelineState::Done(PipelineReport {
                                session_id: session.id(),
                                features,
                                test_points,
                                test_cases,
                                stages: std::mem::take(&mut timings),
                                quality,
                            })
                        }
                        Err(cause) => PipelineState::Failed {
                            stage: StageKind::TestCases,
                            cause,
                        },
                    }
                }

                PipelineState::Done(report) => {
                    tracing::info!(
                        "Pipeline finished: {} features, {} test points, {} test cases",
                        report.features.len(),
                        report.test_points.len(),
                        report.test_cases.len()
                    );
                    return Ok(report);
                }

                PipelineState::Failed { stage, cause } => {
                    tracing::warn!("Pipeline aborted in {} stage: {}", stage, cause);
                    return Err(PipelineError::StageFailed { stage, cause });
                }
            };
        }
    }
}

/// `Some(0)` means unlimited, matching `None`.
fn limit(max: Option<usize>) -> Option<usize> {
    max.filter(|&max| max > 0)
}

/// Keep the first `max` test points of each feature, preserving order.
fn cap_per_feature(test_points: Vec<TestPoint>, max: usize) -> Vec<TestPoint> {
    let mut kept: HashMap<String, usize> = HashMap::new();
    test_points
        .into_iter()
        .filter(|tp| {
            let count = kept.entry(tp.feature_id.clone()).or_default();
            *count += 1;
            *count <= max
        })
        .collect()
}

fn timing(stage: StageKind, records: usize, started: Instant) -> StageTiming {
    StageTiming {
        stage,
        records,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(id: &str, feature_id: &str) -> TestPoint {
        TestPoint {
            id: id.to_string(),
            feature_id: feature_id.to_string(),
            title: format!("Test point {}", id),
            description: "d".to_string(),
            kind: None,
            priority: None,
            precondition: None,
            expected_result: None,
        }
    }

    #[test]
    fn cap_per_feature_keeps_first_n_of_each_feature() {
        let points = vec![tp("1", "A"), tp("2", "B"), tp("3", "A"), tp("4", "A"), tp("5", "B")];
        let kept: Vec<String> = cap_per_feature(points, 2)
            .into_iter()
            .map(|tp| tp.id)
            .collect();
        assert_eq!(kept, vec!["1", "2", "3", "5"]);
    }

    #[test]
    fn zero_limit_means_unlimited() {
        assert_eq!(limit(Some(0)), None);
        assert_eq!(limit(None), None);
        assert_eq!(limit(Some(3)), Some(3));
    }
}
