use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::feature::Feature;
use super::test_case::TestCase;
use super::test_point::TestPoint;
use crate::quality::QualityReport;

/// One LLM-backed transformation step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Features,
    TestPoints,
    TestCases,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Features => "features",
            Self::TestPoints => "test_points",
            Self::TestCases => "test_cases",
        }
    }

    /// Key holding the record list in the model's JSON reply.
    pub fn response_key(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for the full PRD → test cases pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FullPipelineInput {
    pub prd_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_requirement: Option<String>,
    /// Keep only the first N features. `0` or absent means no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_features: Option<usize>,
    /// Keep only the first N test points of each feature. `0` or absent means no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_test_points_per_feature: Option<usize>,
    /// Attach quality scores to the report.
    #[serde(default)]
    pub evaluate: bool,
}

/// Result of a successful full pipeline run.
///
/// Every `test_cases[*].test_point_id` exists in `test_points`, and every
/// `test_points[*].feature_id` exists in `features`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub session_id: Uuid,
    pub features: Vec<Feature>,
    pub test_points: Vec<TestPoint>,
    pub test_cases: Vec<TestCase>,
    pub stages: Vec<StageTiming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReport>,
}

/// How long a stage took and how many records it kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageTiming {
    pub stage: StageKind,
    pub records: usize,
    pub elapsed_ms: u64,
}
