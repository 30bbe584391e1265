use serde::{Deserialize, Serialize};

use super::feature::Feature;
use super::lenient;
use super::test_point::TestPoint;

/// A concrete, executable test for one test point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCase {
    #[serde(alias = "case_id", deserialize_with = "lenient::id")]
    pub id: String,
    /// Id of the [`TestPoint`] this case verifies.
    #[serde(deserialize_with = "lenient::id")]
    pub test_point_id: String,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub precondition: Option<String>,
    #[serde(alias = "test_steps")]
    pub steps: Vec<TestStep>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub test_data: Option<String>,
    pub expected_result: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub postcondition: Option<String>,
}

/// One numbered action within a test case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestStep {
    #[serde(default, deserialize_with = "lenient::ordinal")]
    pub step: u32,
    pub action: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub expected: Option<String>,
}

/// Ordered output of the TestCases stage.
pub type TestCaseList = Vec<TestCase>;

/// Input for generating test cases from a test point list.
///
/// `features` is optional context; when present it is included in the prompt
/// so the model sees which feature each test point belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateTestCasesInput {
    pub prd_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Feature>,
    pub test_points: Vec<TestPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_requirement: Option<String>,
}

/// Response from the test-cases endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCasesResponse {
    pub test_cases: TestCaseList,
    pub raw_response: String,
}
