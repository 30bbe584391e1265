use serde::{Deserialize, Serialize};

use super::feature::Feature;
use super::lenient;

/// A verifiable aspect of one feature.
///
/// `kind` is serialized as `type` (functional, performance, security, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestPoint {
    #[serde(deserialize_with = "lenient::id")]
    pub id: String,
    /// Id of the [`Feature`] this test point covers.
    #[serde(deserialize_with = "lenient::id")]
    pub feature_id: String,
    #[serde(alias = "name")]
    pub title: String,
    pub description: String,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
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
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub expected_result: Option<String>,
}

/// Ordered output of the TestPoints stage.
pub type TestPointList = Vec<TestPoint>;

/// Input for generating test points from a feature list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateTestPointsInput {
    pub prd_text: String,
    pub features: Vec<Feature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_requirement: Option<String>,
}

/// Response from the test-points endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPointsResponse {
    pub test_points: TestPointList,
    pub raw_response: String,
}
