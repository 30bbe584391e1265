use serde::{Deserialize, Serialize};

use super::lenient;

/// A capability extracted from a PRD document.
///
/// Features are the roots of the pipeline: every [`TestPoint`](super::TestPoint)
/// references exactly one feature by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feature {
    #[serde(deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(alias = "name")]
    pub title: String,
    pub description: String,
}

/// Ordered output of the Features stage.
pub type FeatureList = Vec<Feature>;

/// Input for extracting features from a PRD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractFeaturesInput {
    pub prd_text: String,
    /// Free-text instruction appended to the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_requirement: Option<String>,
}

/// Response from the features endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesResponse {
    pub features: FeatureList,
    /// Unparsed model output, kept for inspection.
    pub raw_response: String,
}
