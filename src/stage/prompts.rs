//! Prompt templates for each stage.
//!
//! Templates use `{name}` placeholders. Substitution is a single pass, so
//! braces inside the PRD text or inside JSON examples are left alone.

use std::path::Path;

use anyhow::Context;

use crate::models::StageKind;

const FEATURES_SYSTEM: &str = r#"You are a senior QA analyst. You read product requirement documents (PRDs) and break them down into distinct, testable features.

Rules:
1. Each feature is one user-visible capability. Do not merge unrelated capabilities.
2. Give every feature a short name and a description of its expected behavior.
3. Number features starting from 1.
4. Reply with JSON only, in exactly this shape:

```json
{"features": [{"id": 1, "name": "Feature name", "description": "What the feature does and how it should behave"}]}
```"#;

const FEATURES_USER: &str = r#"Extract the features from the following PRD.

PRD:
{prd_text}"#;

const TEST_POINTS_SYSTEM: &str = r#"You are a senior QA engineer. Given a PRD and the features extracted from it, you design test points: the aspects of each feature that must be verified.

Rules:
1. Cover every feature. Include positive, negative, and boundary scenarios.
2. "type" is one of: functional, performance, security, compatibility, usability.
3. "priority" is one of: high, medium, low.
4. "feature_id" must be the id of the feature the test point covers, copied exactly from the feature list.
5. Test point ids are unique across the whole reply.
6. Reply with JSON only, in exactly this shape:

```json
{"test_points": [{"id": 1, "feature_id": 1, "name": "Test point name", "description": "What is verified", "type": "functional", "priority": "high", "precondition": "State before testing", "expected_result": "Observable outcome"}]}
```"#;

const TEST_POINTS_USER: &str = r#"PRD:
{prd_text}

Features:
{features_json}

Generate test points for every feature above."#;

const TEST_CASES_SYSTEM: &str = r#"You are a senior QA engineer. Given test points, you write concrete, executable test cases.

Rules:
1. Write at least one test case per test point.
2. "test_point_id" must be the id of the test point the case verifies, copied exactly from the test point list.
3. Every test case has numbered steps; each step has an action and its expected outcome.
4. Provide concrete test data where it applies.
5. Test case ids are unique across the whole reply, e.g. "TC-001".
6. Reply with JSON only, in exactly this shape:

```json
{"test_cases": [{"case_id": "TC-001", "test_point_id": 1, "title": "Test case title", "priority": "high", "precondition": "State before testing", "test_steps": [{"step": 1, "action": "What to do", "expected": "What should happen"}], "test_data": "Inputs used", "expected_result": "Overall expected outcome", "postcondition": "State after testing"}]}
```"#;

const TEST_CASES_USER: &str = r#"PRD:
{prd_text}

Features:
{features_json}

Test points:
{test_points_json}

Generate test cases for every test point above."#;

/// System and user template for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub system: String,
    pub user: String,
}

impl PromptTemplate {
    fn builtin(system: &str, user: &str) -> Self {
        Self {
            system: system.to_string(),
            user: user.to_string(),
        }
    }
}

/// Templates for all three stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub features: PromptTemplate,
    pub test_points: PromptTemplate,
    pub test_cases: PromptTemplate,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            features: PromptTemplate::builtin(FEATURES_SYSTEM, FEATURES_USER),
            test_points: PromptTemplate::builtin(TEST_POINTS_SYSTEM, TEST_POINTS_USER),
            test_cases: PromptTemplate::builtin(TEST_CASES_SYSTEM, TEST_CASES_USER),
        }
    }
}

impl PromptSet {
    /// Built-in templates, overridden by any of
    /// `generate_{features,test_points,test_cases}_{system,user}_prompt`
    /// found in `dir`.
    pub fn load_dir(dir: &Path) -> anyhow::Result<Self> {
        anyhow::ensure!(
            dir.is_dir(),
            "prompt directory {} does not exist",
            dir.display()
        );

        let mut prompts = Self::default();
        for kind in [StageKind::Features, StageKind::TestPoints, StageKind::TestCases] {
            let template = prompts.for_stage_mut(kind);
            for (part, slot) in [("system", &mut template.system), ("user", &mut template.user)] {
                let path = dir.join(format!("generate_{}_{}_prompt", kind.as_str(), part));
                if path.is_file() {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    tracing::debug!("Loaded prompt override {}", path.display());
                    *slot = text.trim().to_string();
                }
            }
        }
        Ok(prompts)
    }

    pub fn for_stage(&self, kind: StageKind) -> &PromptTemplate {
        match kind {
            StageKind::Features => &self.features,
            StageKind::TestPoints => &self.test_points,
            StageKind::TestCases => &self.test_cases,
        }
    }

    fn for_stage_mut(&mut self, kind: StageKind) -> &mut PromptTemplate {
        match kind {
            StageKind::Features => &mut self.features,
            StageKind::TestPoints => &mut self.test_points,
            StageKind::TestCases => &mut self.test_cases,
        }
    }
}

/// Substitute `{name}` placeholders in a single pass.
///
/// Unknown placeholders and stray braces are copied through unchanged.
pub fn render(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substitution = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (value, close))
        });
        match substitution {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_known_placeholders() {
        let out = render(
            "PRD:\n{prd_text}\n\n{features_json}",
            &[
                ("prd_text", "login page".to_string()),
                ("features_json", "[]".to_string()),
            ],
        );
        assert_eq!(out, "PRD:\nlogin page\n\n[]");
    }

    #[test]
    fn render_leaves_json_examples_and_unknown_names_alone() {
        let template = r#"{"features": [{"id": 1}]} {unknown} {prd_text}"#;
        let out = render(template, &[("prd_text", "x".to_string())]);
        assert_eq!(out, r#"{"features": [{"id": 1}]} {unknown} x"#);
    }

    #[test]
    fn render_does_not_expand_placeholders_inside_values() {
        let out = render(
            "{prd_text}|{features_json}",
            &[
                ("prd_text", "{features_json}".to_string()),
                ("features_json", "F".to_string()),
            ],
        );
        assert_eq!(out, "{features_json}|F");
    }

    #[test]
    fn builtin_templates_reference_their_inputs() {
        let prompts = PromptSet::default();
        assert!(prompts.features.user.contains("{prd_text}"));
        assert!(prompts.test_points.user.contains("{features_json}"));
        assert!(prompts.test_cases.user.contains("{test_points_json}"));
    }

    #[test]
    fn load_dir_overrides_only_present_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("generate_features_user_prompt"),
            "  Custom: {prd_text}\n",
        )
        .unwrap();

        let prompts = PromptSet::load_dir(dir.path()).unwrap();
        assert_eq!(prompts.features.user, "Custom: {prd_text}");
        assert_eq!(prompts.features.system, FEATURES_SYSTEM);
        assert_eq!(prompts.test_cases, PromptSet::default().test_cases);
    }

    #[test]
    fn load_dir_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(PromptSet::load_dir(&missing).is_err());
    }
}
