//! Heuristic quality scoring for generated features, test points and test cases.
//!
//! Each list gets a score out of 100 split over four criteria. Every
//! criterion starts at its maximum, loses points per issue, and floors at 0.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::{Feature, TestCase, TestPoint};

/// Score for one criterion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriterionScore {
    pub name: String,
    pub score: f64,
    pub max: f64,
    pub issues: Vec<String>,
}

/// Score for one list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    pub total_score: f64,
    pub criteria: Vec<CriterionScore>,
    pub summary: String,
}

/// Lists to evaluate; any may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluateInput {
    #[serde(default)]
    pub features: Option<Vec<Feature>>,
    #[serde(default)]
    pub test_points: Option<Vec<TestPoint>>,
    #[serde(default)]
    pub test_cases: Option<Vec<TestCase>>,
}

/// Evaluations for whichever lists were supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QualityReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Evaluation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_points: Option<Evaluation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_cases: Option<Evaluation>,
}

impl QualityReport {
    pub fn evaluate(input: &EvaluateInput) -> Self {
        Self {
            features: input.features.as_deref().map(evaluate_features),
            test_points: input.test_points.as_deref().map(evaluate_test_points),
            test_cases: input.test_cases.as_deref().map(evaluate_test_cases),
        }
    }

    pub fn for_lists(features: &[Feature], test_points: &[TestPoint], test_cases: &[TestCase]) -> Self {
        Self {
            features: Some(evaluate_features(features)),
            test_points: Some(evaluate_test_points(test_points)),
            test_cases: Some(evaluate_test_cases(test_cases)),
        }
    }
}

struct Criterion {
    name: &'static str,
    max: f64,
    score: f64,
    issues: Vec<String>,
}

impl Criterion {
    fn new(name: &'static str, max: f64) -> Self {
        Self {
            name,
            max,
            score: max,
            issues: Vec::new(),
        }
    }

    fn deduct(&mut self, points: f64) {
        self.score -= points;
    }

    fn issue(&mut self, points: f64, issue: String) {
        self.score -= points;
        self.issues.push(issue);
    }

    fn finish(self) -> CriterionScore {
        CriterionScore {
            name: self.name.to_string(),
            score: self.score.max(0.0),
            max: self.max,
            issues: self.issues,
        }
    }
}

fn finish(criteria: Vec<Criterion>) -> Evaluation {
    let criteria: Vec<CriterionScore> = criteria.into_iter().map(Criterion::finish).collect();
    let total: f64 = criteria.iter().map(|c| c.score).sum();
    Evaluation {
        total_score: (total * 10.0).round() / 10.0,
        criteria,
        summary: summary_for(total).to_string(),
    }
}

fn empty(what: &str) -> Evaluation {
    Evaluation {
        total_score: 0.0,
        criteria: Vec::new(),
        summary: format!("No {} to evaluate", what),
    }
}

fn summary_for(total: f64) -> &'static str {
    match total {
        t if t >= 90.0 => "Excellent quality",
        t if t >= 75.0 => "Good quality",
        t if t >= 60.0 => "Acceptable quality",
        t if t >= 40.0 => "Needs improvement",
        _ => "Poor quality",
    }
}

fn chars(s: &str) -> usize {
    s.chars().count()
}

/// Empty or a placeholder such as "none".
fn is_blank(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None => true,
        Some(v) => v.is_empty() || matches!(v.to_lowercase().as_str(), "none" | "n/a" | "无"),
    }
}

pub fn evaluate_features(features: &[Feature]) -> Evaluation {
    if features.is_empty() {
        return empty("features");
    }
    let n = features.len() as f64;

    let mut completeness = Criterion::new("completeness", 30.0);
    let mut clarity = Criterion::new("clarity", 30.0);
    for (i, f) in features.iter().enumerate() {
        let missing: Vec<&str> = [("id", &f.id), ("title", &f.title), ("description", &f.description)]
            .into_iter()
            .filter(|(_, v)| is_blank(Some(v.as_str())))
            .map(|(name, _)| name)
            .collect();
        if !missing.is_empty() {
            completeness.issue(
                10.0 / n,
                format!("Feature {}: missing {}", i + 1, missing.join(", ")),
            );
        }

        let desc_len = chars(&f.description);
        if desc_len < 20 {
            clarity.issue(
                5.0,
                format!("Feature {}: description too short ({} chars)", i + 1, desc_len),
            );
        } else if desc_len < 50 {
            clarity.deduct(2.0);
        }

        let title_len = chars(&f.title);
        if title_len < 3 {
            clarity.issue(3.0, format!("Feature {}: name too short", i + 1));
        } else if title_len > 50 {
            clarity.issue(2.0, format!("Feature {}: name too long", i + 1));
        }
    }

    let mut quantity = Criterion::new("quantity", 20.0);
    match features.len() {
        0..=1 => quantity.issue(10.0, format!("Too few features ({})", features.len())),
        2 => quantity.deduct(5.0),
        3..=20 => {}
        count => quantity.issue(
            5.0,
            format!("Too many features ({}), may be too granular", count),
        ),
    }

    let mut uniqueness = Criterion::new("uniqueness", 20.0);
    let mut seen = HashSet::new();
    let mut duplicates: Vec<String> = Vec::new();
    for f in features {
        let name = f.title.trim().to_lowercase();
        if !seen.insert(name.clone()) && !duplicates.contains(&name) {
            duplicates.push(name);
        }
    }
    if !duplicates.is_empty() {
        uniqueness.issue(
            10.0 * duplicates.len() as f64,
            format!("Duplicate names: {}", duplicates.join(", ")),
        );
    }

    finish(vec![completeness, clarity, quantity, uniqueness])
}

const EXPECTED_TYPES: [&str; 5] = [
    "functional",
    "performance",
    "security",
    "compatibility",
    "usability",
];

const NEGATIVE_MARKERS: [&str; 4] = ["negative", "error", "fail", "invalid"];

pub fn evaluate_test_points(test_points: &[TestPoint]) -> Evaluation {
    if test_points.is_empty() {
        return empty("test points");
    }
    let n = test_points.len() as f64;

    let mut completeness = Criterion::new("completeness", 25.0);
    let mut detail = Criterion::new("detail", 25.0);
    for (i, tp) in test_points.iter().enumerate() {
        let missing: Vec<&str> = [
            ("id", Some(tp.id.as_str())),
            ("title", Some(tp.title.as_str())),
            ("type", tp.kind.as_deref()),
            ("priority", tp.priority.as_deref()),
            ("description", Some(tp.description.as_str())),
        ]
        .into_iter()
        .filter(|(_, v)| is_blank(*v))
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            completeness.issue(
                5.0 / n,
                format!("Test point {}: missing {}", i + 1, missing.join(", ")),
            );
        }

        if chars(&tp.description) < 20 {
            detail.issue(3.0, format!("Test point {}: description too brief", i + 1));
        }
        if is_blank(tp.precondition.as_deref()) {
            detail.deduct(1.0);
        }
        if is_blank(tp.expected_result.as_deref()) {
            detail.issue(3.0, format!("Test point {}: missing expected result", i + 1));
        }
    }

    let mut coverage = Criterion::new("coverage", 25.0);
    let types: HashSet<String> = test_points
        .iter()
        .map(|tp| tp.kind.as_deref().unwrap_or("").trim().to_lowercase())
        .collect();
    let covered = EXPECTED_TYPES
        .iter()
        .filter(|t| types.contains(**t))
        .count();
    if covered < 2 {
        let mut listed: Vec<&str> = types.iter().map(String::as_str).collect();
        listed.sort_unstable();
        coverage.issue(
            15.0,
            format!("Limited test type coverage: only {}", listed.join(", ")),
        );
    } else if covered < 3 {
        coverage.deduct(5.0);
    }
    let has_negative = test_points.iter().any(|tp| {
        let title = tp.title.to_lowercase();
        NEGATIVE_MARKERS.iter().any(|marker| title.contains(marker))
    });
    if !has_negative {
        coverage.issue(5.0, "No negative/error test scenarios found".to_string());
    }

    let mut priority = Criterion::new("priority", 25.0);
    let high = test_points
        .iter()
        .filter(|tp| {
            let p = tp.priority.as_deref().unwrap_or("").to_lowercase();
            p.contains("high") || p.contains('高')
        })
        .count();
    if high == test_points.len() {
        priority.issue(10.0, "All test points marked as high priority".to_string());
    } else if high == 0 {
        priority.issue(5.0, "No high priority test points".to_string());
    }

    finish(vec![completeness, coverage, priority, detail])
}

pub fn evaluate_test_cases(test_cases: &[TestCase]) -> Evaluation {
    if test_cases.is_empty() {
        return empty("test cases");
    }
    let n = test_cases.len() as f64;

    let mut completeness = Criterion::new("completeness", 25.0);
    let mut steps = Criterion::new("steps", 30.0);
    let mut test_data = Criterion::new("test_data", 20.0);
    let mut clarity = Criterion::new("clarity", 25.0);

    for (i, tc) in test_cases.iter().enumerate() {
        let missing: Vec<&str> = [
            ("id", Some(tc.id.as_str())),
            ("title", Some(tc.title.as_str())),
            ("priority", tc.priority.as_deref()),
            ("precondition", tc.precondition.as_deref()),
            ("expected_result", Some(tc.expected_result.as_str())),
        ]
        .into_iter()
        .filter(|(_, v)| is_blank(*v))
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            completeness.issue(
                5.0 / n,
                format!("Test case {}: missing {}", i + 1, missing.join(", ")),
            );
        }

        match tc.steps.len() {
            0 => steps.issue(10.0, format!("Test case {}: no test steps", i + 1)),
            1 => steps.issue(5.0, format!("Test case {}: too few steps (1)", i + 1)),
            _ => {
                for step in &tc.steps {
                    if step.action.trim().is_empty() {
                        steps.deduct(2.0);
                    }
                    if step.expected.as_deref().map_or(true, |e| e.trim().is_empty()) {
                        steps.deduct(1.0);
                    }
                }
            }
        }

        if is_blank(tc.test_data.as_deref()) {
            test_data.issue(5.0, format!("Test case {}: no test data provided", i + 1));
        }

        if chars(&tc.title) < 10 {
            clarity.issue(3.0, format!("Test case {}: title too short", i + 1));
        }
        if chars(&tc.expected_result) < 10 {
            clarity.issue(3.0, format!("Test case {}: expected result too brief", i + 1));
        }
    }

    let ids: HashSet<&str> = test_cases.iter().map(|tc| tc.id.as_str()).collect();
    if ids.len() != test_cases.len() {
        clarity.issue(5.0, "Duplicate case IDs found".to_string());
    }

    finish(vec![completeness, steps, test_data, clarity])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestStep;

    fn feature(id: &str, title: &str, description: &str) -> Feature {
        Feature {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
        }
    }

    fn test_point(title: &str, kind: &str, priority: &str) -> TestPoint {
        TestPoint {
            id: title.to_string(),
            feature_id: "1".to_string(),
            title: title.to_string(),
            description: "Verifies the behavior in enough detail".to_string(),
            kind: Some(kind.to_string()),
            priority: Some(priority.to_string()),
            precondition: Some("User exists".to_string()),
            expected_result: Some("Works".to_string()),
        }
    }

    #[test]
    fn summary_band_uses_unrounded_total() {
        let mut criterion = Criterion::new("completeness", 90.0);
        criterion.deduct(0.04);
        let eval = finish(vec![criterion]);
        assert_eq!(eval.total_score, 90.0);
        assert_eq!(eval.summary, "Good quality");
    }

    #[test]
    fn empty_lists_score_zero() {
        let eval = evaluate_features(&[]);
        assert_eq!(eval.total_score, 0.0);
        assert_eq!(eval.summary, "No features to evaluate");
        assert!(eval.criteria.is_empty());
    }

    #[test]
    fn well_formed_features_score_excellent() {
        let long = "A description that is comfortably longer than fifty characters in total.";
        let features = vec![
            feature("1", "Login", long),
            feature("2", "Logout", long),
            feature("3", "Password reset", long),
        ];
        let eval = evaluate_features(&features);
        assert_eq!(eval.total_score, 100.0);
        assert_eq!(eval.summary, "Excellent quality");
    }

    #[test]
    fn feature_penalties_accumulate_and_floor_at_zero() {
        let features = vec![feature("1", "Go", "short"), feature("2", "go", "short")];
        let eval = evaluate_features(&features);

        let clarity = &eval.criteria[1];
        // Two short descriptions (-10) and two short names (-6).
        assert_eq!(clarity.score, 14.0);
        assert_eq!(clarity.issues.len(), 4);

        let quantity = &eval.criteria[2];
        assert_eq!(quantity.score, 15.0);

        let uniqueness = &eval.criteria[3];
        assert_eq!(uniqueness.score, 10.0);
        assert_eq!(uniqueness.issues, vec!["Duplicate names: go".to_string()]);

        assert_eq!(eval.total_score, 30.0 + 14.0 + 15.0 + 10.0);
        assert_eq!(eval.summary, "Acceptable quality");
    }

    #[test]
    fn test_point_coverage_rewards_types_and_negative_cases() {
        let points = vec![
            test_point("Valid login succeeds", "functional", "high"),
            test_point("Invalid password is rejected", "security", "medium"),
            test_point("Login under load", "performance", "low"),
        ];
        let eval = evaluate_test_points(&points);
        let coverage = eval.criteria.iter().find(|c| c.name == "coverage").unwrap();
        assert_eq!(coverage.score, 25.0);
        let priority = eval.criteria.iter().find(|c| c.name == "priority").unwrap();
        assert_eq!(priority.score, 25.0);
    }

    #[test]
    fn single_type_all_high_points_are_penalized() {
        let points = vec![
            test_point("Login works", "functional", "high"),
            test_point("Logout works", "functional", "高"),
        ];
        let eval = evaluate_test_points(&points);
        let coverage = eval.criteria.iter().find(|c| c.name == "coverage").unwrap();
        assert_eq!(coverage.score, 5.0);
        let priority = eval.criteria.iter().find(|c| c.name == "priority").unwrap();
        assert_eq!(priority.score, 15.0);
    }

    #[test]
    fn test_cases_without_data_or_enough_steps_lose_points() {
        let case = TestCase {
            id: "TC-1".to_string(),
            test_point_id: "1".to_string(),
            title: "Login".to_string(),
            priority: Some("high".to_string()),
            precondition: Some("n/a".to_string()),
            steps: vec![TestStep {
                step: 1,
                action: "Open page".to_string(),
                expected: None,
            }],
            test_data: Some("None".to_string()),
            expected_result: "Logged in".to_string(),
            postcondition: None,
        };
        let eval = evaluate_test_cases(&[case.clone(), case]);

        let by_name = |name: &str| eval.criteria.iter().find(|c| c.name == name).unwrap();
        // "n/a" precondition counts as missing.
        assert_eq!(by_name("completeness").score, 20.0);
        assert_eq!(by_name("steps").score, 20.0);
        assert_eq!(by_name("test_data").score, 10.0);
        // Short titles (-6), short expected results (-6), duplicate ids (-5).
        assert_eq!(by_name("clarity").score, 8.0);
    }
}
