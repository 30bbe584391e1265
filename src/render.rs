//! Plain-text rendering of pipeline results for the CLI.

use crate::models::{PipelineReport, TestCase, TestPoint};
use crate::quality::Evaluation;

const FEATURE: char = '■';
const TEST_POINT: char = '○';
const TEST_CASE: char = '•';

/// Render a pipeline report as an ASCII tree.
///
/// Example output:
/// ```text
/// ■ [1] Login
/// ├── ○ [1] Valid credentials accepted (functional, high)
/// │   ├── • [TC-001] Login with a registered account
/// │   └── • [TC-002] Login with trailing whitespace
/// └── ○ [2] Wrong password rejected (security, high)
///     └── • [TC-003] Login with a wrong password
/// ```
pub fn render_tree(report: &PipelineReport) -> String {
    let mut output = String::new();

    for feature in &report.features {
        output.push(FEATURE);
        output.push_str(&format!(" [{}] {}\n", feature.id, feature.title));

        let points: Vec<&TestPoint> = report
            .test_points
            .iter()
            .filter(|tp| tp.feature_id == feature.id)
            .collect();
        for (i, point) in points.iter().enumerate() {
            let is_last = i == points.len() - 1;
            let cases: Vec<&TestCase> = report
                .test_cases
                .iter()
                .filter(|tc| tc.test_point_id == point.id)
                .collect();
            render_test_point(&mut output, point, &cases, is_last);
        }
    }
    output
}

fn render_test_point(output: &mut String, point: &TestPoint, cases: &[&TestCase], is_last: bool) {
    let branch = if is_last { "└── " } else { "├── " };
    output.push_str(branch);
    output.push(TEST_POINT);
    output.push_str(&format!(" [{}] {}", point.id, point.title));

    let tags: Vec<&str> = [point.kind.as_deref(), point.priority.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    if !tags.is_empty() {
        output.push_str(&format!(" ({})", tags.join(", ")));
    }
    output.push('\n');

    let child_prefix = if is_last { "    " } else { "│   " };
    for (i, case) in cases.iter().enumerate() {
        let branch = if i == cases.len() - 1 { "└── " } else { "├── " };
        output.push_str(child_prefix);
        output.push_str(branch);
        output.push(TEST_CASE);
        output.push_str(&format!(" [{}] {}\n", case.id, case.title));
    }
}

/// Render one evaluation as a Markdown section with a criteria table.
pub fn render_evaluation(title: &str, evaluation: &Evaluation) -> String {
    let mut output = format!(
        "## {}\n\n**Score:** {:.1}/100 ({})\n",
        title, evaluation.total_score, evaluation.summary
    );
    if evaluation.criteria.is_empty() {
        return output;
    }

    output.push_str("\n| Criterion | Score | Issues |\n|---|---|---|\n");
    for criterion in &evaluation.criteria {
        let issues = if criterion.issues.is_empty() {
            "-".to_string()
        } else {
            criterion.issues.join("; ").replace('|', "\\|")
        };
        output.push_str(&format!(
            "| {} | {:.1}/{:.0} | {} |\n",
            criterion.name, criterion.score, criterion.max, issues
        ));
    }
    output
}
