//! Turning raw model output into validated records.
//!
//! Models wrap JSON in prose, code fences, `<think>` blocks, comments and
//! trailing commas. [`extract_json`] tries progressively looser strategies;
//! [`parse_records`] then demands a complete, well-formed list.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::models::{Feature, StageKind, TestCase, TestPoint};

static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```json\s*([\s\S]*?)\s*```").expect("valid regex"));
static ANY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[a-zA-Z]*\s*([\s\S]*?)\s*```").expect("valid regex"));
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)//.*$").expect("valid regex"));
static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("valid regex"));

/// A record produced by a stage.
pub trait Record: DeserializeOwned {
    fn id(&self) -> &str;

    /// Id of the record in the preceding list this one references.
    fn parent_id(&self) -> Option<&str> {
        None
    }

    /// Normalize in place and reject records missing required content.
    fn check(&mut self) -> Result<(), String>;
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("missing {}", field))
    } else {
        Ok(())
    }
}

impl Record for Feature {
    fn id(&self) -> &str {
        &self.id
    }

    fn check(&mut self) -> Result<(), String> {
        require("id", &self.id)?;
        require("title", &self.title)?;
        require("description", &self.description)
    }
}

impl Record for TestPoint {
    fn id(&self) -> &str {
        &self.id
    }

    fn parent_id(&self) -> Option<&str> {
        Some(&self.feature_id)
    }

    fn check(&mut self) -> Result<(), String> {
        require("id", &self.id)?;
        require("feature_id", &self.feature_id)?;
        require("title", &self.title)?;
        require("description", &self.description)
    }
}

impl Record for TestCase {
    fn id(&self) -> &str {
        &self.id
    }

    fn parent_id(&self) -> Option<&str> {
        Some(&self.test_point_id)
    }

    fn check(&mut self) -> Result<(), String> {
        require("id", &self.id)?;
        require("test_point_id", &self.test_point_id)?;
        require("title", &self.title)?;
        require("expected_result", &self.expected_result)?;
        if self.steps.is_empty() {
            return Err("no test steps".to_string());
        }
        for (index, step) in self.steps.iter_mut().enumerate() {
            require(&format!("action in step {}", index + 1), &step.action)?;
            if step.step == 0 {
                step.step = index as u32 + 1;
            }
        }
        Ok(())
    }
}

/// Drop reasoning emitted before the answer (`<think>…</think>`).
///
/// Some chat templates omit the opening tag, so everything up to the last
/// closing tag is discarded.
pub fn strip_think(text: &str) -> &str {
    const CLOSE: &str = "</think>";
    match text.rfind(CLOSE) {
        Some(pos) => &text[pos + CLOSE.len()..],
        None => text,
    }
}

/// Find a JSON value in free-form model output.
pub fn extract_json(text: &str) -> Result<Value, String> {
    let text = strip_think(text);
    if text.trim().is_empty() {
        return Err("response is empty".to_string());
    }

    for caps in JSON_FENCE.captures_iter(text) {
        if let Ok(value) = serde_json::from_str(caps[1].trim()) {
            return Ok(value);
        }
    }

    for caps in ANY_FENCE.captures_iter(text) {
        let body = caps[1].trim();
        if body.starts_with('{') || body.starts_with('[') {
            if let Ok(value) = serde_json::from_str(body) {
                return Ok(value);
            }
        }
    }

    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Ok(value);
    }

    // Whichever bracket opens first is the payload; a bare array must not be
    // read as its first element.
    let brackets = match (text.find('{'), text.find('[')) {
        (Some(brace), Some(bracket)) if bracket < brace => [('[', ']'), ('{', '}')],
        _ => [('{', '}'), ('[', ']')],
    };
    for (open, close) in brackets {
        if let Some(value) = outer_span(text, open, close).and_then(|span| parse_span(span, close))
        {
            return Ok(value);
        }
    }

    let preview: String = text.chars().take(200).collect();
    Err(format!("no valid JSON found (response starts with {:?})", preview))
}

fn parse_span(span: &str, close: char) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(span) {
        return Some(value);
    }

    let cleaned = LINE_COMMENT.replace_all(span, "");
    let cleaned = BLOCK_COMMENT.replace_all(&cleaned, "");
    let cleaned = TRAILING_COMMA.replace_all(&cleaned, "$1");
    if let Ok(value) = serde_json::from_str(&cleaned) {
        return Some(value);
    }

    // Trailing junk after the value: retry on shorter line prefixes.
    let lines: Vec<&str> = cleaned.lines().collect();
    (1..lines.len()).rev().find_map(|end| {
        let prefix = lines[..end].join("\n");
        if prefix.trim_end().ends_with(close) {
            serde_json::from_str(&prefix).ok()
        } else {
            None
        }
    })
}

fn outer_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a stage reply into a complete list of valid records.
///
/// Fails on the first malformed record, an empty list, a duplicate id, or a
/// reference to an id not in `parents`.
pub fn parse_records<R: Record>(
    kind: StageKind,
    raw: &str,
    parents: Option<&HashSet<String>>,
) -> Result<Vec<R>, String> {
    let key = kind.response_key();
    let list = match extract_json(raw)? {
        Value::Object(mut map) => map
            .remove(key)
            .ok_or_else(|| format!("missing '{}' field", key))?,
        array @ Value::Array(_) => array,
        other => return Err(format!("expected a JSON object, found {}", other)),
    };

    let Value::Array(items) = list else {
        return Err(format!("'{}' is not a list", key));
    };
    if items.is_empty() {
        return Err(format!("model returned no {}", key));
    }

    let mut seen = HashSet::with_capacity(items.len());
    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let position = index + 1;
        let mut record: R = serde_json::from_value(item)
            .map_err(|e| format!("record {} is malformed: {}", position, e))?;
        record
            .check()
            .map_err(|e| format!("record {} is malformed: {}", position, e))?;

        if !seen.insert(record.id().to_string()) {
            return Err(format!("duplicate id '{}' at record {}", record.id(), position));
        }
        if let (Some(parents), Some(parent)) = (parents, record.parent_id()) {
            if !parents.contains(parent) {
                return Err(format!(
                    "record {} references unknown id '{}'",
                    position, parent
                ));
            }
        }
        records.push(record);
    }
    Ok(records)
}
