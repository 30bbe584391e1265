//! Domain models for the test generation pipeline.
//!
//! # Core Concepts
//!
//! ## Pipeline records
//!
//! Records flow strictly forward, each list referencing the one before it:
//!
//! - [`Feature`]: A capability extracted from a PRD document.
//! - [`TestPoint`]: Something to verify about a feature (`feature_id` points back).
//! - [`TestCase`]: Concrete steps verifying a test point (`test_point_id` points back).
//!
//! ## Session
//!
//! - [`SessionInfo`] / [`SessionStatus`]: The single live handle to the
//!   inference engine, created by `/api/init`.
//!
//! Model output is loose JSON, so record ids are accepted as numbers or
//! strings and a few alternate field names are allowed (`name` for `title`,
//! `case_id` for a test case id, `test_steps` for `steps`).

mod feature;
mod pipeline;
mod session;
mod test_case;
mod test_point;

pub use feature::*;
pub use pipeline::*;
pub use session::*;
pub use test_case::*;
pub use test_point::*;

/// Serde helpers for the loose JSON produced by language models.
pub(crate) mod lenient {
    use serde::{de::Error, Deserialize, Deserializer};
    use serde_json::Value;

    /// Ids arrive as `1` or `"F-1"`; both become strings.
    pub fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s.trim().to_string()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(D::Error::custom(format!(
                "expected a string or number id, found {}",
                other
            ))),
        }
    }

    /// Free-text fields that a model sometimes fills with a number, list or object.
    pub fn opt_text<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        })
    }

    /// Step ordinals: `1`, `"1"`, or missing (0, renumbered later).
    pub fn ordinal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(0),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| D::Error::custom(format!("invalid step number {}", n))),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid step number {:?}", s))),
            Some(other) => Err(D::Error::custom(format!(
                "invalid step number {}",
                other
            ))),
        }
    }
}
