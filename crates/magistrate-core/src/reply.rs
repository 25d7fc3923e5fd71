//! The structured reply wire format.
//!
//! A conforming backend answers every check with a single JSON object:
//!
//! ```json
//! { "verdict": true, "reason": "mentions dogs throughout", "confidence": 0.93 }
//! ```
//!
//! - `verdict` (boolean, required): whether the subject satisfies the
//!   instruction.
//! - `reason` (string, optional): short explanation, expected when
//!   `verdict` is false.
//! - `confidence` (number, optional): the backend's own confidence,
//!   in [0.0, 1.0].
//!
//! Field names match case-insensitively (`Verdict`, `REASON`) and a reply
//! wrapped in a single Markdown code fence is unwrapped first; both are
//! common backend drift. Nothing else is repaired. A reply that does not
//! decode to this shape is a contract violation by the backend and
//! surfaces as [`ReplyError`], never as a best-effort pass or fail.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Errors from decoding a backend reply.
#[derive(Error, Debug)]
pub enum ReplyError {
    #[error("Reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Reply is not a JSON object")]
    NotAnObject,

    #[error("Reply is missing the boolean 'verdict' field")]
    MissingVerdict,

    #[error("Reply field '{field}' has the wrong type (expected {expected})")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Reply confidence {0} is outside [0.0, 1.0]")]
    ConfidenceOutOfRange(f64),
}

/// A backend's decoded answer to one check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    /// Whether the subject satisfies the instruction.
    pub verdict: bool,

    /// Short explanation; expected when `verdict` is false.
    pub reason: Option<String>,

    /// Backend-stated confidence in [0.0, 1.0].
    pub confidence: Option<f32>,
}

impl Reply {
    /// Decode a raw backend reply.
    pub fn parse(raw: &str) -> Result<Self, ReplyError> {
        let body = strip_fence(raw.trim());
        let value: JsonValue = serde_json::from_str(body)?;
        let object = value.as_object().ok_or(ReplyError::NotAnObject)?;

        let verdict = match field(object, "verdict") {
            Some(JsonValue::Bool(verdict)) => *verdict,
            Some(_) => {
                return Err(ReplyError::WrongType {
                    field: "verdict",
                    expected: "boolean",
                })
            }
            None => return Err(ReplyError::MissingVerdict),
        };

        let reason = match field(object, "reason") {
            Some(JsonValue::String(reason)) => Some(reason.clone()),
            Some(JsonValue::Null) | None => None,
            Some(_) => {
                return Err(ReplyError::WrongType {
                    field: "reason",
                    expected: "string",
                })
            }
        };

        let confidence = match field(object, "confidence") {
            Some(JsonValue::Number(number)) => {
                let confidence = number.as_f64().ok_or(ReplyError::WrongType {
                    field: "confidence",
                    expected: "number",
                })?;
                if !(0.0..=1.0).contains(&confidence) {
                    return Err(ReplyError::ConfidenceOutOfRange(confidence));
                }
                Some(confidence as f32)
            }
            Some(JsonValue::Null) | None => None,
            Some(_) => {
                return Err(ReplyError::WrongType {
                    field: "confidence",
                    expected: "number",
                })
            }
        };

        Ok(Self {
            verdict,
            reason,
            confidence,
        })
    }

    /// JSON schema for the reply shape.
    ///
    /// Sent to backends as the structured-output hint; conforming
    /// backends must honor it at every fidelity level.
    pub fn json_schema() -> JsonValue {
        serde_json::json!({
            "type": "object",
            "properties": {
                "verdict": {
                    "type": "boolean",
                    "description": "Whether the subject text satisfies the instruction"
                },
                "reason": {
                    "type": ["string", "null"],
                    "description": "Short explanation, required when verdict is false"
                },
                "confidence": {
                    "type": ["number", "null"],
                    "minimum": 0.0,
                    "maximum": 1.0
                }
            },
            "required": ["verdict"],
            "additionalProperties": false
        })
    }
}

/// Case-insensitive field lookup; an exact-case match wins.
fn field<'a>(object: &'a Map<String, JsonValue>, name: &str) -> Option<&'a JsonValue> {
    object.get(name).or_else(|| {
        object
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

/// Unwrap a reply fenced as ```` ```json ... ``` ```` (or a bare fence).
fn strip_fence(text: &str) -> &str {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE
        .get_or_init(|| Regex::new(r"(?s)^```(?:json)?\s*(.*?)\s*```$").expect("Invalid regex"));

    match fence.captures(text) {
        Some(captures) => captures.get(1).map_or(text, |inner| inner.as_str()),
        None => text,
    }
}
