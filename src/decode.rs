//! Progress event decoder.
//!
//! Classifies one raw message from the event stream. The decoder is pure and
//! stateless, so every session shares it.
//!
//! Accepted shapes:
//! ```text
//! {"step": 1, "total": 5, "message": "Creating project directory..."}
//! {"completed": true}
//! Files processed: 12          (lenient sessions only)
//! ```

use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::ProgressEvent;
use crate::options::DecodePolicy;

/// Why a message could not be classified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty message")]
    Empty,

    #[error("not a structured record: {0}")]
    NotStructured(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Classification of one raw message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// The operation is done; ends the session.
    Completion,

    /// Structured progress update.
    Progress(ProgressEvent),

    /// Unstructured text, forwarded verbatim.
    RawText(String),

    /// Message could not be classified; ends the session with an error.
    Malformed(DecodeError),
}

impl Decoded {
    /// Returns true if this classification ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Decoded::Completion | Decoded::Malformed(_))
    }
}

/// Decode one raw message under the given policy.
///
/// # Example
/// ```
/// use vcx_client::decode::{decode, Decoded};
/// use vcx_client::options::DecodePolicy;
///
/// assert_eq!(decode(r#"{"completed": true}"#, DecodePolicy::Strict), Decoded::Completion);
/// assert_eq!(
///     decode("Files processed: 3", DecodePolicy::Lenient),
///     Decoded::RawText("Files processed: 3".to_string())
/// );
/// ```
pub fn decode(raw: &str, policy: DecodePolicy) -> Decoded {
    if raw.trim().is_empty() {
        return Decoded::Malformed(DecodeError::Empty);
    }

    let record = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(record)) => record,
        Ok(other) => return unstructured(raw, policy, format!("expected an object, got {}", kind(&other))),
        Err(e) => return unstructured(raw, policy, e.to_string()),
    };

    if record.get("completed").is_some_and(is_truthy) {
        return Decoded::Completion;
    }

    match progress_from_record(&record) {
        Ok(event) => Decoded::Progress(event),
        Err(e) => Decoded::Malformed(e),
    }
}

fn unstructured(raw: &str, policy: DecodePolicy, reason: String) -> Decoded {
    match policy {
        DecodePolicy::Lenient => Decoded::RawText(raw.to_string()),
        DecodePolicy::Strict => Decoded::Malformed(DecodeError::NotStructured(reason)),
    }
}

fn progress_from_record(record: &Map<String, Value>) -> Result<ProgressEvent, DecodeError> {
    let step = field(record, "step")?;
    let total = field(record, "total")?;
    let message = field(record, "message")?;

    let step = step.as_u64().ok_or_else(|| DecodeError::InvalidField {
        field: "step",
        reason: format!("expected a non-negative integer, got {}", step),
    })?;

    let total = match total.as_u64() {
        Some(0) => {
            return Err(DecodeError::InvalidField {
                field: "total",
                reason: "must be greater than zero".to_string(),
            })
        }
        Some(total) => total,
        None => {
            return Err(DecodeError::InvalidField {
                field: "total",
                reason: format!("expected a positive integer, got {}", total),
            })
        }
    };

    let message = message.as_str().ok_or_else(|| DecodeError::InvalidField {
        field: "message",
        reason: format!("expected a string, got {}", kind(message)),
    })?;

    Ok(ProgressEvent::new(step, total, message))
}

fn field<'a>(record: &'a Map<String, Value>, name: &'static str) -> Result<&'a Value, DecodeError> {
    record.get(name).ok_or(DecodeError::MissingField(name))
}

/// Loose truthiness used by the agent for its `completed` flag.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
