//! Positional argument payloads.
//!
//! A call payload is a JSON array whose elements are matched, by position,
//! against the target method's parameter list.

use serde_json::Value;

/// The payload could not be turned into the method's argument list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("expected {expected} argument(s), got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    #[error("argument {index} is not a valid {expected}: {reason}")]
    ArgumentType {
        index: usize,
        expected: String,
        reason: String,
    },
}

impl PayloadError {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "MalformedPayload",
            Self::ArgumentCount { .. } => "ArgumentCountMismatch",
            Self::ArgumentType { .. } => "ArgumentTypeMismatch",
        }
    }
}

/// Decode a request body into its positional arguments.
///
/// An empty body is treated as an empty argument list.
pub fn decode_positional(body: &[u8]) -> Result<Vec<Value>, PayloadError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Array(args)) => Ok(args),
        Ok(other) => Err(PayloadError::Malformed(format!(
            "expected a JSON array of arguments, got {}",
            kind_of(&other)
        ))),
        Err(e) => Err(PayloadError::Malformed(e.to_string())),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
