//! The error value module methods fail with.

use serde::{Deserialize, Serialize};

use crate::envelope::ExceptionInfo;

/// Error raised by a module implementation (or an interceptor around it).
///
/// Rendered to the caller as an `{"exception": ...}` envelope, unless it
/// carries an explicit HTTP status, in which case the envelope is skipped
/// and the caller only sees the bare status.
///
/// `ModuleError` does not implement `std::error::Error`, so
/// that any error type converts into it with `?`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleError {
    #[serde(rename = "typeName")]
    pub type_name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip)]
    pub status: Option<u16>,
}

impl ModuleError {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            data: None,
            status: None,
        }
    }

    /// An error that bypasses the exception envelope and is rendered as a
    /// bare HTTP status.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            type_name: "HttpStatus".into(),
            message: message.into(),
            data: None,
            status: Some(status),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Capture an arbitrary error, keeping the short name of its type.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::new(short_type_name(std::any::type_name::<E>()), err.to_string())
    }

    pub fn has_status(&self) -> bool {
        self.status.is_some()
    }

    pub fn to_exception(&self) -> ExceptionInfo {
        ExceptionInfo {
            type_name: self.type_name.clone(),
            message: self.message.clone(),
            data: self.data.clone().unwrap_or_else(|| serde_json::json!({})),
        }
    }
}

impl<E: std::error::Error + 'static> From<E> for ModuleError {
    fn from(err: E) -> Self {
        Self::from_error(&err)
    }
}

impl std::fmt::Display for ModuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} [{status}]: {}", self.type_name, self.message),
            None => write!(f, "{}: {}", self.type_name, self.message),
        }
    }
}

/// Strip module paths from a `std::any::type_name` string, keeping generic
/// arguments readable: `alloc::vec::Vec<core::num::NonZeroU8>` becomes
/// `Vec<NonZeroU8>`.
pub fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    for ch in full.chars() {
        match ch {
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                out.push_str(last_path_segment(&segment));
                segment.clear();
                out.push(ch);
            }
            _ => segment.push(ch),
        }
    }
    out.push_str(last_path_segment(&segment));
    out
}

fn last_path_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}
