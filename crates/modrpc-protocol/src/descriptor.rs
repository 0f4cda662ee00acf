//! Module descriptors returned by the schema query.

use serde::{Deserialize, Serialize};

/// How a method hands back its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReturnShape {
    /// Synchronous, no value (rendered as `null`).
    None,
    /// Synchronous value.
    Value,
    /// Asynchronous, no value (rendered as `null` after completion).
    AsyncNone,
    /// Asynchronous value (unwrapped after completion).
    AsyncValue,
    /// Asynchronous raw byte stream, sent without an envelope.
    Binary,
}

impl ReturnShape {
    pub fn is_async(self) -> bool {
        matches!(self, Self::AsyncNone | Self::AsyncValue | Self::Binary)
    }

    pub fn has_value(self) -> bool {
        matches!(self, Self::Value | Self::AsyncValue | Self::Binary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Effective (alias-resolved) module id.
    pub module: String,
    pub methods: Vec<MethodDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Declared member name.
    pub name: String,
    /// Effective (alias-resolved) method id.
    pub id: String,
    pub parameters: Vec<String>,
    pub returns: ReturnShape,
    #[serde(rename = "longRunning")]
    pub long_running: bool,
}

impl ModuleDescriptor {
    pub fn method(&self, id: &str) -> Option<&MethodDescriptor> {
        let id = id.to_lowercase();
        self.methods.iter().find(|m| m.id.to_lowercase() == id)
    }
}
