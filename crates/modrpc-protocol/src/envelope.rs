//! Response envelopes written by the dispatch handler.

use serde::{Deserialize, Serialize};

/// `{"result": <value>}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub result: serde_json::Value,
}

/// `{"exception": {"typeName": ..., "message": ..., "data": {...}}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionEnvelope {
    pub exception: ExceptionInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    #[serde(rename = "typeName")]
    pub type_name: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ResultEnvelope {
    pub fn new(result: serde_json::Value) -> Self {
        Self { result }
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl ExceptionEnvelope {
    pub fn new(exception: ExceptionInfo) -> Self {
        Self { exception }
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl ExceptionInfo {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            data: serde_json::json!({}),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
