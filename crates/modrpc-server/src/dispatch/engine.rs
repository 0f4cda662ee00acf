//! Module Dispatch Engine: runtime entry point for every call.

use std::sync::Arc;

use bytes::Bytes;
use modrpc_protocol::{ExceptionInfo, ModuleError, PayloadError, decode_positional};
use serde_json::json;
use tokio::runtime::Handle;
use tracing::debug;

use super::contract::CallFuture;
use super::table::DispatchTable;
use crate::interceptor::{CallInfo, InterceptorChain};
use crate::scope::Scope;

/// Normalized outcome of a call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    /// Rendered inside a `{"result": ...}` envelope. `null` for void methods.
    Value(serde_json::Value),
    /// Sent as-is, without an envelope.
    Binary(Bytes),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("module not found: {module}")]
    ModuleNotFound { module: String },

    #[error("method not found: {module}.{method}")]
    MethodNotFound { module: String, method: String },

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("no implementation registered for module {module}")]
    ImplementationMissing { module: String },

    #[error("{0}")]
    Module(ModuleError),

    #[error("call aborted: {0}")]
    Aborted(String),
}

impl DispatchError {
    pub fn type_name(&self) -> &str {
        match self {
            Self::ModuleNotFound { .. } => "ModuleNotFound",
            Self::MethodNotFound { .. } => "MethodNotFound",
            Self::Payload(e) => e.type_name(),
            Self::ImplementationMissing { .. } => "ImplementationMissing",
            Self::Module(e) => &e.type_name,
            Self::Aborted(_) => "Aborted",
        }
    }

    /// Routing and payload errors: the caller asked for something invalid.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ModuleNotFound { .. } | Self::MethodNotFound { .. } | Self::Payload(_)
        )
    }

    pub fn to_exception(&self) -> ExceptionInfo {
        match self {
            Self::Module(e) => e.to_exception(),
            Self::ModuleNotFound { module } => {
                ExceptionInfo::new(self.type_name(), self.to_string()).with_data(json!({ "module": module }))
            }
            Self::MethodNotFound { module, method } => ExceptionInfo::new(self.type_name(), self.to_string())
                .with_data(json!({ "module": module, "method": method })),
            _ => ExceptionInfo::new(self.type_name(), self.to_string()),
        }
    }
}

/// Routes calls through a [`DispatchTable`], running the interceptor chain
/// around each bound call.
#[derive(Clone)]
pub struct DispatchEngine {
    table: Arc<DispatchTable>,
    interceptors: Arc<InterceptorChain>,
}

impl DispatchEngine {
    pub fn new(table: DispatchTable) -> Self {
        Self::with_interceptors(table, InterceptorChain::new())
    }

    pub fn with_interceptors(table: DispatchTable, interceptors: InterceptorChain) -> Self {
        Self {
            table: Arc::new(table),
            interceptors: Arc::new(interceptors),
        }
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    /// Invoke `module.method` with a JSON positional-array `payload`.
    ///
    /// Exactly one implementation instance is resolved from `scope`.
    pub async fn invoke(
        &self,
        scope: &Scope,
        module: &str,
        method: &str,
        payload: &[u8],
    ) -> Result<CallResult, DispatchError> {
        let entry = self.table.lookup(module, method)?;
        let args = decode_positional(payload)?;
        let call = entry.bind(scope, args)?;

        let info = CallInfo {
            module: &entry.module_id,
            method: &entry.id,
            scope,
        };
        self.interceptors
            .run_before(&info)
            .await
            .map_err(DispatchError::Module)?;

        let outcome = if entry.long_running {
            debug!("Running {}.{} on a blocking thread", entry.module_id, entry.id);
            run_long(call).await?
        } else {
            call.await
        };

        self.interceptors.run_after(&info, &outcome).await;
        outcome.map_err(DispatchError::Module)
    }
}

/// Long-running calls get a thread of their own so they cannot starve the
/// worker threads.
async fn run_long(call: CallFuture) -> Result<Result<CallResult, ModuleError>, DispatchError> {
    let handle = Handle::current();
    tokio::task::spawn_blocking(move || handle.block_on(call))
        .await
        .map_err(|e| DispatchError::Aborted(e.to_string()))
}
