use modrpc_protocol::wire::{CONTENT_TYPE_JSON_UTF8, MODULE_PARAM};
use modrpc_transport::{HttpExchange, Method, StatusCode};
use tokio_util::sync::CancellationToken;

use super::{HandlerError, HandlerResult, Next, RequestHandler};
use crate::dispatch::DispatchEngine;
use crate::scope::Scope;

/// Answers `GET ?module=<id>` with the module's descriptor.
///
/// Any other request passes through.
pub struct SchemaHandler {
    next: Next,
    engine: DispatchEngine,
    module_param: String,
}

impl SchemaHandler {
    pub fn new(next: Next, engine: DispatchEngine) -> Self {
        Self::with_param(next, engine, MODULE_PARAM)
    }

    pub fn with_param(next: Next, engine: DispatchEngine, module_param: impl Into<String>) -> Self {
        Self {
            next,
            engine,
            module_param: module_param.into(),
        }
    }

    fn requested_module<'a>(&self, exchange: &'a HttpExchange) -> Option<&'a str> {
        let head = exchange.head();
        if head.method != Method::GET {
            return None;
        }
        match head.query.as_slice() {
            [(key, value)] if key.eq_ignore_ascii_case(&self.module_param) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl RequestHandler for SchemaHandler {
    async fn handle(&self, scope: &Scope, exchange: &HttpExchange, cancel: CancellationToken) -> HandlerResult {
        let Some(module) = self.requested_module(exchange) else {
            return self.next.run(scope, exchange, cancel).await;
        };

        let Some(descriptor) = self.engine.table().descriptor(module) else {
            return Err(HandlerError::status(StatusCode::NOT_FOUND, format!("module not found: {module}")));
        };
        let body = serde_json::to_vec(descriptor).map_err(|e| HandlerError::Internal(e.to_string()))?;
        exchange
            .response()
            .respond(StatusCode::OK, Some(CONTENT_TYPE_JSON_UTF8), &body)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "schema"
    }
}
