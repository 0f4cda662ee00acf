//! The handler that turns an HTTP exchange into a module call.

use std::sync::Arc;

use modrpc_protocol::wire::{
    CHARSET_UTF8, CONTENT_TYPE_BINARY, CONTENT_TYPE_JSON, CONTENT_TYPE_JSON_UTF8, METHOD_PARAM, MODULE_PARAM,
    SESSION_PARAM, parse_content_type,
};
use modrpc_protocol::{ExceptionEnvelope, ExceptionInfo, ResultEnvelope};
use modrpc_transport::{HttpExchange, Method, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{HandlerError, HandlerResult, Next, RequestHandler};
use crate::context::RequestContext;
use crate::dispatch::{CallResult, DispatchEngine, DispatchError};
use crate::scope::Scope;

/// Names of the query parameters carrying the call target.
#[derive(Debug, Clone)]
pub struct RpcContextConfig {
    pub module_param: String,
    pub method_param: String,
    pub session_param: String,
}

impl Default for RpcContextConfig {
    fn default() -> Self {
        Self {
            module_param: MODULE_PARAM.into(),
            method_param: METHOD_PARAM.into(),
            session_param: SESSION_PARAM.into(),
        }
    }
}

/// Validates the request, publishes its [`RequestContext`], invokes the
/// dispatch engine and writes the result.
pub struct RpcContextHandler {
    next: Next,
    engine: DispatchEngine,
    config: RpcContextConfig,
}

impl RpcContextHandler {
    pub fn new(next: Next, engine: DispatchEngine) -> Self {
        Self::with_config(next, engine, RpcContextConfig::default())
    }

    pub fn with_config(next: Next, engine: DispatchEngine, config: RpcContextConfig) -> Self {
        Self { next, engine, config }
    }

    fn check_preconditions(exchange: &HttpExchange) -> HandlerResult {
        let head = exchange.head();
        if head.method != Method::POST {
            return Err(HandlerError::status(
                StatusCode::METHOD_NOT_ALLOWED,
                format!("{} is not supported, use POST", head.method),
            ));
        }

        let Some(content_type) = head.content_type() else {
            return Err(HandlerError::status(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "missing content type",
            ));
        };
        let (media, charset) = parse_content_type(content_type);
        if media != CONTENT_TYPE_JSON {
            return Err(HandlerError::status(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("unsupported content type: {media}"),
            ));
        }
        // JSON without a declared charset is UTF-8.
        if charset.as_deref().is_some_and(|c| c != CHARSET_UTF8) {
            return Err(HandlerError::status(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("unsupported charset: {}", charset.unwrap_or_default()),
            ));
        }
        Ok(())
    }

    fn target<'a>(&self, exchange: &'a HttpExchange) -> Result<(&'a str, &'a str), HandlerError> {
        let head = exchange.head();
        let module = head
            .query_param(&self.config.module_param)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| HandlerError::status(StatusCode::BAD_REQUEST, "missing module id"))?;
        let method = head
            .query_param(&self.config.method_param)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| HandlerError::status(StatusCode::BAD_REQUEST, "missing method id"))?;
        Ok((module, method))
    }
}

impl RequestHandler for RpcContextHandler {
    async fn handle(&self, scope: &Scope, exchange: &HttpExchange, cancel: CancellationToken) -> HandlerResult {
        Self::check_preconditions(exchange)?;
        let (module, method) = self.target(exchange)?;
        let session_id = exchange
            .head()
            .query_param(&self.config.session_param)
            .map(str::to_string);

        let context = RequestContext::new(exchange.clone(), module, method, session_id, cancel.clone());
        scope.provide(Arc::new(context));

        let outcome = self.engine.invoke(scope, module, method, exchange.body()).await;
        if outcome.is_err() && cancel.is_cancelled() {
            return Err(HandlerError::Cancelled);
        }

        let response = exchange.response();
        match outcome {
            Ok(CallResult::Value(value)) => {
                let body = ResultEnvelope::new(value)
                    .to_vec()
                    .map_err(|e| HandlerError::Internal(e.to_string()))?;
                response.respond(StatusCode::OK, Some(CONTENT_TYPE_JSON_UTF8), &body)?;
            }
            Ok(CallResult::Binary(bytes)) => {
                response.respond(StatusCode::OK, Some(CONTENT_TYPE_BINARY), &bytes)?;
            }
            Err(DispatchError::Module(err)) if err.has_status() => {
                let status = err
                    .status
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                return Err(HandlerError::status(status, err.message));
            }
            Err(err) => {
                debug!(scope = %scope.id(), "{}.{} failed: {}", module, method, err);
                let status = match &err {
                    e if e.is_client_error() => StatusCode::BAD_REQUEST,
                    DispatchError::Module(_) => StatusCode::OK,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                write_exception(exchange, status, err.to_exception())?;
            }
        }

        self.next.run(scope, exchange, cancel).await
    }

    fn name(&self) -> &str {
        "rpc-context"
    }
}

fn write_exception(exchange: &HttpExchange, status: StatusCode, exception: ExceptionInfo) -> HandlerResult {
    let body = ExceptionEnvelope::new(exception)
        .to_vec()
        .map_err(|e| HandlerError::Internal(e.to_string()))?;
    exchange
        .response()
        .respond(status, Some(CONTENT_TYPE_JSON_UTF8), &body)?;
    Ok(())
}
