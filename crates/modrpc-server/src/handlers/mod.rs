//! Request handlers and the pipeline they are composed into.
//!
//! Each handler receives the request scope, the exchange and a cancellation
//! token, and may delegate to the [`Next`] handler it was built around.

mod access_control;
mod default;
mod exception_catcher;
mod pipeline;
mod request_limiter;
mod rpc_context;
mod schema;
mod session;
mod timeout;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use modrpc_transport::{HttpExchange, ResponseClosed, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::scope::Scope;

pub use access_control::{AccessControlHandler, CorsConfig};
pub use default::DefaultHandler;
pub use exception_catcher::ExceptionCatcherHandler;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use request_limiter::{RequestLimiterConfig, RequestLimiterHandler};
pub use rpc_context::{RpcContextConfig, RpcContextHandler};
pub use schema::SchemaHandler;
pub use session::SessionHandler;
pub use timeout::TimeoutHandler;

/// Error escaping a handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Rendered as a bare status, without a body contract.
    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out after {0:?}")]
    TimedOut(Duration),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    ResponseClosed(#[from] ResponseClosed),
}

impl HandlerError {
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Status the Exception-Catcher responds with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Status { status, .. } => *status,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::TimedOut(_) => StatusCode::REQUEST_TIMEOUT,
            Self::Internal(_) | Self::ResponseClosed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Expected outcomes of a timeout or shutdown, not faults.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut(_))
    }
}

pub type HandlerResult = Result<(), HandlerError>;

/// Trait for request handlers.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(
        &self,
        scope: &Scope,
        exchange: &HttpExchange,
        cancel: CancellationToken,
    ) -> impl Future<Output = HandlerResult> + Send;

    /// Handler name for debugging.
    fn name(&self) -> &str;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of RequestHandler; all refs share lifetime `'a`.
trait HandlerDyn: Send + Sync {
    fn handle_dyn<'a>(
        &'a self,
        scope: &'a Scope,
        exchange: &'a HttpExchange,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, HandlerResult>;

    fn name_dyn(&self) -> &str;
}

impl<T: RequestHandler> HandlerDyn for T {
    fn handle_dyn<'a>(
        &'a self,
        scope: &'a Scope,
        exchange: &'a HttpExchange,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(self.handle(scope, exchange, cancel))
    }

    fn name_dyn(&self) -> &str {
        self.name()
    }
}

/// The rest of the chain, as seen by the handler wrapping it.
#[derive(Clone)]
pub struct Next {
    handler: Arc<dyn HandlerDyn>,
}

impl Next {
    pub(crate) fn new<H: RequestHandler>(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    pub fn run<'a>(
        &'a self,
        scope: &'a Scope,
        exchange: &'a HttpExchange,
        cancel: CancellationToken,
    ) -> impl Future<Output = HandlerResult> + Send + 'a {
        self.handler.handle_dyn(scope, exchange, cancel)
    }

    pub fn name(&self) -> &str {
        self.handler.name_dyn()
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Next").field(&self.name()).finish()
    }
}
