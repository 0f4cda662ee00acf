use std::sync::Arc;

use modrpc_transport::{HttpExchange, ResponseSink};
use tokio_util::sync::CancellationToken;

use super::{HandlerResult, Next, RequestHandler};
use crate::scope::Scope;

/// Publishes the raw request and response into the scope, so scoped
/// factories can depend on them.
///
/// Resolvable afterwards: `HttpExchange`, `RequestHead`, `ResponseSink`.
pub struct SessionHandler {
    next: Next,
}

impl SessionHandler {
    pub fn new(next: Next) -> Self {
        Self { next }
    }
}

impl RequestHandler for SessionHandler {
    async fn handle(&self, scope: &Scope, exchange: &HttpExchange, cancel: CancellationToken) -> HandlerResult {
        scope.provide(Arc::new(exchange.clone()));
        scope.provide(exchange.head().clone());
        scope.provide::<ResponseSink>(Arc::new(exchange.response().clone()));
        self.next.run(scope, exchange, cancel).await
    }

    fn name(&self) -> &str {
        "session"
    }
}
