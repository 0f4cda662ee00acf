use modrpc_transport::HttpExchange;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{HandlerResult, Next, RequestHandler};
use crate::scope::Scope;

/// Turns any error escaping the inner chain into a status response.
pub struct ExceptionCatcherHandler {
    next: Next,
    log_errors: bool,
}

impl ExceptionCatcherHandler {
    pub fn new(next: Next) -> Self {
        Self { next, log_errors: true }
    }

    pub fn without_logging(next: Next) -> Self {
        Self { next, log_errors: false }
    }
}

impl RequestHandler for ExceptionCatcherHandler {
    async fn handle(&self, scope: &Scope, exchange: &HttpExchange, cancel: CancellationToken) -> HandlerResult {
        let Err(err) = self.next.run(scope, exchange, cancel).await else {
            return Ok(());
        };

        if self.log_errors {
            if err.is_cancellation() {
                debug!(scope = %scope.id(), "Request ended early: {}", err);
            } else {
                warn!(scope = %scope.id(), "Request failed: {}", err);
            }
        }

        let response = exchange.response();
        if !response.is_closed() {
            // Anything already written belongs to the failed attempt.
            let _ = response.respond(err.status_code(), None, &[]);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "exception-catcher"
    }
}
