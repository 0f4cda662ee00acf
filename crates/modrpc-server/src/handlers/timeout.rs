use std::time::Duration;

use modrpc_transport::HttpExchange;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{HandlerError, HandlerResult, Next, RequestHandler};
use crate::scope::Scope;

/// Bounds the time the inner chain may take.
///
/// On expiry the inner chain's token is cancelled, and the chain is still
/// awaited to completion: nothing it started outlives this handler.
pub struct TimeoutHandler {
    next: Next,
    timeout: Duration,
}

impl TimeoutHandler {
    pub fn new(next: Next, timeout: Duration) -> Self {
        Self { next, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl RequestHandler for TimeoutHandler {
    async fn handle(&self, scope: &Scope, exchange: &HttpExchange, cancel: CancellationToken) -> HandlerResult {
        let linked = cancel.child_token();
        let inner = self.next.run(scope, exchange, linked.clone());
        tokio::pin!(inner);

        match tokio::time::timeout(self.timeout, &mut inner).await {
            Ok(result) => result,
            Err(_) => {
                debug!(scope = %scope.id(), "Request timed out after {:?}, cancelling", self.timeout);
                linked.cancel();
                let result = inner.await;
                if exchange.response().is_closed() {
                    result
                } else {
                    Err(HandlerError::TimedOut(self.timeout))
                }
            }
        }
    }

    fn name(&self) -> &str {
        "timeout"
    }
}
