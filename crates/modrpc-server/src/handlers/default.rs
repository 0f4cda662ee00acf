use modrpc_transport::{HttpExchange, StatusCode};
use tokio_util::sync::CancellationToken;

use super::{HandlerResult, RequestHandler};
use crate::scope::Scope;

/// Terminal handler: closes whatever reached it with an empty 200.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandler;

impl RequestHandler for DefaultHandler {
    async fn handle(&self, _scope: &Scope, exchange: &HttpExchange, _cancel: CancellationToken) -> HandlerResult {
        let response = exchange.response();
        if !response.is_closed() {
            response.respond(StatusCode::OK, None, &[])?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "default"
    }
}
