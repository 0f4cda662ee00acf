//! Request context: per-call values made available to module implementations.
//!
//! The dispatch handler builds one [`RequestContext`] per call and publishes
//! it into the request's [`Scope`](crate::Scope). Scoped factories resolve it
//! from there; nothing is stored in thread-locals.

use std::net::SocketAddr;

use bytes::Bytes;
use modrpc_transport::{HeaderMap, HttpExchange, RequestHead};
use tokio_util::sync::CancellationToken;

/// Context for a single RPC call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Session id supplied by the caller, if any.
    pub session_id: Option<String>,
    /// Module id as requested (before case folding).
    pub module: String,
    /// Method id as requested (before case folding).
    pub method: String,
    /// Raw argument payload.
    pub args: Bytes,
    /// Set when the request times out or the service shuts down.
    pub cancellation: CancellationToken,
    exchange: HttpExchange,
}

impl RequestContext {
    pub fn new(
        exchange: HttpExchange,
        module: impl Into<String>,
        method: impl Into<String>,
        session_id: Option<String>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            module: module.into(),
            method: method.into(),
            args: exchange.body().clone(),
            cancellation,
            exchange,
        }
    }

    pub fn remote(&self) -> SocketAddr {
        self.exchange.head().remote
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.exchange.head().headers
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.exchange.head().query_param(name)
    }

    pub fn head(&self) -> &RequestHead {
        self.exchange.head()
    }

    /// The raw transport exchange this call arrived on.
    pub fn exchange(&self) -> &HttpExchange {
        &self.exchange
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
