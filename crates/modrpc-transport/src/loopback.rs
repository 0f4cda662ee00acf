//! In-process transport.
//!
//! Requests are submitted directly by the embedding program (or a test)
//! instead of arriving over a socket. Useful for driving the full worker
//! pool and pipeline without binding a port.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, header};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::TransportError;
use crate::exchange::{HttpExchange, HttpResponse, RequestHead, ResponseSink};
use crate::server::Transport;

/// A request to submit to a [`LoopbackTransport`].
#[derive(Debug, Clone)]
pub struct LoopbackRequest {
    head: RequestHead,
    body: Bytes,
}

impl LoopbackRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            head: RequestHead {
                method,
                path: path.into(),
                query: Vec::new(),
                headers: HeaderMap::new(),
                remote: SocketAddr::from(([127, 0, 0, 1], 0)),
            },
            body: Bytes::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn options(path: impl Into<String>) -> Self {
        Self::new(Method::OPTIONS, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.head.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.head.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    pub fn remote(mut self, remote: SocketAddr) -> Self {
        self.head.remote = remote;
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// JSON body with `Content-Type: application/json; charset=utf-8`.
    pub fn json(self, value: &serde_json::Value) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.header(header::CONTENT_TYPE, "application/json; charset=utf-8")
            .body(body)
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    /// Turn the request into an exchange without going through a transport.
    pub fn into_exchange(self) -> (HttpExchange, oneshot::Receiver<HttpResponse>) {
        let (sink, completion) = ResponseSink::new();
        (HttpExchange::new(self.head, self.body, sink), completion)
    }
}

type ExchangeQueue = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<HttpExchange>>>;

struct Open {
    queue_tx: mpsc::UnboundedSender<HttpExchange>,
    queue: ExchangeQueue,
}

/// Transport fed by [`LoopbackTransport::submit`].
#[derive(Default)]
pub struct LoopbackTransport {
    open: Mutex<Option<Open>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request; the receiver yields the response once a worker closes it.
    pub fn submit(
        &self,
        request: LoopbackRequest,
    ) -> Result<oneshot::Receiver<HttpResponse>, TransportError> {
        let open = self.open.lock();
        let open = open.as_ref().ok_or(TransportError::NotStarted)?;
        let (exchange, completion) = request.into_exchange();
        open.queue_tx
            .send(exchange)
            .map_err(|_| TransportError::Closed)?;
        Ok(completion)
    }

    /// Submit a request and wait for its response.
    pub async fn call(&self, request: LoopbackRequest) -> Result<HttpResponse, TransportError> {
        self.submit(request)?.await.map_err(|_| TransportError::Closed)
    }
}

impl Transport for LoopbackTransport {
    async fn start(&self) -> Result<(), TransportError> {
        let mut open = self.open.lock();
        if open.is_some() {
            return Err(TransportError::AlreadyStarted);
        }
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        *open = Some(Open {
            queue_tx,
            queue: Arc::new(tokio::sync::Mutex::new(queue_rx)),
        });
        Ok(())
    }

    async fn stop(&self) {
        self.open.lock().take();
    }

    async fn accept(&self) -> Option<HttpExchange> {
        let queue = self.open.lock().as_ref().map(|o| o.queue.clone())?;
        let mut rx = queue.lock().await;
        rx.recv().await
    }

    fn is_started(&self) -> bool {
        self.open.lock().is_some()
    }
}
