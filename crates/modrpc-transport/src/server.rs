//! HTTP transport server using Axum.
//!
//! Every HTTP request is collected into an [`HttpExchange`] and queued.
//! Workers pull exchanges with [`Transport::accept`] and answer through the
//! exchange's response sink; the Axum handler waits for that answer and
//! writes it back to the connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Query, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::exchange::{HttpExchange, RequestHead, ResponseSink};

/// Largest request body the HTTP transport will buffer.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Source of accepted requests for the worker pool.
///
/// Implementations must hand every accepted exchange to exactly one caller
/// of [`accept`](Transport::accept), however many workers call it at once.
pub trait Transport: Send + Sync + 'static {
    /// Begin accepting requests.
    fn start(&self) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Stop accepting requests. Exchanges not yet handed out are dropped.
    fn stop(&self) -> impl std::future::Future<Output = ()> + Send;

    /// Wait for the next accepted exchange. `None` once the transport is stopped.
    fn accept(&self) -> impl std::future::Future<Output = Option<HttpExchange>> + Send;

    fn is_started(&self) -> bool;
}

/// HTTP transport configuration.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Hostname to bind to
    pub hostname: String,
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Accepted exchanges buffered while all workers are busy
    pub queue_depth: usize,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".into(),
            port: 7080,
            queue_depth: 1024,
        }
    }
}

/// Shared state for the Axum handler.
struct AppState {
    queue_tx: mpsc::Sender<HttpExchange>,
}

type ExchangeQueue = Arc<tokio::sync::Mutex<mpsc::Receiver<HttpExchange>>>;

struct Listening {
    /// Shutdown signal
    shutdown_tx: mpsc::Sender<()>,
    /// Server task handle
    handle: tokio::task::JoinHandle<()>,
    queue: ExchangeQueue,
}

/// The HTTP transport: an Axum server feeding a shared exchange queue.
pub struct HttpTransport {
    config: HttpTransportConfig,
    listening: Mutex<Option<Listening>>,
    /// Actual bound port (0 while stopped)
    port: AtomicU16,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Self {
        Self {
            config,
            listening: Mutex::new(None),
            port: AtomicU16::new(0),
        }
    }

    /// Get the actual bound port, or 0 when not listening.
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }
}

impl Transport for HttpTransport {
    async fn start(&self) -> Result<(), TransportError> {
        if self.is_started() {
            return Err(TransportError::AlreadyStarted);
        }

        let (queue_tx, queue_rx) = mpsc::channel(self.config.queue_depth.max(1));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let state = Arc::new(AppState { queue_tx });
        let app = Router::new().fallback(accept_exchange).with_state(state);

        let addr: SocketAddr = format!("{}:{}", self.config.hostname, self.config.port)
            .parse()
            .map_err(|_| {
                TransportError::Address(format!("{}:{}", self.config.hostname, self.config.port))
            })?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!("modrpc transport listening on http://{}:{}", self.config.hostname, actual_port);

        let handle = tokio::spawn(async move {
            let served = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await;
            if let Err(e) = served {
                error!("HTTP transport failed: {e}");
            }
        });

        let mut listening = self.listening.lock();
        if listening.is_some() {
            // Lost a start race; tear down the listener we just spawned.
            handle.abort();
            return Err(TransportError::AlreadyStarted);
        }
        *listening = Some(Listening {
            shutdown_tx,
            handle,
            queue: Arc::new(tokio::sync::Mutex::new(queue_rx)),
        });
        self.port.store(actual_port, Ordering::Release);
        Ok(())
    }

    async fn stop(&self) {
        let listening = self.listening.lock().take();
        let Some(listening) = listening else {
            return;
        };
        self.port.store(0, Ordering::Release);

        let _ = listening.shutdown_tx.send(()).await;
        // Queued exchanges are dropped once the last worker lets go of the queue.
        drop(listening.queue);
        if let Err(e) = listening.handle.await {
            warn!("HTTP transport task ended abnormally: {e}");
        }
        info!("modrpc transport stopped");
    }

    async fn accept(&self) -> Option<HttpExchange> {
        let queue = self.listening.lock().as_ref().map(|l| l.queue.clone())?;
        let mut rx = queue.lock().await;
        rx.recv().await
    }

    fn is_started(&self) -> bool {
        self.listening.lock().is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn accept_exchange(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            warn!("Rejected request body from {remote}: {e}");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let query = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
        .map(|Query(pairs)| pairs)
        .unwrap_or_default();

    let head = RequestHead {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query,
        headers: parts.headers,
        remote,
    };

    let (sink, completion) = ResponseSink::new();
    if state.queue_tx.send(HttpExchange::new(head, body, sink)).await.is_err() {
        debug!("Exchange queue closed, rejecting request from {remote}");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    match completion.await {
        Ok(response) => (response.status, response.headers, response.body).into_response(),
        Err(_) => {
            debug!("Exchange from {remote} dropped without a response");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
