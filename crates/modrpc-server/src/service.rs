//! Web service: the worker pool feeding accepted requests into the pipeline.
//!
//! `Stopped -> Starting -> Running -> Stopping -> Stopped`. The dispatch
//! table and pipeline are built once and reused across restarts; only the
//! transport listener and the workers are recreated.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use futures_util::FutureExt;
use modrpc_transport::{HttpExchange, StatusCode, Transport, TransportError};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::handlers::Pipeline;
use crate::scope::{Scope, ServiceRegistry};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Number of worker loops.
    pub workers: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service is already running")]
    AlreadyRunning,

    #[error("service is not running")]
    NotRunning,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// State shared with the worker tasks.
struct Shared<T> {
    transport: Arc<T>,
    pipeline: Pipeline,
    registry: Arc<ServiceRegistry>,
    active: AtomicUsize,
    drained: Notify,
}

/// Decrements the active-worker count when a worker exits, however it exits.
struct ActiveWorker<T>(Arc<Shared<T>>);

impl<T> Drop for ActiveWorker<T> {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}

pub struct WebService<T: Transport> {
    shared: Arc<Shared<T>>,
    config: ServiceConfig,
    state: Mutex<ServiceState>,
    stop: Mutex<CancellationToken>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Transport> WebService<T> {
    pub fn new(transport: Arc<T>, pipeline: Pipeline, registry: Arc<ServiceRegistry>, config: ServiceConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                pipeline,
                registry,
                active: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
            config,
            state: Mutex::new(ServiceState::Stopped),
            stop: Mutex::new(CancellationToken::new()),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Start the transport and launch the workers.
    ///
    /// Returns once the workers are spawned, not once they process anything.
    pub async fn start(&self) -> Result<(), ServiceError> {
        {
            let mut state = self.state.lock();
            if *state != ServiceState::Stopped {
                return Err(ServiceError::AlreadyRunning);
            }
            *state = ServiceState::Starting;
        }

        let workers = self.config.workers.max(1);
        info!("Starting web service ({} workers)", workers);

        if let Err(e) = self.shared.transport.start().await {
            error!("Transport failed to start: {}", e);
            *self.state.lock() = ServiceState::Stopped;
            return Err(e.into());
        }

        let stop = CancellationToken::new();
        *self.stop.lock() = stop.clone();

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            self.shared.active.fetch_add(1, Ordering::SeqCst);
            let guard = ActiveWorker(self.shared.clone());
            handles.push(tokio::spawn(worker_loop(index, guard, stop.clone())));
        }
        *self.workers.lock() = handles;

        *self.state.lock() = ServiceState::Running;
        info!("Web service running");
        Ok(())
    }

    /// Stop accepting, cancel in-flight requests and wait for every worker
    /// to finish its current request.
    pub async fn stop(&self) -> Result<(), ServiceError> {
        {
            let mut state = self.state.lock();
            if *state != ServiceState::Running {
                return Err(ServiceError::NotRunning);
            }
            *state = ServiceState::Stopping;
        }
        info!("Stopping web service...");

        self.stop.lock().cancel();
        self.shared.transport.stop().await;
        self.wait_drained().await;

        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Worker task ended abnormally: {}", e);
            }
        }

        *self.state.lock() = ServiceState::Stopped;
        info!("Web service stopped");
        Ok(())
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.shared.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let active = self.shared.active.load(Ordering::SeqCst);
            if active == 0 {
                return;
            }
            debug!("Waiting for {} workers to drain", active);
            notified.await;
        }
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    /// Workers currently alive. Zero once `stop` has returned.
    pub fn active_workers(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.shared.transport
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.shared.pipeline
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

impl<T: Transport> Drop for WebService<T> {
    fn drop(&mut self) {
        self.stop.lock().cancel();
    }
}

// ─── Worker loop ─────────────────────────────────────────────────────────

async fn worker_loop<T: Transport>(index: usize, guard: ActiveWorker<T>, stop: CancellationToken) {
    let shared = guard.0.clone();
    debug!("Worker {} started", index);

    loop {
        let accepted = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            accepted = shared.transport.accept() => accepted,
        };
        let Some(exchange) = accepted else {
            // The transport closed before the service was told to stop.
            stop.cancelled().await;
            break;
        };
        serve(&shared, exchange, stop.child_token()).await;
    }

    debug!("Worker {} exiting", index);
    drop(guard);
}

async fn serve<T: Transport>(shared: &Shared<T>, exchange: HttpExchange, cancel: CancellationToken) {
    let scope = Scope::new(shared.registry.clone());
    let started = Instant::now();
    let head = exchange.head();
    debug!(scope = %scope.id(), "{} {} from {}", head.method, head.path, head.remote);

    let outcome = AssertUnwindSafe(shared.pipeline.handle(&scope, &exchange, cancel))
        .catch_unwind()
        .await;
    let failed = match outcome {
        Ok(Ok(())) => {
            debug!(scope = %scope.id(), "Request completed in {:?}", started.elapsed());
            false
        }
        Ok(Err(e)) => {
            error!(scope = %scope.id(), "Unhandled request error: {}", e);
            true
        }
        Err(_) => {
            error!(scope = %scope.id(), "Request handler panicked");
            true
        }
    };

    let response = exchange.response();
    if failed && !response.is_closed() {
        let _ = response.respond(StatusCode::INTERNAL_SERVER_ERROR, None, &[]);
    } else {
        response.close();
    }
    drop(scope);
}
