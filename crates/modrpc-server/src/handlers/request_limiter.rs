use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use modrpc_transport::{HttpExchange, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{HandlerError, HandlerResult, Next, RequestHandler};
use crate::scope::Scope;

/// Tracked addresses above which idle ones are pruned.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone)]
pub struct RequestLimiterConfig {
    /// Length of the sliding window.
    pub window: Duration,
    /// Requests allowed per remote address within one window.
    pub max_requests: usize,
}

impl Default for RequestLimiterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 600,
        }
    }
}

/// Rejects remote addresses that exceed the configured request rate.
pub struct RequestLimiterHandler {
    next: Next,
    config: RequestLimiterConfig,
    hits: DashMap<IpAddr, VecDeque<Instant>>,
    last_prune: Mutex<Option<Instant>>,
}

impl RequestLimiterHandler {
    pub fn new(next: Next, config: RequestLimiterConfig) -> Self {
        Self {
            next,
            config,
            hits: DashMap::new(),
            last_prune: Mutex::new(None),
        }
    }

    /// Record a request from `ip` at `now`; `false` if it is over the limit.
    ///
    /// Rejected requests count too, so a client hammering the service stays
    /// blocked until it slows down.
    pub fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut hits = self.hits.entry(ip).or_default();
        while let Some(&oldest) = hits.front() {
            if now.saturating_duration_since(oldest) < self.config.window {
                break;
            }
            hits.pop_front();
        }
        hits.push_back(now);
        hits.len() <= self.config.max_requests
    }

    /// Drop addresses with no requests in the current window.
    pub fn prune(&self, now: Instant) {
        self.hits.retain(|_, hits| {
            hits.back()
                .is_some_and(|last| now.saturating_duration_since(*last) < self.config.window)
        });
    }

    /// Prune when too many addresses are tracked, at most once per window.
    /// Returns whether a prune ran.
    pub fn maybe_prune(&self, now: Instant) -> bool {
        if self.hits.len() <= PRUNE_THRESHOLD {
            return false;
        }
        {
            let mut last = self.last_prune.lock();
            if last.is_some_and(|at| now.saturating_duration_since(at) < self.config.window) {
                return false;
            }
            *last = Some(now);
        }
        self.prune(now);
        true
    }

    pub fn tracked_addresses(&self) -> usize {
        self.hits.len()
    }
}

impl RequestHandler for RequestLimiterHandler {
    async fn handle(&self, scope: &Scope, exchange: &HttpExchange, cancel: CancellationToken) -> HandlerResult {
        let ip = exchange.head().remote.ip();
        let now = Instant::now();
        if !self.check_at(ip, now) {
            warn!("Request limit exceeded for {}", ip);
            return Err(HandlerError::status(StatusCode::FORBIDDEN, format!("request limit exceeded for {ip}")));
        }
        self.maybe_prune(now);
        self.next.run(scope, exchange, cancel).await
    }

    fn name(&self) -> &str {
        "request-limiter"
    }
}
