use std::time::Duration;

use modrpc_transport::{HeaderValue, HttpExchange, Method, StatusCode, header};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{HandlerResult, Next, RequestHandler};
use crate::scope::Scope;

/// CORS policy.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins. `"*"` allows any origin.
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<Method>,
    pub allowed_headers: Vec<String>,
    /// How long a preflight result may be cached.
    pub max_age: Duration,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".into()],
            allowed_methods: vec![Method::GET, Method::POST, Method::OPTIONS],
            allowed_headers: vec!["Content-Type".into(), "Authorization".into()],
            max_age: Duration::from_secs(3600),
        }
    }
}

impl CorsConfig {
    fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }

    fn allows(&self, origin: &str) -> bool {
        self.allows_any_origin() || self.allowed_origins.iter().any(|o| o.eq_ignore_ascii_case(origin))
    }
}

/// Sets CORS headers; answers preflight requests without delegating.
pub struct AccessControlHandler {
    next: Next,
    config: CorsConfig,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    max_age: HeaderValue,
}

impl AccessControlHandler {
    pub fn new(next: Next, config: CorsConfig) -> Self {
        let methods = config
            .allowed_methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let headers = config.allowed_headers.join(", ");
        Self {
            next,
            allow_methods: header_value(&methods),
            allow_headers: header_value(&headers),
            max_age: HeaderValue::from(config.max_age.as_secs()),
            config,
        }
    }

    fn set_origin(&self, exchange: &HttpExchange) -> HandlerResult {
        let response = exchange.response();
        if self.config.allows_any_origin() {
            response.insert_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"))?;
            return Ok(());
        }
        match exchange.head().header(header::ORIGIN) {
            Some(origin) if self.config.allows(origin) => {
                response.insert_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, header_value(origin))?;
                response.append_header(header::VARY, HeaderValue::from_static("Origin"))?;
            }
            Some(origin) => debug!("CORS origin not allowed: {}", origin),
            None => {}
        }
        Ok(())
    }
}

impl RequestHandler for AccessControlHandler {
    async fn handle(&self, scope: &Scope, exchange: &HttpExchange, cancel: CancellationToken) -> HandlerResult {
        self.set_origin(exchange)?;

        if exchange.head().method == Method::OPTIONS {
            let response = exchange.response();
            response.insert_header(header::ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone())?;
            response.insert_header(header::ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone())?;
            response.insert_header(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone())?;
            response.respond(StatusCode::NO_CONTENT, None, &[])?;
            return Ok(());
        }

        self.next.run(scope, exchange, cancel).await
    }

    fn name(&self) -> &str {
        "access-control"
    }
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}
