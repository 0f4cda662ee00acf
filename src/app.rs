//! Wiring: dispatch table, handler pipeline and web service.

use std::sync::Arc;
use std::time::Duration;

use modrpc_server::handlers::{
    AccessControlHandler, CorsConfig, ExceptionCatcherHandler, RequestLimiterConfig, RequestLimiterHandler,
    RpcContextConfig, RpcContextHandler, SchemaHandler, SessionHandler, TimeoutHandler,
};
use modrpc_server::{
    ConfigError, DispatchEngine, DispatchTableBuilder, InterceptorChain, Pipeline, PipelineBuilder, ServiceConfig,
    ServiceRegistry, TracingInterceptor, WebService,
};
use modrpc_transport::{HttpTransport, HttpTransportConfig};

use crate::demo;

/// Everything needed to stand up a service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub transport: HttpTransportConfig,
    pub service: ServiceConfig,
    pub cors: CorsConfig,
    /// `None` disables rate limiting.
    pub limiter: Option<RequestLimiterConfig>,
    pub timeout: Duration,
    pub rpc: RpcContextConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            transport: HttpTransportConfig::default(),
            service: ServiceConfig::default(),
            cors: CorsConfig::default(),
            limiter: Some(RequestLimiterConfig::default()),
            timeout: Duration::from_secs(30),
            rpc: RpcContextConfig::default(),
        }
    }
}

pub fn build_engine() -> Result<DispatchEngine, ConfigError> {
    let mut builder = DispatchTableBuilder::new();
    builder
        .register(demo::calculator_contract())
        .register(demo::session_contract());
    let table = builder.build()?;

    let mut interceptors = InterceptorChain::new();
    interceptors.add(TracingInterceptor);
    Ok(DispatchEngine::with_interceptors(table, interceptors))
}

/// Catcher, CORS, limiter, timeout, session, schema, then dispatch.
pub fn build_pipeline(engine: DispatchEngine, config: &AppConfig) -> Pipeline {
    let cors = config.cors.clone();
    let timeout = config.timeout;
    let rpc = config.rpc.clone();
    let schema_engine = engine.clone();
    let schema_param = rpc.module_param.clone();

    let mut builder = PipelineBuilder::new()
        .with(ExceptionCatcherHandler::new)
        .with(move |next| AccessControlHandler::new(next, cors));
    if let Some(limiter) = config.limiter.clone() {
        builder = builder.with(move |next| RequestLimiterHandler::new(next, limiter));
    }
    builder
        .with(move |next| TimeoutHandler::new(next, timeout))
        .with(SessionHandler::new)
        .with(move |next| SchemaHandler::with_param(next, schema_engine, schema_param))
        .with(move |next| RpcContextHandler::with_config(next, engine, rpc))
        .build()
}

pub fn build_service(config: &AppConfig) -> Result<WebService<HttpTransport>, ConfigError> {
    let engine = build_engine()?;
    let pipeline = build_pipeline(engine, config);

    let mut registry = ServiceRegistry::new();
    demo::register(&mut registry);

    Ok(WebService::new(
        Arc::new(HttpTransport::new(config.transport.clone())),
        pipeline,
        Arc::new(registry),
        config.service.clone(),
    ))
}
