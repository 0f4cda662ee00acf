//! modrpc server: routes RPC calls to registered modules.
//!
//! The server side is three pieces wired together once at startup:
//!
//! - a [`DispatchTable`] compiled from [`ModuleContract`]s and executed by
//!   the [`DispatchEngine`];
//! - a [`Pipeline`] of request handlers (CORS, exception containment, rate
//!   limiting, timeouts, schema queries, dispatch);
//! - a [`WebService`] running N worker loops that pull exchanges from a
//!   transport and drive them through the pipeline.

pub mod context;
pub mod dispatch;
pub mod handlers;
pub mod interceptor;
pub mod scope;
pub mod service;

pub use context::RequestContext;
pub use dispatch::{
    ByRef, CallResult, ConfigError, DispatchEngine, DispatchError, DispatchTable,
    DispatchTableBuilder, ModuleContract,
};
pub use handlers::{HandlerError, HandlerResult, Next, Pipeline, PipelineBuilder, RequestHandler};
pub use interceptor::{CallInfo, Interceptor, InterceptorChain, TracingInterceptor};
pub use scope::{Scope, ServiceRegistry};
pub use service::{ServiceConfig, ServiceError, ServiceState, WebService};

pub use tokio_util::sync::CancellationToken;
