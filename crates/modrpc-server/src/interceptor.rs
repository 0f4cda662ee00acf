//! Call interceptors around bound module calls.
//!
//! Interceptors compose cross-cutting concerns (logging, validation, role
//! checks) around each call. They run in priority order before the call and
//! in reverse order after it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use modrpc_protocol::ModuleError;
use tracing::{debug, warn};

use crate::dispatch::CallResult;
use crate::scope::Scope;

/// The call being intercepted.
#[derive(Debug, Clone, Copy)]
pub struct CallInfo<'a> {
    pub module: &'a str,
    pub method: &'a str,
    pub scope: &'a Scope,
}

/// Trait for call interceptors.
pub trait Interceptor: Send + Sync {
    /// Runs before the call. Returning an error rejects the call; the error
    /// is rendered like one thrown by the module.
    fn before(&self, _call: &CallInfo<'_>) -> impl Future<Output = Result<(), ModuleError>> + Send {
        async { Ok(()) }
    }

    /// Observes the outcome once the call completed.
    fn after(
        &self,
        _call: &CallInfo<'_>,
        _outcome: &Result<CallResult, ModuleError>,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Interceptor name for debugging.
    fn name(&self) -> &str;

    /// Priority (lower runs first).
    fn priority(&self) -> i32 {
        0
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of Interceptor; all refs share lifetime `'a`.
trait InterceptorDyn: Send + Sync {
    fn before_dyn<'a>(&'a self, call: &'a CallInfo<'a>) -> BoxFuture<'a, Result<(), ModuleError>>;

    fn after_dyn<'a>(
        &'a self,
        call: &'a CallInfo<'a>,
        outcome: &'a Result<CallResult, ModuleError>,
    ) -> BoxFuture<'a, ()>;

    fn name_dyn(&self) -> &str;
    fn priority_dyn(&self) -> i32;
}

impl<T: Interceptor> InterceptorDyn for T {
    fn before_dyn<'a>(&'a self, call: &'a CallInfo<'a>) -> BoxFuture<'a, Result<(), ModuleError>> {
        Box::pin(self.before(call))
    }

    fn after_dyn<'a>(
        &'a self,
        call: &'a CallInfo<'a>,
        outcome: &'a Result<CallResult, ModuleError>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.after(call, outcome))
    }

    fn name_dyn(&self) -> &str {
        self.name()
    }

    fn priority_dyn(&self) -> i32 {
        self.priority()
    }
}

/// Interceptors executed in priority order.
#[derive(Default)]
pub struct InterceptorChain {
    interceptors: Vec<Box<dyn InterceptorDyn>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<I: Interceptor + 'static>(&mut self, interceptor: I) -> &mut Self {
        self.interceptors.push(Box::new(interceptor));
        self.interceptors.sort_by_key(|i| i.priority_dyn());
        self
    }

    /// Stops at the first interceptor that rejects the call. Interceptors
    /// whose `before` already completed see the rejection in `after`.
    pub async fn run_before(&self, call: &CallInfo<'_>) -> Result<(), ModuleError> {
        for (index, interceptor) in self.interceptors.iter().enumerate() {
            if let Err(e) = interceptor.before_dyn(call).await {
                debug!("Call {}.{} rejected by {}", call.module, call.method, interceptor.name_dyn());
                let outcome: Result<CallResult, ModuleError> = Err(e);
                for entered in self.interceptors[..index].iter().rev() {
                    entered.after_dyn(call, &outcome).await;
                }
                return outcome.map(|_| ());
            }
        }
        Ok(())
    }

    pub async fn run_after(&self, call: &CallInfo<'_>, outcome: &Result<CallResult, ModuleError>) {
        for interceptor in self.interceptors.iter().rev() {
            interceptor.after_dyn(call, outcome).await;
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.interceptors.iter().map(|i| i.name_dyn()).collect()
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

// ─── Built-in interceptors ───────────────────────────────────────────────

/// Logs every call and how long it took.
#[derive(Debug, Default)]
pub struct TracingInterceptor;

/// When the current call passed the tracing interceptor.
struct CallStarted(Instant);

impl Interceptor for TracingInterceptor {
    fn before(&self, call: &CallInfo<'_>) -> impl Future<Output = Result<(), ModuleError>> + Send {
        debug!(scope = %call.scope.id(), "-> {}.{}", call.module, call.method);
        call.scope.provide(Arc::new(CallStarted(Instant::now())));
        async { Ok(()) }
    }

    fn after(
        &self,
        call: &CallInfo<'_>,
        outcome: &Result<CallResult, ModuleError>,
    ) -> impl Future<Output = ()> + Send {
        let elapsed = call
            .scope
            .resolve::<CallStarted>()
            .map(|started| started.0.elapsed())
            .unwrap_or_default();
        match outcome {
            Ok(_) => debug!(scope = %call.scope.id(), "<- {}.{} ({:?})", call.module, call.method, elapsed),
            Err(e) => warn!(
                scope = %call.scope.id(),
                "<- {}.{} failed after {:?}: {}", call.module, call.method, elapsed, e
            ),
        }
        async {}
    }

    fn name(&self) -> &str {
        "tracing"
    }

    fn priority(&self) -> i32 {
        i32::MIN
    }
}
