//! Fixtures shared by the server integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use modrpc_protocol::ModuleError;
use modrpc_server::{DispatchEngine, DispatchTableBuilder, ModuleContract, RequestContext, ServiceRegistry};
use modrpc_transport::{LoopbackRequest, header};
use serde_json::Value;

pub trait Calculator: Send + Sync {
    fn add(&self, a: i32, b: i32) -> i32;
    fn bar(&self) -> String;
    fn reset(&self);
    fn divide(&self, a: i32, b: i32) -> Result<i32, ModuleError>;
    fn context(&self) -> Option<Arc<RequestContext>>;
}

pub struct Basic {
    pub context: Option<Arc<RequestContext>>,
    pub resets: Arc<AtomicUsize>,
}

impl Calculator for Basic {
    fn add(&self, a: i32, b: i32) -> i32 {
        a + b
    }

    fn bar(&self) -> String {
        "bar".into()
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn divide(&self, a: i32, b: i32) -> Result<i32, ModuleError> {
        if b == 0 {
            return Err(ModuleError::new("DivideByZero", "cannot divide by zero")
                .with_data(serde_json::json!({ "dividend": a })));
        }
        Ok(a / b)
    }

    fn context(&self) -> Option<Arc<RequestContext>> {
        self.context.clone()
    }
}

pub const MAX_DOWNLOAD: usize = 64 * 1024;

/// `dyn Calculator`, routed as `IService`.
pub fn calculator_contract() -> ModuleContract<dyn Calculator> {
    let mut contract = ModuleContract::<dyn Calculator>::new();
    contract.alias("IService");

    contract.function("Add", |calc, (a, b): (i32, i32)| Ok(calc.add(a, b)));
    contract.function("Bar", |calc, (): ()| Ok(calc.bar())).alias("Cica");
    contract
        .action("Reset", |calc, (): ()| {
            calc.reset();
            Ok(())
        })
        .ignore();
    contract.action("Clear", |calc, (): ()| {
        calc.reset();
        Ok(())
    });
    contract.function("Divide", |calc, (a, b): (i32, i32)| calc.divide(a, b));
    contract.function("Guarded", |_, (): ()| {
        Err::<(), _>(ModuleError::with_status(403, "no access"))
    });
    contract.function_async("AddLater", |calc, (a, b): (i32, i32)| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok::<_, ModuleError>(calc.add(a, b))
    });
    contract.action_async("Pause", |_, (ms,): (u64,)| async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok::<_, ModuleError>(())
    });
    contract
        .function("Crunch", |_, (n,): (u64,)| {
            std::thread::sleep(Duration::from_millis(20));
            Ok((1..=n).sum::<u64>())
        })
        .long_running();
    contract.binary_async("Download", |_, (len,): (usize,)| async move {
        if len > MAX_DOWNLOAD {
            return Err(ModuleError::new("TooLarge", "download too large"));
        }
        Ok(Bytes::from(vec![0xAB; len]))
    });
    contract.function_async("WaitForCancel", |calc, (): ()| async move {
        let Some(ctx) = calc.context() else {
            return Err(ModuleError::new("NoContext", "no request context"));
        };
        ctx.cancellation.cancelled().await;
        Err::<(), _>(ModuleError::new("Cancelled", "request cancelled"))
    });
    contract.function("Session", |calc, (): ()| {
        Ok(calc.context().and_then(|ctx| ctx.session_id.clone()))
    });
    contract
}

/// Registry resolving a fresh `Basic` per request, wired to the request
/// context when one has been published.
pub fn registry(resets: Arc<AtomicUsize>) -> ServiceRegistry {
    let mut registry = ServiceRegistry::new();
    registry.scoped::<dyn Calculator, _>(move |scope| {
        Arc::new(Basic {
            context: scope.resolve::<RequestContext>(),
            resets: resets.clone(),
        }) as Arc<dyn Calculator>
    });
    registry
}

pub fn engine() -> DispatchEngine {
    let mut builder = DispatchTableBuilder::new();
    builder.register(calculator_contract());
    DispatchEngine::new(builder.build().unwrap())
}

/// `POST /?module=..&method=..` with a JSON argument array.
pub fn call(module: &str, method: &str, args: Value) -> LoopbackRequest {
    LoopbackRequest::post("/rpc")
        .query("module", module)
        .query("method", method)
        .json(&args)
}

pub fn text_call(module: &str, method: &str, content_type: &'static str, body: &'static str) -> LoopbackRequest {
    LoopbackRequest::post("/rpc")
        .query("module", module)
        .query("method", method)
        .header(header::CONTENT_TYPE, content_type)
        .body(body)
}
