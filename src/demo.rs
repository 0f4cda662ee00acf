//! Demo modules served by the `modrpc` binary.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use modrpc_protocol::ModuleError;
use modrpc_server::{ModuleContract, RequestContext, ServiceRegistry};
use serde::{Deserialize, Serialize};

/// Arithmetic over JSON numbers.
pub trait Calculator: Send + Sync {
    fn add(&self, a: f64, b: f64) -> f64;
    fn divide(&self, a: f64, b: f64) -> Result<f64, ModuleError>;
    fn stats(&self, values: &[f64]) -> Stats;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub count: usize,
    pub sum: f64,
    pub mean: Option<f64>,
}

#[derive(Debug, Default)]
pub struct BasicCalculator;

impl Calculator for BasicCalculator {
    fn add(&self, a: f64, b: f64) -> f64 {
        a + b
    }

    fn divide(&self, a: f64, b: f64) -> Result<f64, ModuleError> {
        if b == 0.0 {
            return Err(ModuleError::new("DivideByZero", "division by zero")
                .with_data(serde_json::json!({ "dividend": a })));
        }
        Ok(a / b)
    }

    fn stats(&self, values: &[f64]) -> Stats {
        let sum: f64 = values.iter().sum();
        Stats {
            count: values.len(),
            sum,
            mean: (!values.is_empty()).then(|| sum / values.len() as f64),
        }
    }
}

pub fn calculator_contract() -> ModuleContract<dyn Calculator> {
    let mut contract = ModuleContract::<dyn Calculator>::new();
    contract.function("Add", |calc, (a, b): (f64, f64)| Ok(calc.add(a, b)));
    contract.function("Divide", |calc, (a, b): (f64, f64)| calc.divide(a, b));
    contract.function("Stats", |calc, (values,): (Vec<f64>,)| Ok(calc.stats(&values)));
    contract
}

/// Largest payload `Session.Bytes` will generate.
pub const MAX_BYTES_LEN: usize = 16 * 1024 * 1024;

/// Request-scoped helpers that read the caller's context.
pub trait Session: Send + Sync {
    fn context(&self) -> Option<&RequestContext>;
}

struct ScopedSession {
    context: Option<Arc<RequestContext>>,
}

impl Session for ScopedSession {
    fn context(&self) -> Option<&RequestContext> {
        self.context.as_deref()
    }
}

#[derive(Debug, Serialize)]
struct Caller {
    session: Option<String>,
    remote: String,
    user_agent: Option<String>,
}

pub fn session_contract() -> ModuleContract<dyn Session> {
    let mut contract = ModuleContract::<dyn Session>::new();
    contract.function("WhoAmI", |session, (): ()| {
        let ctx = session
            .context()
            .ok_or_else(|| ModuleError::new("NoContext", "not called over RPC"))?;
        Ok(Caller {
            session: ctx.session_id.clone(),
            remote: ctx.remote().to_string(),
            user_agent: ctx.head().header("user-agent").map(str::to_string),
        })
    });
    contract
        .action_async("Sleep", |session, (ms,): (u64,)| async move {
            let Some(ctx) = session.context() else {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                return Ok(());
            };
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(()),
                _ = ctx.cancellation.cancelled() => {
                    Err(ModuleError::new("Cancelled", "sleep interrupted"))
                }
            }
        })
        .long_running();
    contract.binary_async("Bytes", |_, (len,): (usize,)| async move {
        if len > MAX_BYTES_LEN {
            return Err(ModuleError::new("TooLarge", format!("at most {MAX_BYTES_LEN} bytes per call"))
                .with_data(serde_json::json!({ "requested": len, "limit": MAX_BYTES_LEN })));
        }
        Ok(Bytes::from((0..len).map(|i| (i % 256) as u8).collect::<Vec<_>>()))
    });
    contract
}

/// Register the demo implementations.
pub fn register(registry: &mut ServiceRegistry) {
    registry.singleton::<dyn Calculator>(Arc::new(BasicCalculator));
    registry.scoped::<dyn Session, _>(|scope| {
        Arc::new(ScopedSession {
            context: scope.resolve::<RequestContext>(),
        }) as Arc<dyn Session>
    });
}
