//! Dispatch table and engine tests: routing, aliases, payloads, return shapes.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use common::{Calculator, calculator_contract, engine, registry};
use modrpc_protocol::{ModuleError, PayloadError, ReturnShape};
use modrpc_server::{
    ByRef, CallInfo, CallResult, ConfigError, DispatchEngine, DispatchError, DispatchTableBuilder, Interceptor,
    InterceptorChain, ModuleContract, Scope, ServiceRegistry,
};
use serde_json::{Value, json};

fn scope() -> Scope {
    Scope::new(Arc::new(registry(Arc::new(AtomicUsize::new(0)))))
}

async fn invoke(module: &str, method: &str, args: Value) -> Result<CallResult, DispatchError> {
    let payload = serde_json::to_vec(&args).unwrap();
    engine().invoke(&scope(), module, method, &payload).await
}

// ─────────────────────────────────────────────────────────────────────
// Routing
// ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_returns_sum() {
    let result = invoke("IService", "Add", json!([1, 2])).await.unwrap();
    assert_eq!(result, CallResult::Value(json!(3)));
}

#[tokio::test]
async fn unknown_module_is_module_not_found() {
    let err = invoke("Invalid", "Add", json!([1, 2])).await.unwrap_err();
    assert!(matches!(err, DispatchError::ModuleNotFound { ref module } if module == "Invalid"));
    assert!(err.is_client_error());
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let err = invoke("IService", "Subtract", json!([1, 2])).await.unwrap_err();
    assert!(matches!(err, DispatchError::MethodNotFound { .. }));
}

#[tokio::test]
async fn ids_match_case_insensitively() {
    let result = invoke("iservice", "ADD", json!([20, 22])).await.unwrap();
    assert_eq!(result, CallResult::Value(json!(42)));
}

#[tokio::test]
async fn type_name_is_not_routable_once_aliased() {
    let err = invoke("Calculator", "Add", json!([1, 2])).await.unwrap_err();
    assert!(matches!(err, DispatchError::ModuleNotFound { .. }));
}

#[tokio::test]
async fn method_alias_replaces_its_name() {
    let err = invoke("IService", "Bar", json!([])).await.unwrap_err();
    assert!(matches!(err, DispatchError::MethodNotFound { .. }));

    let result = invoke("IService", "Cica", json!([])).await.unwrap();
    assert_eq!(result, CallResult::Value(json!("bar")));
}

#[tokio::test]
async fn ignored_methods_are_unreachable() {
    let err = invoke("IService", "Reset", json!([])).await.unwrap_err();
    assert!(matches!(err, DispatchError::MethodNotFound { .. }));
}

// ─────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn too_few_arguments_is_a_payload_error() {
    let err = invoke("IService", "Add", json!([1])).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Payload(PayloadError::ArgumentCount { expected: 2, actual: 1 })
    ));
    assert!(err.is_client_error());
}

#[tokio::test]
async fn wrong_argument_type_is_a_payload_error() {
    let err = invoke("IService", "Add", json!([1, "two"])).await.unwrap_err();
    assert!(matches!(err, DispatchError::Payload(PayloadError::ArgumentType { index: 1, .. })));
    assert_eq!(err.type_name(), "ArgumentTypeMismatch");
}

#[tokio::test]
async fn non_array_payload_is_malformed() {
    let err = invoke("IService", "Add", json!({ "a": 1 })).await.unwrap_err();
    assert!(matches!(err, DispatchError::Payload(PayloadError::Malformed(_))));
}

#[tokio::test]
async fn empty_body_means_no_arguments() {
    let result = engine().invoke(&scope(), "IService", "Cica", b"").await.unwrap();
    assert_eq!(result, CallResult::Value(json!("bar")));
}

// ─────────────────────────────────────────────────────────────────────
// Return shapes
// ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn void_methods_return_null() {
    let resets = Arc::new(AtomicUsize::new(0));
    let scope = Scope::new(Arc::new(registry(resets.clone())));
    let result = engine().invoke(&scope, "IService", "Clear", b"[]").await.unwrap();
    assert_eq!(result, CallResult::Value(Value::Null));
    assert_eq!(resets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn async_value_is_unwrapped() {
    let result = invoke("IService", "AddLater", json!([2, 3])).await.unwrap();
    assert_eq!(result, CallResult::Value(json!(5)));
}

#[tokio::test]
async fn async_void_returns_null() {
    let result = invoke("IService", "Pause", json!([1])).await.unwrap();
    assert_eq!(result, CallResult::Value(Value::Null));
}

#[tokio::test]
async fn binary_results_are_passed_through() {
    let result = invoke("IService", "Download", json!([4])).await.unwrap();
    assert_eq!(result, CallResult::Binary(Bytes::from(vec![0xAB; 4])));
}

#[tokio::test]
async fn oversized_binary_requests_fail_without_allocating() {
    let err = invoke("IService", "Download", json!([4398046511104_u64])).await.unwrap_err();
    assert_eq!(err.type_name(), "TooLarge");
    assert!(!err.is_client_error());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn long_running_methods_complete() {
    let engine = engine();
    let entry = engine.table().lookup("IService", "Crunch").unwrap();
    assert!(entry.long_running);

    let result = engine.invoke(&scope(), "IService", "Crunch", b"[10]").await.unwrap();
    assert_eq!(result, CallResult::Value(json!(55)));
}

#[tokio::test]
async fn module_errors_keep_type_message_and_data() {
    let err = invoke("IService", "Divide", json!([1, 0])).await.unwrap_err();
    let DispatchError::Module(module_err) = &err else {
        panic!("expected a module error, got {err:?}");
    };
    assert_eq!(module_err.type_name, "DivideByZero");

    let exception = err.to_exception();
    assert_eq!(exception.type_name, "DivideByZero");
    assert_eq!(exception.message, "cannot divide by zero");
    assert_eq!(exception.data, json!({ "dividend": 1 }));
}

#[tokio::test]
async fn missing_implementation_is_reported() {
    let scope = Scope::new(Arc::new(ServiceRegistry::new()));
    let err = engine().invoke(&scope, "IService", "Add", b"[1, 2]").await.unwrap_err();
    assert!(matches!(err, DispatchError::ImplementationMissing { .. }));
    assert!(!err.is_client_error());
}

#[tokio::test]
async fn one_instance_is_resolved_per_call() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let mut registry = ServiceRegistry::new();
    registry.scoped::<dyn Calculator, _>(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Arc::new(common::Basic {
            context: None,
            resets: Arc::new(AtomicUsize::new(0)),
        }) as Arc<dyn Calculator>
    });
    let registry = Arc::new(registry);
    let engine = engine();

    for _ in 0..3 {
        let scope = Scope::new(registry.clone());
        engine.invoke(&scope, "IService", "Add", b"[1, 1]").await.unwrap();
    }
    assert_eq!(created.load(Ordering::SeqCst), 3);
}

// ─────────────────────────────────────────────────────────────────────
// Table building
// ─────────────────────────────────────────────────────────────────────

#[test]
fn by_ref_parameters_fail_the_build() {
    let mut contract = ModuleContract::<dyn Calculator>::new();
    contract.function("Swap", |_, (_a, _b): (ByRef<i32>, i32)| Ok(0));

    let mut builder = DispatchTableBuilder::new();
    builder.register(contract);
    let err = builder.build().unwrap_err();
    assert_eq!(
        err,
        ConfigError::ByRefParameter {
            module: "Calculator".into(),
            method: "Swap".into(),
            index: 0
        }
    );
}

#[test]
fn ignored_by_ref_methods_do_not_fail_the_build() {
    let mut contract = ModuleContract::<dyn Calculator>::new();
    contract.action("Swap", |_, (_a,): (ByRef<i32>,)| Ok(())).ignore();
    contract.function("Add", |calc, (a, b): (i32, i32)| Ok(calc.add(a, b)));

    let mut builder = DispatchTableBuilder::new();
    builder.register(contract);
    assert_eq!(builder.build().unwrap().len(), 1);
}

trait Repository<T>: Send + Sync {
    fn count(&self) -> usize;
}

#[test]
fn generic_contracts_need_an_alias() {
    let mut contract = ModuleContract::<dyn Repository<u32>>::new();
    contract.function("Count", |repo, (): ()| Ok(repo.count()));
    let mut builder = DispatchTableBuilder::new();
    builder.register(contract);
    assert!(matches!(builder.build(), Err(ConfigError::GenericContract { .. })));

    let mut contract = ModuleContract::<dyn Repository<u32>>::new();
    contract.alias("Numbers");
    contract.function("Count", |repo, (): ()| Ok(repo.count()));
    let mut builder = DispatchTableBuilder::new();
    builder.register(contract);
    let table = builder.build().unwrap();
    assert_eq!(table.module_ids(), ["Numbers"]);
}

#[test]
fn method_ids_must_be_unique_ignoring_case() {
    let mut contract = ModuleContract::<dyn Calculator>::new();
    contract.function("Add", |calc, (a, b): (i32, i32)| Ok(calc.add(a, b)));
    contract.function("Plus", |calc, (a, b): (i32, i32)| Ok(calc.add(a, b))).alias("ADD");

    let mut builder = DispatchTableBuilder::new();
    builder.register(contract);
    assert!(matches!(builder.build(), Err(ConfigError::DuplicateMethod { .. })));
}

#[test]
fn module_ids_must_be_unique() {
    let mut builder = DispatchTableBuilder::new();
    builder.register(calculator_contract());
    let mut other = ModuleContract::<dyn Repository<u8>>::new();
    other.alias("iservice");
    builder.register(other);
    assert!(matches!(builder.build(), Err(ConfigError::DuplicateModule { .. })));
}

#[test]
fn build_runs_once() {
    let mut builder = DispatchTableBuilder::new();
    builder.register(calculator_contract());
    assert!(builder.build().is_ok());
    assert_eq!(builder.build().unwrap_err(), ConfigError::AlreadyBuilt);
}

trait Shape: Send + Sync {
    fn name(&self) -> String;
    fn area(&self) -> f64;
}

fn named() -> ModuleContract<dyn Shape> {
    let mut base = ModuleContract::<dyn Shape>::interface("INamed");
    base.function("Name", |shape, (): ()| Ok(shape.name()));
    base
}

#[test]
fn diamond_hierarchies_yield_each_method_once() {
    let mut left = ModuleContract::<dyn Shape>::interface("ILeft");
    left.extend(named());
    let mut right = ModuleContract::<dyn Shape>::interface("IRight");
    right.extend(named());
    right.function("Area", |shape, (): ()| Ok(shape.area()));

    let mut shape = ModuleContract::<dyn Shape>::new();
    shape.extend(left).extend(right);

    let mut builder = DispatchTableBuilder::new();
    builder.register(shape);
    let table = builder.build().unwrap();

    assert_eq!(table.len(), 2);
    let descriptor = table.descriptor("shape").unwrap();
    assert_eq!(descriptor.module, "Shape");
    let mut ids: Vec<_> = descriptor.methods.iter().map(|m| m.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["Area", "Name"]);
}

#[test]
fn descriptors_list_effective_ids_and_shapes() {
    let engine = engine();
    let descriptor = engine.table().descriptor("IService").unwrap();

    let bar = descriptor.method("cica").unwrap();
    assert_eq!(bar.name, "Bar");
    assert_eq!(bar.returns, ReturnShape::Value);
    assert!(descriptor.method("Reset").is_none());

    let add = descriptor.method("Add").unwrap();
    assert_eq!(add.parameters, ["i32", "i32"]);
    assert_eq!(descriptor.method("AddLater").unwrap().returns, ReturnShape::AsyncValue);
    assert_eq!(descriptor.method("Pause").unwrap().returns, ReturnShape::AsyncNone);
    assert_eq!(descriptor.method("Download").unwrap().returns, ReturnShape::Binary);
    assert!(descriptor.method("Crunch").unwrap().long_running);
}

// ─────────────────────────────────────────────────────────────────────
// Interceptors
// ─────────────────────────────────────────────────────────────────────

struct Recorder {
    label: &'static str,
    priority: i32,
    log: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl Interceptor for Recorder {
    async fn before(&self, call: &CallInfo<'_>) -> Result<(), ModuleError> {
        self.log.lock().push(format!("{}:before:{}", self.label, call.method));
        Ok(())
    }

    async fn after(&self, call: &CallInfo<'_>, outcome: &Result<CallResult, ModuleError>) {
        self.log
            .lock()
            .push(format!("{}:after:{}:{}", self.label, call.method, outcome.is_ok()));
    }

    fn name(&self) -> &str {
        self.label
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

struct DenyDivide;

impl Interceptor for DenyDivide {
    async fn before(&self, call: &CallInfo<'_>) -> Result<(), ModuleError> {
        if call.method == "Divide" {
            return Err(ModuleError::new("Unauthorized", "divide is not allowed"));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "deny-divide"
    }
}

fn intercepted(chain: InterceptorChain) -> DispatchEngine {
    let mut builder = DispatchTableBuilder::new();
    builder.register(calculator_contract());
    DispatchEngine::with_interceptors(builder.build().unwrap(), chain)
}

#[tokio::test]
async fn interceptors_run_in_priority_order_and_unwind_in_reverse() {
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut chain = InterceptorChain::new();
    chain.add(Recorder {
        label: "inner",
        priority: 10,
        log: log.clone(),
    });
    chain.add(Recorder {
        label: "outer",
        priority: -10,
        log: log.clone(),
    });
    assert_eq!(chain.names(), ["outer", "inner"]);

    let engine = intercepted(chain);
    engine.invoke(&scope(), "IService", "Add", b"[1, 2]").await.unwrap();

    assert_eq!(
        *log.lock(),
        [
            "outer:before:Add",
            "inner:before:Add",
            "inner:after:Add:true",
            "outer:after:Add:true",
        ]
    );
}

#[tokio::test]
async fn interceptors_can_reject_calls() {
    let mut chain = InterceptorChain::new();
    chain.add(DenyDivide);
    let engine = intercepted(chain);

    let err = engine.invoke(&scope(), "IService", "Divide", b"[4, 2]").await.unwrap_err();
    assert_eq!(err.type_name(), "Unauthorized");

    let ok = engine.invoke(&scope(), "IService", "Add", b"[4, 2]").await.unwrap();
    assert_eq!(ok, CallResult::Value(json!(6)));
}

#[tokio::test]
async fn rejected_calls_unwind_interceptors_that_already_ran() {
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut chain = InterceptorChain::new();
    chain.add(Recorder {
        label: "outer",
        priority: -10,
        log: log.clone(),
    });
    chain.add(DenyDivide);
    chain.add(Recorder {
        label: "inner",
        priority: 10,
        log: log.clone(),
    });
    let engine = intercepted(chain);

    let err = engine.invoke(&scope(), "IService", "Divide", b"[4, 2]").await.unwrap_err();
    assert_eq!(err.type_name(), "Unauthorized");
    assert_eq!(*log.lock(), ["outer:before:Divide", "outer:after:Divide:false"]);
}
