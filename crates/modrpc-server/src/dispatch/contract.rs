//! Module contracts: explicit declarations of a module's callable methods.
//!
//! A contract is declared over the type its implementation is resolved as,
//! normally a trait object:
//!
//! ```ignore
//! let mut contract = ModuleContract::<dyn Calculator>::new();
//! contract.function("Add", |calc, (a, b): (i32, i32)| Ok(calc.add(a, b)));
//! contract.function("Bar", |calc, (): ()| Ok(calc.bar())).alias("Cica");
//! contract.action("Reset", |calc, (): ()| calc.reset()).ignore();
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use modrpc_protocol::error::short_type_name;
use modrpc_protocol::{ModuleError, PayloadError, ReturnShape};
use serde::Serialize;
use serde_json::Value;

use super::engine::CallResult;
use super::params::{ParamInfo, Params};

/// A bound call, ready to run.
pub type CallFuture = Pin<Box<dyn Future<Output = Result<CallResult, ModuleError>> + Send>>;

pub(crate) type PreparedCall<T> = Box<dyn FnOnce(Arc<T>) -> CallFuture + Send>;

/// Decodes the argument list and returns the call awaiting its instance.
pub(crate) type Preparer<T> =
    Arc<dyn Fn(Vec<Value>) -> Result<PreparedCall<T>, PayloadError> + Send + Sync>;

/// One declared method.
pub struct MethodDecl<T: ?Sized> {
    pub(crate) name: String,
    pub(crate) alias: Option<String>,
    pub(crate) ignored: bool,
    pub(crate) long_running: bool,
    pub(crate) parameters: Vec<ParamInfo>,
    pub(crate) returns: ReturnShape,
    pub(crate) prepare: Preparer<T>,
}

impl<T: ?Sized> MethodDecl<T> {
    /// Route this method under `alias` instead of its name.
    pub fn alias(&mut self, alias: impl Into<String>) -> &mut Self {
        self.alias = Some(alias.into());
        self
    }

    /// Exclude this method from the dispatch table.
    pub fn ignore(&mut self) -> &mut Self {
        self.ignored = true;
        self
    }

    /// Run calls to this method off the shared worker threads.
    pub fn long_running(&mut self) -> &mut Self {
        self.long_running = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective method id.
    pub fn id(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// The declared methods of a module (or of a base interface it extends).
pub struct ModuleContract<T: ?Sized> {
    pub(crate) interface: String,
    pub(crate) type_name: &'static str,
    pub(crate) alias: Option<String>,
    pub(crate) methods: Vec<MethodDecl<T>>,
    pub(crate) bases: Vec<ModuleContract<T>>,
}

impl<T> ModuleContract<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    /// A contract named after `T`: `dyn my::Calculator` is named `Calculator`.
    pub fn new() -> Self {
        let type_name = std::any::type_name::<T>();
        Self {
            interface: interface_name(type_name),
            type_name,
            alias: None,
            methods: Vec::new(),
            bases: Vec::new(),
        }
    }

    /// A named base interface, to be merged into a module with [`extend`].
    ///
    /// Interfaces are identified by name: a base reached through several
    /// paths contributes its methods once.
    ///
    /// [`extend`]: ModuleContract::extend
    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            interface: name.into(),
            type_name: std::any::type_name::<T>(),
            alias: None,
            methods: Vec::new(),
            bases: Vec::new(),
        }
    }

    /// Route this module under `alias` instead of its type name.
    pub fn alias(&mut self, alias: impl Into<String>) -> &mut Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn extend(&mut self, base: ModuleContract<T>) -> &mut Self {
        self.bases.push(base);
        self
    }

    /// Effective module id.
    pub fn id(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.interface)
    }

    /// Generic contracts have no stable name of their own.
    pub fn is_generic(&self) -> bool {
        self.interface.contains('<')
    }

    /// Synchronous method returning nothing.
    pub fn action<P, F>(&mut self, name: impl Into<String>, f: F) -> &mut MethodDecl<T>
    where
        P: Params,
        F: Fn(&T, P) -> Result<(), ModuleError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.declare::<P, _>(name, ReturnShape::None, move |params| {
            let f = f.clone();
            Box::new(move |instance: Arc<T>| -> CallFuture {
                Box::pin(async move {
                    f(&*instance, params)?;
                    Ok(CallResult::Value(Value::Null))
                })
            })
        })
    }

    /// Synchronous method returning a value.
    pub fn function<P, R, F>(&mut self, name: impl Into<String>, f: F) -> &mut MethodDecl<T>
    where
        P: Params,
        R: Serialize + 'static,
        F: Fn(&T, P) -> Result<R, ModuleError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.declare::<P, _>(name, ReturnShape::Value, move |params| {
            let f = f.clone();
            Box::new(move |instance: Arc<T>| -> CallFuture {
                Box::pin(async move {
                    let value = f(&*instance, params)?;
                    Ok(CallResult::Value(serde_json::to_value(value)?))
                })
            })
        })
    }

    /// Asynchronous method returning nothing.
    pub fn action_async<P, F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut MethodDecl<T>
    where
        P: Params,
        F: Fn(Arc<T>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ModuleError>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.declare::<P, _>(name, ReturnShape::AsyncNone, move |params| {
            let f = f.clone();
            Box::new(move |instance: Arc<T>| -> CallFuture {
                Box::pin(async move {
                    f(instance, params).await?;
                    Ok(CallResult::Value(Value::Null))
                })
            })
        })
    }

    /// Asynchronous method returning a value.
    pub fn function_async<P, R, F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut MethodDecl<T>
    where
        P: Params,
        R: Serialize + 'static,
        F: Fn(Arc<T>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ModuleError>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.declare::<P, _>(name, ReturnShape::AsyncValue, move |params| {
            let f = f.clone();
            Box::new(move |instance: Arc<T>| -> CallFuture {
                Box::pin(async move {
                    let value = f(instance, params).await?;
                    Ok(CallResult::Value(serde_json::to_value(value)?))
                })
            })
        })
    }

    /// Asynchronous method whose result is sent as a raw byte stream.
    pub fn binary_async<P, F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut MethodDecl<T>
    where
        P: Params,
        F: Fn(Arc<T>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes, ModuleError>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.declare::<P, _>(name, ReturnShape::Binary, move |params| {
            let f = f.clone();
            Box::new(move |instance: Arc<T>| -> CallFuture {
                Box::pin(async move { Ok(CallResult::Binary(f(instance, params).await?)) })
            })
        })
    }

    fn declare<P, B>(&mut self, name: impl Into<String>, returns: ReturnShape, bind: B) -> &mut MethodDecl<T>
    where
        P: Params,
        B: Fn(P) -> PreparedCall<T> + Send + Sync + 'static,
    {
        let prepare: Preparer<T> = Arc::new(move |args: Vec<Value>| P::from_args(args).map(&bind));
        self.methods.push(MethodDecl {
            name: name.into(),
            alias: None,
            ignored: false,
            long_running: false,
            parameters: P::describe(),
            returns,
            prepare,
        });
        let last = self.methods.len() - 1;
        &mut self.methods[last]
    }
}

impl<T> Default for ModuleContract<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// `dyn api::Calculator + Send + Sync` -> `Calculator`.
fn interface_name(type_name: &str) -> String {
    let short = short_type_name(type_name);
    let short = short.strip_prefix("dyn ").unwrap_or(&short);
    short.split(" + ").next().unwrap_or(short).to_string()
}
