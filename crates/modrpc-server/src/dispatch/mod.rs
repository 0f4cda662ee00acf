//! Module dispatch.
//!
//! [`ModuleContract`]s describe modules; a [`DispatchTableBuilder`] compiles
//! them once into an immutable [`DispatchTable`]; the [`DispatchEngine`]
//! routes each call through that table.

mod contract;
mod engine;
mod params;
mod table;

pub use contract::{CallFuture, MethodDecl, ModuleContract};
pub use engine::{CallResult, DispatchEngine, DispatchError};
pub use params::{ByRef, Param, ParamInfo, Params};
pub use table::{ConfigError, DispatchTable, DispatchTableBuilder, MethodEntry};
