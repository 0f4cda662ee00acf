//! Dispatch table: `(module id, method id)` to bound call procedure.
//!
//! Built once by a [`DispatchTableBuilder`] and read-only afterwards, so
//! workers share it behind an `Arc` without locking.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use modrpc_protocol::error::short_type_name;
use modrpc_protocol::{MethodDescriptor, ModuleDescriptor, ReturnShape};
use serde_json::Value;
use tracing::{debug, info};

use super::contract::{CallFuture, MethodDecl, ModuleContract};
use super::engine::DispatchError;
use crate::scope::Scope;

/// Problems with the registered contracts. Always fatal to startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("generic contract {contract} needs an explicit alias")]
    GenericContract { contract: String },

    #[error("{module}.{method}: parameter {index} is passed by reference")]
    ByRefParameter {
        module: String,
        method: String,
        index: usize,
    },

    #[error("{module}: method id {method} is declared more than once")]
    DuplicateMethod { module: String, method: String },

    #[error("module id {module} is registered more than once")]
    DuplicateModule { module: String },

    #[error("{contract}: empty {what} id")]
    InvalidId { contract: String, what: &'static str },

    #[error("dispatch table has already been built")]
    AlreadyBuilt,
}

type Procedure = Arc<dyn Fn(&Scope, Vec<Value>) -> Result<CallFuture, DispatchError> + Send + Sync>;

/// One routable method.
pub struct MethodEntry {
    pub module_id: String,
    pub id: String,
    pub name: String,
    pub parameters: Vec<String>,
    pub returns: ReturnShape,
    pub long_running: bool,
    procedure: Procedure,
}

impl MethodEntry {
    /// Decode `args`, resolve the implementation from `scope` and return the
    /// call, not yet started.
    pub fn bind(&self, scope: &Scope, args: Vec<Value>) -> Result<CallFuture, DispatchError> {
        (self.procedure)(scope, args)
    }
}

impl std::fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodEntry")
            .field("module_id", &self.module_id)
            .field("id", &self.id)
            .field("parameters", &self.parameters)
            .field("returns", &self.returns)
            .field("long_running", &self.long_running)
            .finish()
    }
}

struct ModuleEntry {
    id: String,
    methods: HashMap<String, MethodEntry>,
    descriptor: ModuleDescriptor,
}

/// Type-erased contract awaiting compilation.
trait CompileContract: Send {
    fn compile(self: Box<Self>) -> Result<ModuleEntry, ConfigError>;
}

impl<T> CompileContract for ModuleContract<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    fn compile(self: Box<Self>) -> Result<ModuleEntry, ConfigError> {
        let contract = *self;
        let type_name = short_type_name(contract.type_name);
        if contract.alias.is_none() && contract.is_generic() {
            return Err(ConfigError::GenericContract { contract: type_name });
        }
        let module_id = contract.id().to_string();
        if module_id.trim().is_empty() {
            return Err(ConfigError::InvalidId {
                contract: type_name,
                what: "module",
            });
        }

        let mut decls = Vec::new();
        flatten(contract, &mut HashSet::new(), &mut decls);

        let mut methods = HashMap::new();
        let mut descriptors = Vec::new();
        for decl in decls.into_iter().filter(|d| !d.ignored) {
            if let Some(index) = decl.parameters.iter().position(|p| p.by_ref) {
                return Err(ConfigError::ByRefParameter {
                    module: module_id,
                    method: decl.name,
                    index,
                });
            }
            let id = decl.id().to_string();
            if id.trim().is_empty() {
                return Err(ConfigError::InvalidId {
                    contract: format!("{module_id}.{}", decl.name),
                    what: "method",
                });
            }
            let key = id.to_lowercase();
            if methods.contains_key(&key) {
                return Err(ConfigError::DuplicateMethod {
                    module: module_id,
                    method: id,
                });
            }

            let entry = bind_method::<T>(&module_id, id, decl);
            descriptors.push(MethodDescriptor {
                name: entry.name.clone(),
                id: entry.id.clone(),
                parameters: entry.parameters.clone(),
                returns: entry.returns,
                long_running: entry.long_running,
            });
            methods.insert(key, entry);
        }

        Ok(ModuleEntry {
            descriptor: ModuleDescriptor {
                module: module_id.clone(),
                methods: descriptors,
            },
            id: module_id,
            methods,
        })
    }
}

/// Collect the methods of `contract` and its bases, visiting each interface
/// once even when it is reachable through several paths.
fn flatten<T: ?Sized>(
    contract: ModuleContract<T>,
    visited: &mut HashSet<String>,
    out: &mut Vec<MethodDecl<T>>,
) {
    if !visited.insert(contract.interface.clone()) {
        return;
    }
    out.extend(contract.methods);
    for base in contract.bases {
        flatten(base, visited, out);
    }
}

fn bind_method<T>(module_id: &str, id: String, decl: MethodDecl<T>) -> MethodEntry
where
    T: ?Sized + Send + Sync + 'static,
{
    let prepare = decl.prepare;
    let module = module_id.to_string();
    let procedure: Procedure = Arc::new(
        move |scope: &Scope, args: Vec<Value>| -> Result<CallFuture, DispatchError> {
            let call = prepare(args)?;
            let instance = scope
                .resolve::<T>()
                .ok_or_else(|| DispatchError::ImplementationMissing {
                    module: module.clone(),
                })?;
            Ok(call(instance))
        },
    );

    MethodEntry {
        module_id: module_id.to_string(),
        id,
        name: decl.name,
        parameters: decl.parameters.into_iter().map(|p| p.type_name).collect(),
        returns: decl.returns,
        long_running: decl.long_running,
        procedure,
    }
}

// ─── Builder ─────────────────────────────────────────────────────────────

/// Collects contracts at configuration time.
#[derive(Default)]
pub struct DispatchTableBuilder {
    contracts: Vec<Box<dyn CompileContract>>,
    built: bool,
}

impl DispatchTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, contract: ModuleContract<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        debug!("Registering module contract: {}", contract.id());
        self.contracts.push(Box::new(contract));
        self
    }

    /// Compile every registered contract. May be called once per builder.
    pub fn build(&mut self) -> Result<DispatchTable, ConfigError> {
        if self.built {
            return Err(ConfigError::AlreadyBuilt);
        }
        self.built = true;

        let mut modules = HashMap::new();
        for contract in std::mem::take(&mut self.contracts) {
            let module = contract.compile()?;
            let key = module.id.to_lowercase();
            if modules.contains_key(&key) {
                return Err(ConfigError::DuplicateModule { module: module.id });
            }
            modules.insert(key, module);
        }

        let table = DispatchTable { modules };
        info!(
            "Dispatch table built ({} modules, {} methods)",
            table.modules.len(),
            table.len()
        );
        Ok(table)
    }
}

// ─── Table ───────────────────────────────────────────────────────────────

/// Immutable routing table. Ids match case-insensitively.
pub struct DispatchTable {
    modules: HashMap<String, ModuleEntry>,
}

impl DispatchTable {
    pub fn lookup(&self, module: &str, method: &str) -> Result<&MethodEntry, DispatchError> {
        let entry = self
            .modules
            .get(&module.to_lowercase())
            .ok_or_else(|| DispatchError::ModuleNotFound {
                module: module.to_string(),
            })?;
        entry
            .methods
            .get(&method.to_lowercase())
            .ok_or_else(|| DispatchError::MethodNotFound {
                module: entry.id.clone(),
                method: method.to_string(),
            })
    }

    pub fn descriptor(&self, module: &str) -> Option<&ModuleDescriptor> {
        self.modules
            .get(&module.to_lowercase())
            .map(|m| &m.descriptor)
    }

    /// Effective ids of every module, sorted.
    pub fn module_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.modules.values().map(|m| m.id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of routable methods across all modules.
    pub fn len(&self) -> usize {
        self.modules.values().map(|m| m.methods.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("modules", &self.module_ids())
            .finish()
    }
}
