//! Builtin operators and their registry.
//!
//! The registry maps builtin names to their configuration: port
//! definitions, the worker function, an optional property function and an
//! optional connect hook. It is populated once at first use and read-only
//! afterwards; tests that need isolation construct their own
//! [`BuiltinRegistry`] instead of going through the global.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::core::definition::{InstanceDef, OperatorDef};
use crate::core::error::{BuildError, Error, PortError, SyncError};
use crate::core::operator::{ConnectHookFn, Operator, PropertyFn, WorkerFn};

mod ctrl_aggregate;
mod ctrl_fork;
mod ctrl_loop;
mod ctrl_merge;
mod eval;
pub mod expr;
mod files_read;
mod time_delay;

/// Everything the runtime knows about one builtin operator.
pub struct BuiltinConfig {
    pub def: OperatorDef,
    pub worker: WorkerFn,
    pub property_fn: Option<PropertyFn>,
    pub connect_hook: Option<ConnectHookFn>,
}

/// Name to builtin configuration table.
pub struct BuiltinRegistry {
    cfgs: HashMap<String, Arc<BuiltinConfig>>,
}

impl BuiltinRegistry {
    /// An empty registry.
    pub fn new() -> BuiltinRegistry {
        BuiltinRegistry {
            cfgs: HashMap::new(),
        }
    }

    /// A registry holding every builtin this crate ships.
    pub fn with_builtins() -> BuiltinRegistry {
        let mut registry = BuiltinRegistry::new();
        registry.register("fork", ctrl_fork::config());
        registry.register("merge", ctrl_merge::config());
        registry.register("loop", ctrl_loop::config());
        registry.register("aggregate", ctrl_aggregate::config());
        registry.register("eval", eval::config());
        registry.register("slang.time.delay", time_delay::config());
        registry.register("slang.files.read", files_read::config());
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, cfg: BuiltinConfig) {
        let name = name.into();
        if self.cfgs.insert(name.clone(), Arc::new(cfg)).is_some() {
            tracing::warn!(builtin = %name, "builtin registered twice, keeping the newer one");
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.cfgs.contains_key(name)
    }

    pub fn config(&self, name: &str) -> Option<Arc<BuiltinConfig>> {
        self.cfgs.get(name).cloned()
    }

    pub fn operator_def(&self, name: &str) -> Option<OperatorDef> {
        self.cfgs.get(name).map(|cfg| cfg.def.clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cfgs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiates a builtin: applies the instance's generic substitutions
    /// to the builtin's port definitions, allocates the operator and runs
    /// the property function.
    pub fn make_operator(&self, def: &InstanceDef) -> Result<Operator, BuildError> {
        let cfg = self
            .config(&def.operator)
            .ok_or_else(|| BuildError::UnknownOperator(def.operator.clone()))?;
        let op_def = cfg.def.specify_generics(&def.generics)?;
        let name = if def.name.is_empty() {
            &def.operator
        } else {
            &def.name
        };
        let op = Operator::new(name, Some(cfg.worker), cfg.connect_hook, &op_def)?;
        op.set_properties(def.properties.clone());
        if let Some(property_fn) = cfg.property_fn {
            property_fn(&op, &def.properties)?;
        }
        Ok(op)
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        BuiltinRegistry::with_builtins()
    }
}

static REGISTRY: OnceLock<BuiltinRegistry> = OnceLock::new();

/// The process-wide builtin registry, populated on first access.
pub fn registry() -> &'static BuiltinRegistry {
    REGISTRY.get_or_init(BuiltinRegistry::with_builtins)
}

/// Instantiates a builtin through the process-wide registry.
pub fn make_operator(def: &InstanceDef) -> Result<Operator, BuildError> {
    registry().make_operator(def)
}

/// Runs a builtin worker body, treating closed ports and cancelled
/// synchronizers as the normal shutdown path.
pub(crate) fn run_worker(op: Operator, run: fn(&Operator) -> crate::core::Result<()>) {
    match run(&op) {
        Ok(()) => {}
        Err(Error::Port(PortError::Closed)) | Err(Error::Sync(SyncError::Cancelled)) => {}
        Err(e) => {
            tracing::warn!(operator = %op.name(), error = %e, "worker terminated with error")
        }
    }
}
