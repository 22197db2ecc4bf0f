//! slang: the core of a visual dataflow runtime.
//!
//! Operator graphs exchange typed values over ports. Edges carry structured
//! streams delimited by begin/end-of-stream markers; each operator runs its
//! worker on its own thread, and control-flow operators call out to
//! user-supplied sub-graphs through delegates, kept in order by the
//! synchronizer.
//!
//! ```no_run
//! use slang::{build_operator, InstanceDef, MemoryStore, Value};
//!
//! let store = MemoryStore::new();
//! let op = build_operator(
//!     &InstanceDef::new("slang.files.read"),
//!     &store,
//! )?;
//! op.main().output().bufferize();
//! op.start();
//! op.main().input().push(Value::String("hello.txt".into()))?;
//! let result = op.main().output().pull()?;
//! # let _ = result;
//! # Ok::<(), slang::Error>(())
//! ```

pub mod core;
pub mod elem;

#[cfg(test)]
pub(crate) mod testutil;

pub use crate::core::{
    build_operator, resolve_port, BuildError, ConnectError, ConnectHookFn, DefinitionStore,
    Direction, Error, Generics, InstanceDef, Marker, MarkerKind, MemoryStore, Operator,
    OperatorDef, Port, PortError, PortId, PortOutput, Properties, PropertyFn, Result,
    RunningOperator, RunningOperatorManager, RuntimeError, Service, ServiceDef, SyncError,
    Synchronizer, Token, TypeDef, TypeError, Value, WorkerFn, CHANNEL_CAPACITY, MAIN_SERVICE,
};
pub use crate::elem::{make_operator, registry, BuiltinConfig, BuiltinRegistry};
