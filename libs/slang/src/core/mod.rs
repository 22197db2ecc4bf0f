//! Runtime core: type descriptors, values, ports, operators, the delegate
//! synchronizer, the builder and the running-operator manager.

pub mod builder;
pub(crate) mod channel;
pub mod definition;
pub mod error;
pub mod operator;
pub mod port;
pub mod runtime;
pub mod synchronizer;
pub mod types;
pub mod value;

pub use builder::{build_operator, resolve_port};
pub use definition::{
    DefinitionStore, Generics, InstanceDef, MemoryStore, OperatorDef, Properties, ServiceDef,
    MAIN_SERVICE,
};
pub use error::{
    BuildError, ConnectError, Error, PortError, Result, RuntimeError, SyncError, TypeError,
};
pub use operator::{ConnectHookFn, Operator, PropertyFn, Service, WorkerFn};
pub use port::{Direction, Port, PortId, CHANNEL_CAPACITY};
pub use runtime::{PortOutput, RunningOperator, RunningOperatorManager};
pub use synchronizer::{Synchronizer, Token};
pub use types::TypeDef;
pub use value::{Marker, MarkerKind, Value};
