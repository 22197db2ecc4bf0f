//! Error types for the slang runtime core.
//!
//! Each concern area has its own enum; `Error` is the crate-level umbrella.
//! Worker-side I/O failures are never surfaced here at runtime, they are
//! materialized as data on an `error` out-port field instead.

use thiserror::Error;

/// Errors raised by type descriptor operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TypeError {
    #[error("generic identifier '{0}' does not occur in this type")]
    GenericUnknown(String),

    #[error("map field name must not be empty")]
    EmptyFieldName,
}

/// Errors raised by port push/pull operations.
#[derive(Error, Debug)]
pub enum PortError {
    /// The owning operator has stopped and the port is drained.
    #[error("port closed")]
    Closed,

    #[error("port {0} has no buffer to pull from; call bufferize() first")]
    NotBufferized(String),

    #[error("port {port} has no field '{field}'")]
    NoSuchField { port: String, field: String },

    #[error("port {0} is not a stream port")]
    NotAStream(String),

    #[error("port {0} is not a map port")]
    NotAMap(String),

    #[error("port {0} holds an unresolved generic and cannot carry values")]
    Unresolved(String),

    #[error("port {port} cannot accept {got}")]
    UnexpectedValue { port: String, got: &'static str },

    #[error("stream markers out of sync on port {port}: {detail}")]
    MarkerDesync { port: String, detail: String },
}

/// Errors raised by the connection engine.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("shape mismatch connecting {src} to {dst}")]
    ShapeMismatch { src: String, dst: String },

    #[error("type mismatch connecting {src} to {dst}")]
    TypeMismatch { src: String, dst: String },

    #[error("cannot connect unresolved generic port {0}")]
    GenericUnresolved(String),

    #[error("port {0} already has a source")]
    AlreadyConnected(String),
}

/// Errors raised while building an operator from its definition.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("malformed definition: {0}")]
    Definition(String),

    #[error("unknown child '{child}' in port path '{path}'")]
    UnknownChild { child: String, path: String },

    #[error("invalid port path '{path}': {reason}")]
    BadPortPath { path: String, reason: String },

    #[error("property error: {0}")]
    Property(String),

    #[error("in child '{name}': {source}")]
    Child {
        name: String,
        #[source]
        source: Box<BuildError>,
    },

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// Errors raised by the delegate synchronizer.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SyncError {
    /// The dispatch port closed before the pending token was serviced.
    #[error("synchronizer cancelled: dispatch port closed before the token was serviced")]
    Cancelled,

    #[error("synchronizer dispatch failed: {0}")]
    Dispatch(String),

    #[error("unknown synchronizer token")]
    UnknownToken,
}

/// Errors raised by the running-operator manager.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("no running operator with handle '{0}'")]
    UnknownHandle(String),
}

/// Crate-level error umbrella.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type that uses the crate umbrella error.
pub type Result<T> = std::result::Result<T, Error>;
