//! The typed port algebra.
//!
//! A port mirrors its type descriptor: a map port carries one child port per
//! field, a stream port carries one element sub-port, a primitive port is a
//! leaf with a value FIFO. Connections are registered at primitive leaves
//! only; pushing on any port decomposes structured values down to the leaves
//! and fans them out to every connected sink.
//!
//! Stream values travel as BOS marker, elements, EOS marker on the leaf
//! channels. A marker carries the identity of the stream port that
//! synthesized it. When a stream port pulls a marker it does not recognize
//! as belonging to an enclosing stream, it treats it as its own delimiter
//! and assembles; otherwise the marker bubbles up one nesting level.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::core::channel::ValueChannel;
use crate::core::error::{ConnectError, PortError};
use crate::core::types::TypeDef;
use crate::core::value::{Marker, Value};

/// Capacity of the FIFO behind every primitive in-port leaf. Pushes beyond
/// this block until a consumer pulls, which is what gives the engine its
/// backpressure.
pub const CHANNEL_CAPACITY: usize = 64;

/// Process-unique port identity; doubles as the stream identity on markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(u64);

impl PortId {
    pub(crate) fn next() -> PortId {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        PortId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Number,
    String,
    Boolean,
    Binary,
    Trigger,
}

enum Shape {
    Primitive(Primitive),
    Map(BTreeMap<String, Port>),
    Stream(Port),
    Generic(String),
}

struct PortInner {
    id: PortId,
    direction: Direction,
    label: String,
    shape: Shape,
    /// Local FIFO. Always present on primitive in-port leaves, installed on
    /// out-port leaves by `bufferize()`.
    channel: Mutex<Option<Arc<ValueChannel>>>,
    /// Set by `bufferize()`; forces local delivery even when sinks exist.
    buffered: AtomicBool,
    sinks: Mutex<Vec<Port>>,
    source: Mutex<Option<(PortId, Weak<PortInner>)>>,
    parent: Mutex<Option<Weak<PortInner>>>,
    closed: AtomicBool,
}

/// A typed terminal on an operator. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Port {
    inner: Arc<PortInner>,
}

impl Port {
    pub(crate) fn from_type(def: &TypeDef, direction: Direction, label: String) -> Port {
        let shape = match def {
            TypeDef::Number => Shape::Primitive(Primitive::Number),
            TypeDef::String => Shape::Primitive(Primitive::String),
            TypeDef::Boolean => Shape::Primitive(Primitive::Boolean),
            TypeDef::Binary => Shape::Primitive(Primitive::Binary),
            TypeDef::Trigger => Shape::Primitive(Primitive::Trigger),
            TypeDef::Map { map } => Shape::Map(
                map.iter()
                    .map(|(name, t)| {
                        let child =
                            Port::from_type(t, direction, format!("{label}.{name}"));
                        (name.clone(), child)
                    })
                    .collect(),
            ),
            TypeDef::Stream { stream } => {
                Shape::Stream(Port::from_type(stream, direction, format!("{label}.~")))
            }
            TypeDef::Generic { generic } => Shape::Generic(generic.clone()),
        };
        let channel = match (&shape, direction) {
            (Shape::Primitive(_), Direction::In) => {
                Some(Arc::new(ValueChannel::bounded(CHANNEL_CAPACITY)))
            }
            _ => None,
        };
        let port = Port {
            inner: Arc::new(PortInner {
                id: PortId::next(),
                direction,
                label,
                shape,
                channel: Mutex::new(channel),
                buffered: AtomicBool::new(false),
                sinks: Mutex::new(Vec::new()),
                source: Mutex::new(None),
                parent: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        };
        port.adopt_children();
        port
    }

    fn adopt_children(&self) {
        let parent = Arc::downgrade(&self.inner);
        match &self.inner.shape {
            Shape::Map(fields) => {
                for child in fields.values() {
                    *child.inner.parent.lock() = Some(parent.clone());
                }
            }
            Shape::Stream(element) => {
                *element.inner.parent.lock() = Some(parent);
            }
            _ => {}
        }
    }

    pub fn id(&self) -> PortId {
        self.inner.id
    }

    pub fn direction(&self) -> Direction {
        self.inner.direction
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.inner.shape, Shape::Stream(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self.inner.shape, Shape::Map(_))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.inner.shape, Shape::Primitive(_))
    }

    pub fn primitive(&self) -> Option<Primitive> {
        match self.inner.shape {
            Shape::Primitive(kind) => Some(kind),
            _ => None,
        }
    }

    /// The child port for a map field.
    pub fn map(&self, field: &str) -> Result<Port, PortError> {
        match &self.inner.shape {
            Shape::Map(fields) => fields.get(field).cloned().ok_or_else(|| {
                PortError::NoSuchField {
                    port: self.inner.label.clone(),
                    field: field.to_string(),
                }
            }),
            _ => Err(PortError::NotAMap(self.inner.label.clone())),
        }
    }

    /// The element sub-port of a stream.
    pub fn stream(&self) -> Result<Port, PortError> {
        match &self.inner.shape {
            Shape::Stream(element) => Ok(element.clone()),
            _ => Err(PortError::NotAStream(self.inner.label.clone())),
        }
    }

    fn parent_port(&self) -> Option<Port> {
        self.inner
            .parent
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Port { inner })
    }

    fn source_port(&self) -> Option<Port> {
        self.inner
            .source
            .lock()
            .as_ref()
            .and_then(|(_, weak)| weak.upgrade())
            .map(|inner| Port { inner })
    }

    /// The identity whose markers delimit this stream. Resolved through the
    /// source chain so chains of connection hubs share one identity.
    fn stream_origin(&self) -> PortId {
        match self.source_port() {
            Some(source) => source.stream_origin(),
            None => self.inner.id,
        }
    }

    /// Origins of every stream strictly enclosing this port, looking both at
    /// this port's own parents and through its connected source.
    fn collect_enclosing_origins(&self, out: &mut HashSet<PortId>) {
        let mut cursor = self.parent_port();
        while let Some(port) = cursor {
            if port.is_stream() {
                out.insert(port.stream_origin());
            }
            cursor = port.parent_port();
        }
        if let Some(source) = self.source_port() {
            source.collect_enclosing_origins(out);
        }
    }

    /// A marker belongs to this stream unless it was synthesized by an
    /// enclosing stream.
    fn owns_marker(&self, origin: PortId) -> bool {
        let mut enclosing = HashSet::new();
        self.collect_enclosing_origins(&mut enclosing);
        !enclosing.contains(&origin)
    }

    // ---- push ----------------------------------------------------------

    /// Pushes a value through this port. Structured values decompose down to
    /// primitive leaves; stream values are bracketed with synthesized
    /// BOS/EOS markers; markers themselves pass through any shape unchanged.
    pub fn push(&self, value: Value) -> Result<(), PortError> {
        if value.is_marker() {
            return self.push_marker(value);
        }
        match &self.inner.shape {
            Shape::Primitive(kind) => {
                let value = match kind {
                    Primitive::Trigger => Value::Trigger,
                    _ => value,
                };
                self.push_leaf(value)
            }
            Shape::Map(fields) => {
                let Value::Map(mut entries) = value else {
                    return Err(PortError::UnexpectedValue {
                        port: self.inner.label.clone(),
                        got: value.kind(),
                    });
                };
                if entries.len() != fields.len()
                    || !fields.keys().all(|k| entries.contains_key(k))
                {
                    return Err(PortError::UnexpectedValue {
                        port: self.inner.label.clone(),
                        got: "a map with a different field set",
                    });
                }
                for (name, child) in fields {
                    if let Some(v) = entries.remove(name) {
                        child.push(v)?;
                    }
                }
                Ok(())
            }
            Shape::Stream(element) => {
                let Value::Stream(items) = value else {
                    return Err(PortError::UnexpectedValue {
                        port: self.inner.label.clone(),
                        got: value.kind(),
                    });
                };
                self.push_bos()?;
                for item in items {
                    element.push(item)?;
                }
                self.push_eos()
            }
            Shape::Generic(_) => Err(PortError::Unresolved(self.inner.label.clone())),
        }
    }

    /// Opens a stream on this port without committing to its elements yet.
    pub fn push_bos(&self) -> Result<(), PortError> {
        let element = self.stream()?;
        element.push_marker(Value::Marker(Marker::bos(self.stream_origin())))
    }

    /// Closes the stream opened by [`Port::push_bos`].
    pub fn push_eos(&self) -> Result<(), PortError> {
        let element = self.stream()?;
        element.push_marker(Value::Marker(Marker::eos(self.stream_origin())))
    }

    fn push_marker(&self, marker: Value) -> Result<(), PortError> {
        match &self.inner.shape {
            Shape::Primitive(_) => self.push_leaf(marker),
            Shape::Map(fields) => {
                for child in fields.values() {
                    child.push_marker(marker.clone())?;
                }
                Ok(())
            }
            Shape::Stream(element) => element.push_marker(marker),
            Shape::Generic(_) => Err(PortError::Unresolved(self.inner.label.clone())),
        }
    }

    fn push_leaf(&self, value: Value) -> Result<(), PortError> {
        let sinks = self.inner.sinks.lock().clone();
        let deliver_local = self.inner.buffered.load(Ordering::Relaxed) || sinks.is_empty();
        if deliver_local {
            let channel = self.inner.channel.lock().clone();
            match channel {
                Some(channel) => channel.push(value.clone())?,
                None => {
                    tracing::debug!(port = %self, "value dropped on unconnected out-port")
                }
            }
        }
        for sink in sinks {
            if let Err(PortError::Closed) = sink.push(value.clone()) {
                tracing::warn!(port = %self, sink = %sink, "sink closed, value dropped");
            }
        }
        Ok(())
    }

    // ---- pull ----------------------------------------------------------

    /// Pulls the next value. Primitive ports block on their FIFO; map ports
    /// reassemble one value per field with markers synchronized across
    /// fields; stream ports assemble their own BOS..EOS bracket into a
    /// `Value::Stream` and bubble enclosing markers up unchanged.
    pub fn pull(&self) -> Result<Value, PortError> {
        match &self.inner.shape {
            Shape::Primitive(_) => {
                let channel = self.inner.channel.lock().clone();
                match channel {
                    Some(channel) => channel.pull(),
                    None => Err(PortError::NotBufferized(self.inner.label.clone())),
                }
            }
            Shape::Map(fields) => self.pull_map(fields),
            Shape::Stream(element) => self.pull_stream(element),
            Shape::Generic(_) => Err(PortError::Unresolved(self.inner.label.clone())),
        }
    }

    fn pull_map(&self, fields: &BTreeMap<String, Port>) -> Result<Value, PortError> {
        let mut pulled = Vec::with_capacity(fields.len());
        for (name, child) in fields {
            pulled.push((name.clone(), child.pull()?));
        }
        let markers = pulled
            .iter()
            .filter(|(_, v)| v.is_marker())
            .count();
        if markers == 0 {
            return Ok(Value::Map(pulled.into_iter().collect()));
        }
        if markers < pulled.len() {
            return Err(PortError::MarkerDesync {
                port: self.inner.label.clone(),
                detail: "some fields produced a marker while others produced data".to_string(),
            });
        }
        let (_, first) = &pulled[0];
        if pulled.iter().any(|(_, v)| v != first) {
            return Err(PortError::MarkerDesync {
                port: self.inner.label.clone(),
                detail: "fields disagree on the current marker".to_string(),
            });
        }
        Ok(first.clone())
    }

    fn pull_stream(&self, element: &Port) -> Result<Value, PortError> {
        let first = element.pull()?;
        let own = match first {
            Value::Marker(m) if !self.owns_marker(m.origin) => {
                // An enclosing stream's delimiter; hand it to our caller.
                return Ok(Value::Marker(m));
            }
            Value::Marker(m) if m.kind == crate::core::value::MarkerKind::Bos => m,
            Value::Marker(_) => {
                return Err(PortError::MarkerDesync {
                    port: self.inner.label.clone(),
                    detail: "stream closed before it was opened".to_string(),
                });
            }
            _ => {
                return Err(PortError::MarkerDesync {
                    port: self.inner.label.clone(),
                    detail: "stream element arrived before begin-of-stream".to_string(),
                });
            }
        };
        let mut items = Vec::new();
        loop {
            match element.pull() {
                // A closed upstream terminates the stream like EOS would.
                Err(PortError::Closed) => return Ok(Value::Stream(items)),
                Err(e) => return Err(e),
                Ok(Value::Marker(m)) if m.origin == own.origin => {
                    return match m.kind {
                        crate::core::value::MarkerKind::Eos => Ok(Value::Stream(items)),
                        crate::core::value::MarkerKind::Bos => Err(PortError::MarkerDesync {
                            port: self.inner.label.clone(),
                            detail: "stream reopened before end-of-stream".to_string(),
                        }),
                    };
                }
                Ok(Value::Marker(_)) => {
                    return Err(PortError::MarkerDesync {
                        port: self.inner.label.clone(),
                        detail: "foreign marker inside an open stream".to_string(),
                    });
                }
                Ok(v) => items.push(v),
            }
        }
    }

    // ---- connect -------------------------------------------------------

    /// Wires this port into `dst` so values pushed here arrive there,
    /// walking both shapes in lockstep and registering sinks at the
    /// primitive leaves. Any port accepts at most one source.
    pub fn connect(&self, dst: &Port) -> Result<(), ConnectError> {
        self.link(dst)?;
        tracing::debug!(src = %self, dst = %dst, "ports connected");
        Ok(())
    }

    fn link(&self, dst: &Port) -> Result<(), ConnectError> {
        match (&self.inner.shape, &dst.inner.shape) {
            (Shape::Generic(_), _) => {
                Err(ConnectError::GenericUnresolved(self.inner.label.clone()))
            }
            (_, Shape::Generic(_)) => {
                Err(ConnectError::GenericUnresolved(dst.inner.label.clone()))
            }
            // Triggers sink anything; attach to the first leaf so each
            // logical value fires exactly once.
            (_, Shape::Primitive(Primitive::Trigger)) => {
                let leaf = self.first_leaf().ok_or_else(|| {
                    ConnectError::GenericUnresolved(self.inner.label.clone())
                })?;
                dst.set_source(self)?;
                leaf.add_sink(dst);
                Ok(())
            }
            (Shape::Primitive(a), Shape::Primitive(b)) => {
                if a != b {
                    return Err(ConnectError::TypeMismatch {
                        src: self.inner.label.clone(),
                        dst: dst.inner.label.clone(),
                    });
                }
                dst.set_source(self)?;
                self.add_sink(dst);
                Ok(())
            }
            (Shape::Map(a), Shape::Map(b)) => {
                if !a.keys().eq(b.keys()) {
                    return Err(ConnectError::ShapeMismatch {
                        src: self.inner.label.clone(),
                        dst: dst.inner.label.clone(),
                    });
                }
                dst.set_source(self)?;
                for (name, src_child) in a {
                    src_child.link(&b[name])?;
                }
                Ok(())
            }
            (Shape::Stream(a), Shape::Stream(b)) => {
                dst.set_source(self)?;
                a.link(b)
            }
            _ => Err(ConnectError::ShapeMismatch {
                src: self.inner.label.clone(),
                dst: dst.inner.label.clone(),
            }),
        }
    }

    fn set_source(&self, src: &Port) -> Result<(), ConnectError> {
        let mut source = self.inner.source.lock();
        if source.is_some() {
            return Err(ConnectError::AlreadyConnected(self.inner.label.clone()));
        }
        *source = Some((src.inner.id, Arc::downgrade(&src.inner)));
        Ok(())
    }

    fn add_sink(&self, sink: &Port) {
        self.inner.sinks.lock().push(sink.clone());
    }

    pub fn has_source(&self) -> bool {
        self.inner.source.lock().is_some()
    }

    fn first_leaf(&self) -> Option<Port> {
        match &self.inner.shape {
            Shape::Primitive(_) => Some(self.clone()),
            Shape::Map(fields) => fields.values().find_map(Port::first_leaf),
            Shape::Stream(element) => element.first_leaf(),
            Shape::Generic(_) => None,
        }
    }

    // ---- buffering & lifecycle ----------------------------------------

    /// Installs an unbounded FIFO beneath every primitive leaf so an
    /// external consumer can pull without blocking the producing worker.
    pub fn bufferize(&self) {
        match &self.inner.shape {
            Shape::Primitive(_) => {
                self.inner.buffered.store(true, Ordering::Relaxed);
                let mut channel = self.inner.channel.lock();
                if channel.is_none() {
                    *channel = Some(Arc::new(ValueChannel::unbounded()));
                }
            }
            Shape::Map(fields) => {
                for child in fields.values() {
                    child.bufferize();
                }
            }
            Shape::Stream(element) => element.bufferize(),
            Shape::Generic(_) => {}
        }
    }

    /// Depth-first visit of every primitive leaf beneath this port.
    pub fn walk_primitive_ports(&self, f: &mut dyn FnMut(&Port)) {
        match &self.inner.shape {
            Shape::Primitive(_) => f(self),
            Shape::Map(fields) => {
                for child in fields.values() {
                    child.walk_primitive_ports(f);
                }
            }
            Shape::Stream(element) => element.walk_primitive_ports(f),
            Shape::Generic(_) => {}
        }
    }

    /// Marks the port closed and wakes blocked pushers and pullers. Queued
    /// values remain pullable until drained. Idempotent.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Relaxed);
        match &self.inner.shape {
            Shape::Primitive(_) => {
                if let Some(channel) = self.inner.channel.lock().clone() {
                    channel.close();
                }
            }
            Shape::Map(fields) => {
                for child in fields.values() {
                    child.close();
                }
            }
            Shape::Stream(element) => element.close(),
            Shape::Generic(_) => {}
        }
    }

    pub fn closed(&self) -> bool {
        if let Shape::Primitive(_) = self.inner.shape {
            if let Some(channel) = self.inner.channel.lock().clone() {
                return channel.is_closed();
            }
        }
        self.inner.closed.load(Ordering::Relaxed)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.label)
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("label", &self.inner.label)
            .field("direction", &self.inner.direction)
            .finish()
    }
}
