//! Runtime values flowing through ports.
//!
//! Stream markers are a dedicated variant so the port layer recognizes them
//! structurally, never by inspecting user payloads. The `origin` on a marker
//! is the identity of the stream port that synthesized it, which is what
//! keeps nested streams apart.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::core::error::Error;
use crate::core::port::PortId;
use crate::core::types::TypeDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Bos,
    Eos,
}

/// Sentinel delimiting one logical stream on a primitive channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub origin: PortId,
}

impl Marker {
    pub fn bos(origin: PortId) -> Marker {
        Marker {
            kind: MarkerKind::Bos,
            origin,
        }
    }

    pub fn eos(origin: PortId) -> Marker {
        Marker {
            kind: MarkerKind::Eos,
            origin,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Number(f64),
    String(String),
    Bool(bool),
    Binary(Vec<u8>),
    Trigger,
    Map(HashMap<String, Value>),
    Stream(Vec<Value>),
    Marker(Marker),
}

impl Value {
    pub fn is_marker(&self) -> bool {
        matches!(self, Value::Marker(_))
    }

    pub fn is_bos(&self) -> bool {
        matches!(self, Value::Marker(m) if m.kind == MarkerKind::Bos)
    }

    pub fn is_eos(&self) -> bool {
        matches!(self, Value::Marker(m) if m.kind == MarkerKind::Eos)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Loose truthiness used by the control-flow builtins.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Null => false,
            _ => true,
        }
    }

    /// Short value-kind label for error messages.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Number(_) => "a number",
            Value::String(_) => "a string",
            Value::Bool(_) => "a boolean",
            Value::Binary(_) => "binary data",
            Value::Trigger => "a trigger",
            Value::Map(_) => "a map",
            Value::Stream(_) => "a stream",
            Value::Marker(_) => "a marker",
        }
    }

    /// Converts to the external JSON representation: primitives natural,
    /// binary as base64, streams as plain arrays, lone markers as
    /// `{"isBOS": true}` / `{"isEOS": true}`.
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Trigger => serde_json::Value::Null,
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Binary(bytes) => serde_json::Value::String(BASE64.encode(bytes)),
            Value::Map(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_wire()))
                    .collect(),
            ),
            Value::Stream(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_wire).collect())
            }
            Value::Marker(m) => {
                let key = match m.kind {
                    MarkerKind::Bos => "isBOS",
                    MarkerKind::Eos => "isEOS",
                };
                serde_json::json!({ key: true })
            }
        }
    }

    /// Parses a wire JSON value against a type descriptor.
    pub fn from_wire(wire: &serde_json::Value, def: &TypeDef) -> Result<Value, Error> {
        let fail = || {
            Error::Other(anyhow::anyhow!(
                "wire value {wire} does not match type {def:?}"
            ))
        };
        if wire.is_null() {
            return Ok(Value::Null);
        }
        match def {
            TypeDef::Number => wire.as_f64().map(Value::Number).ok_or_else(&fail),
            TypeDef::String => wire
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(&fail),
            TypeDef::Boolean => wire.as_bool().map(Value::Bool).ok_or_else(&fail),
            TypeDef::Binary => {
                let s = wire.as_str().ok_or_else(&fail)?;
                BASE64.decode(s).map(Value::Binary).map_err(|_| fail())
            }
            TypeDef::Trigger => Ok(Value::Trigger),
            TypeDef::Map { map } => {
                let obj = wire.as_object().ok_or_else(&fail)?;
                let mut fields = HashMap::new();
                for (name, t) in map {
                    let raw = obj.get(name).ok_or_else(&fail)?;
                    fields.insert(name.clone(), Value::from_wire(raw, t)?);
                }
                Ok(Value::Map(fields))
            }
            TypeDef::Stream { stream } => {
                let items = wire.as_array().ok_or_else(&fail)?;
                Ok(Value::Stream(
                    items
                        .iter()
                        .map(|v| Value::from_wire(v, stream))
                        .collect::<Result<_, _>>()?,
                ))
            }
            TypeDef::Generic { .. } => Err(fail()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::String(s.to_string())
    }
}
