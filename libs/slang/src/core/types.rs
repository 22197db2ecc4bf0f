//! Recursive type descriptors for ports.
//!
//! A `TypeDef` mirrors the JSON shape used by operator definitions:
//! `{"type": "number"}`, `{"type": "map", "map": {...}}`,
//! `{"type": "stream", "stream": {...}}`, `{"type": "generic", "generic": "T"}`.
//! A fully specialized descriptor contains no generic nodes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::error::TypeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TypeDef {
    Number,
    String,
    Boolean,
    Binary,
    Trigger,
    Map { map: HashMap<String, TypeDef> },
    Stream { stream: Box<TypeDef> },
    Generic { generic: String },
}

impl TypeDef {
    /// Shorthand for a stream descriptor.
    pub fn stream(element: TypeDef) -> TypeDef {
        TypeDef::Stream {
            stream: Box::new(element),
        }
    }

    /// Shorthand for a map descriptor.
    pub fn map<I, S>(fields: I) -> TypeDef
    where
        I: IntoIterator<Item = (S, TypeDef)>,
        S: Into<String>,
    {
        TypeDef::Map {
            map: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Shorthand for a generic placeholder.
    pub fn generic(identifier: impl Into<String>) -> TypeDef {
        TypeDef::Generic {
            generic: identifier.into(),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeDef::Number | TypeDef::String | TypeDef::Boolean | TypeDef::Binary | TypeDef::Trigger
        )
    }

    /// True if the given generic identifier occurs anywhere in this type.
    pub fn references_generic(&self, identifier: &str) -> bool {
        match self {
            TypeDef::Generic { generic } => generic == identifier,
            TypeDef::Map { map } => map.values().any(|t| t.references_generic(identifier)),
            TypeDef::Stream { stream } => stream.references_generic(identifier),
            _ => false,
        }
    }

    /// True if no generic nodes remain.
    pub fn is_fully_specified(&self) -> bool {
        match self {
            TypeDef::Generic { .. } => false,
            TypeDef::Map { map } => map.values().all(TypeDef::is_fully_specified),
            TypeDef::Stream { stream } => stream.is_fully_specified(),
            _ => true,
        }
    }

    /// Replaces every generic node matching `identifier` with `with`.
    ///
    /// Fails with [`TypeError::GenericUnknown`] when the identifier does not
    /// occur in this type at all; specializing an already concrete descriptor
    /// against an identifier it never mentions is a definition mistake, not a
    /// no-op.
    pub fn specify(&self, identifier: &str, with: &TypeDef) -> Result<TypeDef, TypeError> {
        if !self.references_generic(identifier) {
            return Err(TypeError::GenericUnknown(identifier.to_string()));
        }
        Ok(self.substitute(identifier, with))
    }

    /// Like [`TypeDef::specify`] but silently leaves the type untouched when
    /// the identifier does not occur. Used at the definition level, where a
    /// generic parameter need not show up in every single port.
    pub(crate) fn substitute(&self, identifier: &str, with: &TypeDef) -> TypeDef {
        match self {
            TypeDef::Generic { generic } if generic == identifier => with.clone(),
            TypeDef::Map { map } => TypeDef::Map {
                map: map
                    .iter()
                    .map(|(k, t)| (k.clone(), t.substitute(identifier, with)))
                    .collect(),
            },
            TypeDef::Stream { stream } => TypeDef::stream(stream.substitute(identifier, with)),
            other => other.clone(),
        }
    }

    /// Structural sink compatibility after full specialization.
    ///
    /// `trigger` sinks accept any source; everything else must match
    /// structurally, maps field-wise and streams element-wise.
    pub fn compatible_with(&self, sink: &TypeDef) -> bool {
        if !self.is_fully_specified() || !sink.is_fully_specified() {
            return false;
        }
        if matches!(sink, TypeDef::Trigger) {
            return true;
        }
        match (self, sink) {
            (TypeDef::Map { map: a }, TypeDef::Map { map: b }) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, t)| b.get(k).is_some_and(|u| t.compatible_with(u)))
            }
            (TypeDef::Stream { stream: a }, TypeDef::Stream { stream: b }) => a.compatible_with(b),
            (a, b) => a == b,
        }
    }

    /// Rejects descriptors with empty map field names.
    pub fn validate(&self) -> Result<(), TypeError> {
        match self {
            TypeDef::Map { map } => {
                for (name, t) in map {
                    if name.is_empty() {
                        return Err(TypeError::EmptyFieldName);
                    }
                    t.validate()?;
                }
                Ok(())
            }
            TypeDef::Stream { stream } => stream.validate(),
            _ => Ok(()),
        }
    }
}
