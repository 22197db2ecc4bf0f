//! Declarative operator and instance definitions.
//!
//! These are the JSON-shaped documents the builder consumes. A composite
//! operator definition lists child instances and edges between dotted port
//! paths; a builtin definition only carries service and delegate shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{BuildError, TypeError};
use crate::core::port::Direction;
use crate::core::types::TypeDef;

/// Name of the service every operator must have.
pub const MAIN_SERVICE: &str = "main";

/// Free-form property bag, keyed by property name.
pub type Properties = HashMap<String, serde_json::Value>;

/// Generic substitutions, identifier to concrete type.
pub type Generics = HashMap<String, TypeDef>;

/// An in/out port pair declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDef {
    #[serde(rename = "in")]
    pub input: TypeDef,
    #[serde(rename = "out")]
    pub output: TypeDef,
}

/// A child instance inside a composite definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDef {
    /// Instance name; defaults to the map key it was declared under.
    #[serde(default)]
    pub name: String,
    pub operator: String,
    #[serde(default)]
    pub generics: Generics,
    #[serde(default)]
    pub properties: Properties,
}

impl InstanceDef {
    pub fn new(operator: impl Into<String>) -> InstanceDef {
        InstanceDef {
            name: String::new(),
            operator: operator.into(),
            generics: Generics::new(),
            properties: Properties::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> InstanceDef {
        self.name = name.into();
        self
    }

    pub fn generic(mut self, identifier: impl Into<String>, t: TypeDef) -> InstanceDef {
        self.generics.insert(identifier.into(), t);
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: serde_json::Value) -> InstanceDef {
        self.properties.insert(name.into(), value);
        self
    }
}

/// A full operator definition: services, delegates and, for composites,
/// children plus the edges wiring them together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDef {
    pub services: HashMap<String, ServiceDef>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub delegates: HashMap<String, ServiceDef>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub operators: HashMap<String, InstanceDef>,
    /// Source port path to destination port paths.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub connections: HashMap<String, Vec<String>>,
    /// Declared property schema, consumed by the property function.
    #[serde(default, rename = "propertiesDef", skip_serializing_if = "HashMap::is_empty")]
    pub properties_def: Properties,
    /// Declared generic parameter names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generics: Vec<String>,
}

impl OperatorDef {
    /// A definition with just a main service.
    pub fn with_main(input: TypeDef, output: TypeDef) -> OperatorDef {
        OperatorDef {
            services: HashMap::from([(MAIN_SERVICE.to_string(), ServiceDef { input, output })]),
            delegates: HashMap::new(),
            operators: HashMap::new(),
            connections: HashMap::new(),
            properties_def: Properties::new(),
            generics: Vec::new(),
        }
    }

    pub fn with_delegate(
        mut self,
        name: impl Into<String>,
        output: TypeDef,
        input: TypeDef,
    ) -> OperatorDef {
        self.delegates
            .insert(name.into(), ServiceDef { input, output });
        self
    }

    /// Applies generic substitutions across every service and delegate.
    ///
    /// Each identifier must occur somewhere in the definition, though not
    /// necessarily in every port.
    pub fn specify_generics(&self, generics: &Generics) -> Result<OperatorDef, TypeError> {
        let mut def = self.clone();
        for (identifier, with) in generics {
            let occurs = def
                .services
                .values()
                .chain(def.delegates.values())
                .any(|s| {
                    s.input.references_generic(identifier)
                        || s.output.references_generic(identifier)
                });
            if !occurs {
                return Err(TypeError::GenericUnknown(identifier.clone()));
            }
            for service in def.services.values_mut().chain(def.delegates.values_mut()) {
                service.input = service.input.substitute(identifier, with);
                service.output = service.output.substitute(identifier, with);
            }
        }
        Ok(def)
    }
}

/// One parsed segment below the in/out level of a port path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PathSeg {
    Field(String),
    Element,
}

/// A parsed dotted port path:
/// `<instance>.<service-or-delegate>.<in|out>[.<field|~>]*`.
/// An empty instance segment addresses the composite operator itself.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PortPath {
    pub instance: String,
    pub service: String,
    pub direction: Direction,
    pub segments: Vec<PathSeg>,
}

impl PortPath {
    pub(crate) fn parse(path: &str) -> Result<PortPath, BuildError> {
        let bad = |reason: &str| BuildError::BadPortPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        let mut parts: Vec<&str> = path.split('.').collect();
        if !parts.is_empty() && parts[0].is_empty() {
            parts.remove(0);
        }
        if parts.len() < 2 {
            return Err(bad("expected <instance>.<service>.<in|out>"));
        }
        // Without an instance segment the path addresses the operator
        // itself, so the direction appears one position earlier.
        let (instance, service, dir, rest) = if parts[1] == "in" || parts[1] == "out" {
            (String::new(), parts[0].to_string(), parts[1], &parts[2..])
        } else {
            if parts.len() < 3 {
                return Err(bad("expected <instance>.<service>.<in|out>"));
            }
            (
                parts[0].to_string(),
                parts[1].to_string(),
                parts[2],
                &parts[3..],
            )
        };
        let direction = match dir {
            "in" => Direction::In,
            "out" => Direction::Out,
            _ => return Err(bad("direction must be 'in' or 'out'")),
        };
        if service.is_empty() {
            return Err(bad("service name must not be empty"));
        }
        let mut segments = Vec::new();
        for seg in rest {
            if seg.is_empty() {
                return Err(bad("empty path segment"));
            }
            segments.push(if *seg == "~" {
                PathSeg::Element
            } else {
                PathSeg::Field((*seg).to_string())
            });
        }
        Ok(PortPath {
            instance,
            service,
            direction,
            segments,
        })
    }
}

/// Source of composite operator definitions, resolved by name.
pub trait DefinitionStore {
    fn operator_def(&self, name: &str) -> Option<OperatorDef>;
}

/// In-memory definition store for tests and embedding.
#[derive(Default)]
pub struct MemoryStore {
    defs: HashMap<String, OperatorDef>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, def: OperatorDef) {
        self.defs.insert(name.into(), def);
    }
}

impl DefinitionStore for MemoryStore {
    fn operator_def(&self, name: &str) -> Option<OperatorDef> {
        self.defs.get(name).cloned()
    }
}
