//! Builds operator trees from declarative definitions.
//!
//! Builtin names resolve against the process registry; everything else is
//! looked up in the definition store and built recursively. Edges are
//! declared as dotted port paths and resolved through the connection
//! engine.

use crate::core::definition::{
    DefinitionStore, InstanceDef, OperatorDef, PathSeg, PortPath,
};
use crate::core::error::BuildError;
use crate::core::operator::Operator;
use crate::core::port::{Direction, Port};
use crate::elem;

/// Builds the operator named by `def`, wiring composites all the way down.
pub fn build_operator(
    def: &InstanceDef,
    store: &dyn DefinitionStore,
) -> Result<Operator, BuildError> {
    if elem::registry().is_registered(&def.operator) {
        return elem::make_operator(def);
    }
    let op_def = store
        .operator_def(&def.operator)
        .ok_or_else(|| BuildError::UnknownOperator(def.operator.clone()))?;
    build_composite(def, &op_def, store)
}

fn build_composite(
    inst: &InstanceDef,
    op_def: &OperatorDef,
    store: &dyn DefinitionStore,
) -> Result<Operator, BuildError> {
    let op_def = op_def.specify_generics(&inst.generics)?;
    let name = if inst.name.is_empty() {
        &inst.operator
    } else {
        &inst.name
    };
    tracing::debug!(operator = %inst.operator, instance = %name, "building composite");
    let op = Operator::new(name, None, None, &op_def)?;
    op.set_properties(inst.properties.clone());

    for (child_name, child_inst) in &op_def.operators {
        let mut child_inst = child_inst.clone();
        if child_inst.name.is_empty() {
            child_inst.name = child_name.clone();
        }
        // Generic arguments of a child may themselves mention the parent's
        // generic parameters; resolve them with the parent's substitutions.
        for t in child_inst.generics.values_mut() {
            for (identifier, with) in &inst.generics {
                *t = t.substitute(identifier, with);
            }
        }
        let child = build_operator(&child_inst, store).map_err(|e| BuildError::Child {
            name: child_name.clone(),
            source: Box::new(e),
        })?;
        child.set_parent(&op);
    }

    for (src_path, dst_paths) in &op_def.connections {
        let (_, src_port) = resolve_port(&op, src_path)?;
        for dst_path in dst_paths {
            let (dst_op, dst_port) = resolve_port(&op, dst_path)?;
            src_port.connect(&dst_port)?;
            if let Some(hook) = dst_op.connect_hook() {
                hook(&dst_op, &dst_port, &src_port)?;
            }
        }
    }

    Ok(op)
}

/// Resolves a dotted port path relative to a composite operator. Returns
/// the operator the port belongs to along with the port itself.
pub fn resolve_port(op: &Operator, path: &str) -> Result<(Operator, Port), BuildError> {
    let parsed = PortPath::parse(path)?;
    let target = if parsed.instance.is_empty() {
        op.clone()
    } else {
        op.child(&parsed.instance)
            .ok_or_else(|| BuildError::UnknownChild {
                child: parsed.instance.clone(),
                path: path.to_string(),
            })?
    };
    let service = target
        .service(&parsed.service)
        .or_else(|| target.delegate(&parsed.service))
        .ok_or_else(|| BuildError::BadPortPath {
            path: path.to_string(),
            reason: format!(
                "operator '{}' has no service or delegate '{}'",
                target.name(),
                parsed.service
            ),
        })?;
    let mut port = match parsed.direction {
        Direction::In => service.input().clone(),
        Direction::Out => service.output().clone(),
    };
    for seg in &parsed.segments {
        port = match seg {
            PathSeg::Field(field) => port.map(field),
            PathSeg::Element => port.stream(),
        }
        .map_err(|e| BuildError::BadPortPath {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
    }
    Ok((target, port))
}
