//! `merge`: interleaves two streams into one, taking the next element from
//! the `true` or `false` branch as directed by the `select` signal.

use crate::core::definition::OperatorDef;
use crate::core::operator::Operator;
use crate::core::types::TypeDef;
use crate::core::value::Value;
use crate::core::Result;

use super::BuiltinConfig;

pub(crate) fn config() -> BuiltinConfig {
    BuiltinConfig {
        def: OperatorDef::with_main(
            TypeDef::map([
                ("true", TypeDef::stream(TypeDef::generic("itemType"))),
                ("false", TypeDef::stream(TypeDef::generic("itemType"))),
                ("select", TypeDef::stream(TypeDef::Boolean)),
            ]),
            TypeDef::stream(TypeDef::generic("itemType")),
        ),
        worker,
        property_fn: None,
        connect_hook: None,
    }
}

fn worker(op: Operator) {
    super::run_worker(op, run);
}

fn run(op: &Operator) -> Result<()> {
    let input = op.main().input().clone();
    let out = op.main().output().clone();

    while !op.should_stop() {
        match input.pull()? {
            Value::Marker(marker) => out.push(Value::Marker(marker))?,
            Value::Map(mut fields) => {
                let mut take = |name: &str| match fields.remove(name) {
                    Some(Value::Stream(items)) => items.into_iter(),
                    _ => Vec::new().into_iter(),
                };
                let mut truthies = take("true");
                let mut falsies = take("false");
                let select = take("select");

                let mut merged = Vec::new();
                for signal in select {
                    let next = if signal.truthy() {
                        truthies.next()
                    } else {
                        falsies.next()
                    };
                    match next {
                        Some(item) => merged.push(item),
                        None => tracing::warn!(
                            operator = %op.name(),
                            "select signal outran its branch"
                        ),
                    }
                }
                out.push(Value::Stream(merged))?;
            }
            other => tracing::warn!(
                operator = %op.name(),
                got = other.kind(),
                "expected a map of streams, skipping"
            ),
        }
    }
    Ok(())
}
