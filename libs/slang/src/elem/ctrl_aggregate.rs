//! `aggregate`: folds a stream of items into an accumulator by sending
//! `(state, item)` pairs through the `iterator` delegate.

use crate::core::definition::OperatorDef;
use crate::core::operator::Operator;
use crate::core::synchronizer::Synchronizer;
use crate::core::types::TypeDef;
use crate::core::value::Value;
use crate::core::Result;

use super::BuiltinConfig;

pub(crate) fn config() -> BuiltinConfig {
    BuiltinConfig {
        def: OperatorDef::with_main(
            TypeDef::map([
                ("init", TypeDef::generic("stateType")),
                ("items", TypeDef::stream(TypeDef::generic("itemType"))),
            ]),
            TypeDef::generic("stateType"),
        )
        .with_delegate(
            "iterator",
            TypeDef::map([
                ("state", TypeDef::generic("stateType")),
                ("item", TypeDef::generic("itemType")),
            ]),
            TypeDef::generic("stateType"),
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
    let init_port = op.main().input().map("init")?;
    let items_port = op.main().input().map("items")?;
    let out = op.main().output().clone();
    let delegate = op
        .delegate("iterator")
        .ok_or_else(|| anyhow::anyhow!("aggregate built without its iterator delegate"))?;
    let sync = Synchronizer::new(delegate.input().clone(), delegate.output().clone());

    while !op.should_stop() {
        let init = init_port.pull()?;
        if let Value::Marker(marker) = init {
            // A marker from an enclosing stream arrives on every field;
            // drain the twin and pass it downstream once.
            match items_port.pull()? {
                Value::Marker(twin) if twin == marker => {}
                other => tracing::warn!(
                    operator = %op.name(),
                    got = other.kind(),
                    "marker on init without a matching marker on items"
                ),
            }
            out.push(Value::Marker(marker))?;
            continue;
        }
        let items = match items_port.pull()? {
            Value::Stream(items) => items,
            other => {
                tracing::warn!(
                    operator = %op.name(),
                    got = other.kind(),
                    "expected an item stream, skipping"
                );
                continue;
            }
        };

        let mut state = init;
        for item in items {
            let snapshot = state.clone();
            let token = sync.push(|dispatch| {
                dispatch.map("state")?.push(snapshot)?;
                dispatch.map("item")?.push(item)
            })?;
            state = sync.pull(token, |collect| collect.pull())??;
        }
        out.push(state)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::definition::InstanceDef;
    use crate::core::value::Value;
    use crate::elem::make_operator;
    use crate::testutil::assert_port_pushes;
    use std::collections::HashMap;

    fn numeric_aggregate() -> Operator {
        make_operator(
            &InstanceDef::new("aggregate")
                .generic("itemType", TypeDef::Number)
                .generic("stateType", TypeDef::Number),
        )
        .unwrap()
    }

    fn add_worker(op: Operator) {
        let input = op.main().input().clone();
        let output = op.main().output().clone();
        loop {
            let Ok(v) = input.pull() else { break };
            let result = match v {
                Value::Map(m) => Value::Number(
                    m["state"].as_f64().unwrap_or(0.0) + m["item"].as_f64().unwrap_or(0.0),
                ),
                other => other,
            };
            if output.push(result).is_err() {
                break;
            }
        }
    }

    fn add_operator() -> Operator {
        Operator::new(
            "add",
            Some(add_worker),
            None,
            &OperatorDef::with_main(
                TypeDef::map([("state", TypeDef::Number), ("item", TypeDef::Number)]),
                TypeDef::Number,
            ),
        )
        .unwrap()
    }

    #[test]
    fn test_is_registered() {
        assert!(crate::elem::registry().is_registered("aggregate"));
    }

    #[test]
    fn test_simple_loop_folds_in_order() {
        let agg = numeric_aggregate();
        let add = add_operator();

        let iterator = agg.delegate("iterator").unwrap();
        iterator.output().connect(add.main().input()).unwrap();
        add.main().output().connect(iterator.input()).unwrap();

        agg.main().output().bufferize();

        let init = agg.main().input().map("init").unwrap();
        let items = agg.main().input().map("items").unwrap();
        for v in [0.0, 8.0, 999.0, 4.0] {
            init.push(Value::Number(v)).unwrap();
        }
        let batches: [&[f64]; 4] = [&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0], &[], &[1.0, 2.0, 3.0]];
        for batch in batches {
            items
                .push(Value::Stream(
                    batch.iter().map(|n| Value::Number(*n)).collect(),
                ))
                .unwrap();
        }

        agg.start();
        add.start();

        assert_port_pushes(
            &[
                Value::Number(6.0),
                Value::Number(20.0),
                Value::Number(999.0),
                Value::Number(10.0),
            ],
            agg.main().output(),
        );

        agg.stop();
        add.stop();
    }

    #[test]
    fn test_passes_markers_of_enclosing_streams() {
        let agg = numeric_aggregate();

        let wrapper = Operator::new(
            "wrapper",
            None,
            None,
            &OperatorDef::with_main(
                TypeDef::stream(TypeDef::map([
                    ("init", TypeDef::Number),
                    ("items", TypeDef::stream(TypeDef::Number)),
                ])),
                TypeDef::stream(TypeDef::Number),
            ),
        )
        .unwrap();
        agg.set_parent(&wrapper);

        let wrapped = wrapper.main().input().stream().unwrap();
        wrapped
            .map("init")
            .unwrap()
            .connect(&agg.main().input().map("init").unwrap())
            .unwrap();
        wrapped
            .map("items")
            .unwrap()
            .connect(&agg.main().input().map("items").unwrap())
            .unwrap();

        // The delegate loops straight back: new state = previous state.
        let iterator = agg.delegate("iterator").unwrap();
        iterator
            .output()
            .map("state")
            .unwrap()
            .connect(iterator.input())
            .unwrap();

        agg.main()
            .output()
            .connect(&wrapper.main().output().stream().unwrap())
            .unwrap();
        wrapper.main().output().bufferize();

        wrapper.start();

        wrapper
            .main()
            .input()
            .push(Value::Stream(vec![Value::Map(HashMap::from([
                ("init".to_string(), Value::Number(0.0)),
                ("items".to_string(), Value::Stream(vec![])),
            ]))]))
            .unwrap();

        assert_eq!(
            wrapper.main().output().pull().unwrap(),
            Value::Stream(vec![Value::Number(0.0)])
        );

        wrapper.stop();
    }
}
