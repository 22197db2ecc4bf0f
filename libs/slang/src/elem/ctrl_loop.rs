//! `loop`: iterates a state through the `iteration` delegate until the
//! delegate reports `continue == false`.

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
            TypeDef::generic("stateType"),
            TypeDef::generic("stateType"),
        )
        .with_delegate(
            "iteration",
            TypeDef::generic("stateType"),
            TypeDef::map([
                ("state", TypeDef::generic("stateType")),
                ("continue", TypeDef::Boolean),
            ]),
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
    let delegate = op
        .delegate("iteration")
        .ok_or_else(|| anyhow::anyhow!("loop built without its iteration delegate"))?;
    let sync = Synchronizer::new(delegate.input().clone(), delegate.output().clone());

    while !op.should_stop() {
        let mut state = match input.pull()? {
            Value::Marker(marker) => {
                out.push(Value::Marker(marker))?;
                continue;
            }
            v => v,
        };
        loop {
            let snapshot = state.clone();
            let token = sync.push(|dispatch| dispatch.push(snapshot))?;
            let verdict = sync.pull(token, |collect| collect.pull())??;
            let mut fields = match verdict {
                Value::Map(fields) => fields,
                other => {
                    tracing::warn!(
                        operator = %op.name(),
                        got = other.kind(),
                        "iteration delegate must answer with {{state, continue}}"
                    );
                    break;
                }
            };
            state = fields.remove("state").unwrap_or(Value::Null);
            let keep_going = fields
                .remove("continue")
                .is_some_and(|v| v.truthy());
            if !keep_going {
                break;
            }
        }
        out.push(state)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::definition::InstanceDef;
    use crate::core::types::TypeDef;
    use crate::elem::make_operator;
    use crate::testutil::assert_port_pushes;
    use std::collections::HashMap;

    fn countdown_worker(op: Operator) {
        let input = op.main().input().clone();
        let output = op.main().output().clone();
        loop {
            let Ok(v) = input.pull() else { break };
            let result = match v.as_f64() {
                Some(n) => {
                    let next = n - 1.0;
                    Value::Map(HashMap::from([
                        ("state".to_string(), Value::Number(next)),
                        ("continue".to_string(), Value::Bool(next > 0.0)),
                    ]))
                }
                None => v,
            };
            if output.push(result).is_err() {
                break;
            }
        }
    }

    #[test]
    fn test_is_registered() {
        assert!(crate::elem::registry().is_registered("loop"));
    }

    #[test]
    fn test_iterates_until_halting_condition() {
        let looper = make_operator(
            &InstanceDef::new("loop").generic("stateType", TypeDef::Number),
        )
        .unwrap();
        let countdown = Operator::new(
            "countdown",
            Some(countdown_worker),
            None,
            &OperatorDef::with_main(
                TypeDef::Number,
                TypeDef::map([
                    ("state", TypeDef::Number),
                    ("continue", TypeDef::Boolean),
                ]),
            ),
        )
        .unwrap();

        let iteration = looper.delegate("iteration").unwrap();
        iteration.output().connect(countdown.main().input()).unwrap();
        countdown.main().output().connect(iteration.input()).unwrap();

        looper.main().output().bufferize();
        looper.main().input().push(Value::Number(3.0)).unwrap();
        looper.main().input().push(Value::Number(1.0)).unwrap();

        looper.start();
        countdown.start();

        assert_port_pushes(
            &[Value::Number(0.0), Value::Number(0.0)],
            looper.main().output(),
        );

        looper.stop();
        countdown.stop();
    }
}
