//! `fork`: splits a stream into `true`/`false` branches, asking the
//! `select` delegate for a verdict on every element.

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
            TypeDef::stream(TypeDef::generic("itemType")),
            TypeDef::map([
                ("true", TypeDef::stream(TypeDef::generic("itemType"))),
                ("false", TypeDef::stream(TypeDef::generic("itemType"))),
            ]),
        )
        .with_delegate("select", TypeDef::generic("itemType"), TypeDef::Boolean),
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
    let out_true = op.main().output().map("true")?;
    let out_false = op.main().output().map("false")?;
    let true_items = out_true.stream()?;
    let false_items = out_false.stream()?;
    let delegate = op
        .delegate("select")
        .ok_or_else(|| anyhow::anyhow!("fork built without its select delegate"))?;
    let sync = Synchronizer::new(delegate.input().clone(), delegate.output().clone());

    while !op.should_stop() {
        match input.pull()? {
            Value::Marker(marker) => {
                out_true.push(Value::Marker(marker))?;
                out_false.push(Value::Marker(marker))?;
            }
            Value::Stream(items) => {
                out_true.push_bos()?;
                out_false.push_bos()?;
                for item in items {
                    let probe = item.clone();
                    let token = sync.push(|dispatch| dispatch.push(probe))?;
                    let verdict = sync.pull(token, |collect| collect.pull())??;
                    if verdict.truthy() {
                        true_items.push(item)?;
                    } else {
                        false_items.push(item)?;
                    }
                }
                out_true.push_eos()?;
                out_false.push_eos()?;
            }
            other => tracing::warn!(
                operator = %op.name(),
                got = other.kind(),
                "expected a stream, skipping"
            ),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::definition::InstanceDef;
    use crate::elem::make_operator;

    fn is_even_worker(op: Operator) {
        let input = op.main().input().clone();
        let output = op.main().output().clone();
        loop {
            let Ok(v) = input.pull() else { break };
            let result = match v.as_f64() {
                Some(n) => Value::Bool(n % 2.0 == 0.0),
                None => v,
            };
            if output.push(result).is_err() {
                break;
            }
        }
    }

    #[test]
    fn test_is_registered() {
        assert!(crate::elem::registry().is_registered("fork"));
    }

    #[test]
    fn test_routes_by_predicate() {
        let fork = make_operator(
            &InstanceDef::new("fork").generic("itemType", TypeDef::Number),
        )
        .unwrap();
        let even = Operator::new(
            "is_even",
            Some(is_even_worker),
            None,
            &OperatorDef::with_main(TypeDef::Number, TypeDef::Boolean),
        )
        .unwrap();

        let select = fork.delegate("select").unwrap();
        select.output().connect(even.main().input()).unwrap();
        even.main().output().connect(select.input()).unwrap();

        fork.main().output().bufferize();
        fork.main()
            .input()
            .push(Value::Stream(vec![
                Value::Number(1.0),
                Value::Number(2.0),
                Value::Number(3.0),
                Value::Number(4.0),
            ]))
            .unwrap();

        fork.start();
        even.start();

        assert_eq!(
            fork.main().output().map("true").unwrap().pull().unwrap(),
            Value::Stream(vec![Value::Number(2.0), Value::Number(4.0)])
        );
        assert_eq!(
            fork.main().output().map("false").unwrap().pull().unwrap(),
            Value::Stream(vec![Value::Number(1.0), Value::Number(3.0)])
        );

        fork.stop();
        even.stop();
    }
}
