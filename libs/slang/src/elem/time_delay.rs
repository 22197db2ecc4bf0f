//! `slang.time.delay`: holds each item for its per-item delay. Items are
//! processed one at a time, so the delay shifts timing but never order.

use std::time::Duration;

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
                ("item", TypeDef::generic("itemType")),
                ("delay", TypeDef::Number),
            ]),
            TypeDef::generic("itemType"),
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
                let millis = fields
                    .remove("delay")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0)
                    .max(0.0);
                let item = fields.remove("item").unwrap_or(Value::Null);
                std::thread::sleep(Duration::from_millis(millis as u64));
                out.push(item)?;
            }
            other => tracing::warn!(
                operator = %op.name(),
                got = other.kind(),
                "expected {{item, delay}}, skipping"
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
    use crate::testutil::assert_port_pushes;
    use std::collections::HashMap;
    use std::time::Instant;

    fn delayed(item: f64, delay: f64) -> Value {
        Value::Map(HashMap::from([
            ("item".to_string(), Value::Number(item)),
            ("delay".to_string(), Value::Number(delay)),
        ]))
    }

    #[test]
    fn test_is_registered() {
        assert!(crate::elem::registry().is_registered("slang.time.delay"));
    }

    #[test]
    fn test_delay_preserves_order() {
        let op = make_operator(
            &InstanceDef::new("slang.time.delay").generic("itemType", TypeDef::Number),
        )
        .unwrap();
        op.main().output().bufferize();

        op.main().input().push(delayed(1.0, 50.0)).unwrap();
        op.main().input().push(delayed(2.0, 10.0)).unwrap();

        let begin = Instant::now();
        op.start();
        assert_port_pushes(
            &[Value::Number(1.0), Value::Number(2.0)],
            op.main().output(),
        );
        assert!(begin.elapsed() >= Duration::from_millis(60));
        op.stop();
    }

    #[test]
    fn test_markers_pass_through_undelayed() {
        let op = make_operator(
            &InstanceDef::new("slang.time.delay").generic("itemType", TypeDef::Number),
        )
        .unwrap();
        op.main().output().bufferize();
        op.start();

        let marker = Value::Marker(crate::core::value::Marker::bos(
            crate::core::port::PortId::next(),
        ));
        op.main().input().push(marker.clone()).unwrap();
        assert_eq!(op.main().output().pull().unwrap(), marker);
        op.stop();
    }
}
