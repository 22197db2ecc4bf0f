//! `eval`: pure expression evaluator. The `expression` property is compiled
//! at build time; at runtime each pulled map binds its fields as variables.

use std::collections::HashMap;

use crate::core::definition::{OperatorDef, Properties};
use crate::core::error::BuildError;
use crate::core::operator::Operator;
use crate::core::types::TypeDef;
use crate::core::value::Value;
use crate::core::Result;

use super::expr::Expr;
use super::BuiltinConfig;

pub(crate) fn config() -> BuiltinConfig {
    BuiltinConfig {
        def: OperatorDef::with_main(
            TypeDef::generic("argsType"),
            TypeDef::generic("resultType"),
        ),
        worker,
        property_fn: Some(properties),
        connect_hook: None,
    }
}

fn properties(_op: &Operator, props: &Properties) -> std::result::Result<(), BuildError> {
    compile(props.get("expression"))?;
    Ok(())
}

fn compile(raw: Option<&serde_json::Value>) -> std::result::Result<Expr, BuildError> {
    let src = raw
        .and_then(|v| v.as_str())
        .ok_or_else(|| BuildError::Property("eval requires an 'expression' property".to_string()))?;
    Expr::parse(src).map_err(|e| BuildError::Property(format!("invalid expression: {e}")))
}

fn worker(op: Operator) {
    super::run_worker(op, run);
}

fn run(op: &Operator) -> Result<()> {
    let expression = op.property("expression");
    let expr = compile(expression.as_ref())?;
    let input = op.main().input().clone();
    let out = op.main().output().clone();

    while !op.should_stop() {
        match input.pull()? {
            Value::Marker(marker) => out.push(Value::Marker(marker))?,
            Value::Map(fields) => {
                let result = match expr.eval(&fields) {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!(operator = %op.name(), error = %e, "evaluation failed");
                        Value::Null
                    }
                };
                out.push(result)?;
            }
            // A non-map input binds as the single variable `value`.
            other => {
                let bindings = HashMap::from([("value".to_string(), other)]);
                let result = expr.eval(&bindings).unwrap_or(Value::Null);
                out.push(result)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::definition::InstanceDef;
    use crate::elem::make_operator;

    fn eval_operator(expression: &str) -> std::result::Result<Operator, BuildError> {
        make_operator(
            &InstanceDef::new("eval")
                .generic(
                    "argsType",
                    TypeDef::map([("a", TypeDef::Number), ("b", TypeDef::Number)]),
                )
                .generic("resultType", TypeDef::Number)
                .property("expression", serde_json::json!(expression)),
        )
    }

    #[test]
    fn test_is_registered() {
        assert!(crate::elem::registry().is_registered("eval"));
    }

    #[test]
    fn test_evaluates_over_input_fields() {
        let op = eval_operator("a * 10 + b").unwrap();
        op.main().output().bufferize();
        op.start();
        op.main()
            .input()
            .push(Value::Map(HashMap::from([
                ("a".to_string(), Value::Number(4.0)),
                ("b".to_string(), Value::Number(2.0)),
            ])))
            .unwrap();
        assert_eq!(op.main().output().pull().unwrap(), Value::Number(42.0));
        op.stop();
    }

    #[test]
    fn test_missing_expression_property() {
        let err = make_operator(
            &InstanceDef::new("eval")
                .generic("argsType", TypeDef::Number)
                .generic("resultType", TypeDef::Number),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::Property(_)));
    }

    #[test]
    fn test_unparsable_expression_property() {
        let err = eval_operator("a +").unwrap_err();
        assert!(matches!(err, BuildError::Property(_)));
    }

    #[test]
    fn test_evaluation_error_becomes_null() {
        let op = eval_operator("a + missing").unwrap();
        op.main().output().bufferize();
        op.start();
        op.main()
            .input()
            .push(Value::Map(HashMap::from([
                ("a".to_string(), Value::Number(1.0)),
                ("b".to_string(), Value::Number(1.0)),
            ])))
            .unwrap();
        assert_eq!(op.main().output().pull().unwrap(), Value::Null);
        op.stop();
    }
}
