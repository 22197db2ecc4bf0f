//! `slang.files.read`: reads a file path into `{content, error}`. Failures
//! travel as data on the `error` field, never as worker errors.

use std::collections::HashMap;

use crate::core::definition::OperatorDef;
use crate::core::operator::Operator;
use crate::core::types::TypeDef;
use crate::core::value::Value;
use crate::core::Result;

use super::BuiltinConfig;

pub(crate) fn config() -> BuiltinConfig {
    BuiltinConfig {
        def: OperatorDef::with_main(
            TypeDef::String,
            TypeDef::map([("content", TypeDef::Binary), ("error", TypeDef::String)]),
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
            v => {
                let path = v.as_str().unwrap_or_default().to_string();
                let (content, error) = match std::fs::read(&path) {
                    Ok(bytes) => (Value::Binary(bytes), Value::Null),
                    Err(e) => (Value::Null, Value::String(e.to_string())),
                };
                out.push(Value::Map(HashMap::from([
                    ("content".to_string(), content),
                    ("error".to_string(), error),
                ])))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::definition::InstanceDef;
    use crate::core::port::Primitive;
    use crate::elem::make_operator;
    use std::io::Write;

    fn file_read() -> Operator {
        make_operator(&InstanceDef::new("slang.files.read")).unwrap()
    }

    #[test]
    fn test_is_registered() {
        assert!(crate::elem::registry().is_registered("slang.files.read"));
    }

    #[test]
    fn test_port_shapes() {
        let op = file_read();
        assert_eq!(op.main().input().primitive(), Some(Primitive::String));
        let out = op.main().output();
        assert_eq!(
            out.map("content").unwrap().primitive(),
            Some(Primitive::Binary)
        );
        assert_eq!(
            out.map("error").unwrap().primitive(),
            Some(Primitive::String)
        );
    }

    #[test]
    fn test_reads_existing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello slang").unwrap();

        let op = file_read();
        op.main().output().bufferize();
        op.start();
        op.main()
            .input()
            .push(Value::String(file.path().to_string_lossy().into_owned()))
            .unwrap();

        assert_eq!(
            op.main().output().map("content").unwrap().pull().unwrap(),
            Value::Binary(b"hello slang".to_vec())
        );
        assert_eq!(
            op.main().output().map("error").unwrap().pull().unwrap(),
            Value::Null
        );
        op.stop();
    }

    #[test]
    fn test_missing_file_reports_error_as_data() {
        let op = file_read();
        op.main().output().bufferize();
        op.start();
        op.main()
            .input()
            .push(Value::String("/does/not/exist".to_string()))
            .unwrap();

        assert_eq!(
            op.main().output().map("content").unwrap().pull().unwrap(),
            Value::Null
        );
        let error = op.main().output().map("error").unwrap().pull().unwrap();
        assert!(matches!(error, Value::String(_)));
        op.stop();
    }
}
