//! End-to-end graph scenarios through the public API: definitions go in,
//! wired operator trees come out, values flow.

use std::collections::HashMap;
use std::io::Write;

use slang::{
    build_operator, BuildError, ConnectError, InstanceDef, MemoryStore, OperatorDef,
    RunningOperatorManager, TypeDef, Value,
};

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn numbers(ns: &[f64]) -> Value {
    Value::Stream(ns.iter().map(|n| Value::Number(*n)).collect())
}

/// aggregate wired to an eval delegate computing `state + item`, all built
/// from a declarative composite definition.
#[test]
fn aggregate_sum_through_composite_definition() {
    init_logs();
    let mut def = OperatorDef::with_main(
        TypeDef::map([
            ("init", TypeDef::Number),
            ("items", TypeDef::stream(TypeDef::Number)),
        ]),
        TypeDef::Number,
    );
    def.operators.insert(
        "agg".to_string(),
        InstanceDef::new("aggregate")
            .generic("itemType", TypeDef::Number)
            .generic("stateType", TypeDef::Number),
    );
    def.operators.insert(
        "add".to_string(),
        InstanceDef::new("eval")
            .generic(
                "argsType",
                TypeDef::map([("state", TypeDef::Number), ("item", TypeDef::Number)]),
            )
            .generic("resultType", TypeDef::Number)
            .property("expression", serde_json::json!("state + item")),
    );
    def.connections
        .insert("main.in".to_string(), vec!["agg.main.in".to_string()]);
    def.connections
        .insert("agg.iterator.out".to_string(), vec!["add.main.in".to_string()]);
    def.connections
        .insert("add.main.out".to_string(), vec!["agg.iterator.in".to_string()]);
    def.connections
        .insert("agg.main.out".to_string(), vec!["main.out".to_string()]);

    let mut store = MemoryStore::new();
    store.insert("sum", def);

    let op = build_operator(&InstanceDef::new("sum"), &store).unwrap();
    op.main().output().bufferize();
    op.start();

    let batches: [(f64, &[f64]); 4] = [
        (0.0, &[1.0, 2.0, 3.0]),
        (8.0, &[2.0, 4.0, 6.0]),
        (999.0, &[]),
        (4.0, &[1.0, 2.0, 3.0]),
    ];
    for (init, items) in batches {
        op.main()
            .input()
            .push(Value::Map(HashMap::from([
                ("init".to_string(), Value::Number(init)),
                ("items".to_string(), numbers(items)),
            ])))
            .unwrap();
    }

    for expected in [6.0, 20.0, 999.0, 10.0] {
        assert_eq!(
            op.main().output().pull().unwrap(),
            Value::Number(expected)
        );
    }
    op.stop();
}

/// fork with an is-even eval predicate: both branches come out bracketed
/// and in input order.
#[test]
fn fork_routes_even_and_odd() {
    init_logs();
    let mut def = OperatorDef::with_main(
        TypeDef::stream(TypeDef::Number),
        TypeDef::map([
            ("true", TypeDef::stream(TypeDef::Number)),
            ("false", TypeDef::stream(TypeDef::Number)),
        ]),
    );
    def.operators.insert(
        "forker".to_string(),
        InstanceDef::new("fork").generic("itemType", TypeDef::Number),
    );
    def.operators.insert(
        "pred".to_string(),
        InstanceDef::new("eval")
            .generic("argsType", TypeDef::Number)
            .generic("resultType", TypeDef::Boolean)
            .property("expression", serde_json::json!("value % 2 == 0")),
    );
    def.connections
        .insert("main.in".to_string(), vec!["forker.main.in".to_string()]);
    def.connections.insert(
        "forker.select.out".to_string(),
        vec!["pred.main.in".to_string()],
    );
    def.connections.insert(
        "pred.main.out".to_string(),
        vec!["forker.select.in".to_string()],
    );
    def.connections
        .insert("forker.main.out".to_string(), vec!["main.out".to_string()]);

    let mut store = MemoryStore::new();
    store.insert("even_odd", def);

    let op = build_operator(&InstanceDef::new("even_odd"), &store).unwrap();
    op.main().output().bufferize();
    op.start();

    op.main()
        .input()
        .push(numbers(&[1.0, 2.0, 3.0, 4.0]))
        .unwrap();

    assert_eq!(
        op.main().output().map("true").unwrap().pull().unwrap(),
        numbers(&[2.0, 4.0])
    );
    assert_eq!(
        op.main().output().map("false").unwrap().pull().unwrap(),
        numbers(&[1.0, 3.0])
    );
    op.stop();
}

/// slang.files.read under the running-operator manager, observing the wire
/// representation on the outgoing channel.
#[test]
fn file_read_over_the_runtime_manager() {
    init_logs();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"hello slang").unwrap();

    let store = MemoryStore::new();
    let op = build_operator(&InstanceDef::new("slang.files.read"), &store).unwrap();

    let manager = RunningOperatorManager::new();
    let running = manager.run(op);

    running
        .push_input(Value::String(file.path().to_string_lossy().into_owned()))
        .unwrap();
    running
        .push_input(Value::String("/does/not/exist".to_string()))
        .unwrap();

    // Two values per push, one per out-port leaf.
    let mut by_port: HashMap<String, Vec<serde_json::Value>> = HashMap::new();
    for _ in 0..4 {
        let record = running.outgoing().recv().unwrap();
        assert_eq!(record.handle, running.handle());
        by_port.entry(record.port).or_default().push(record.data);
    }
    manager.halt(running.handle()).unwrap();

    let contents = &by_port["slang.files.read.main.out.content"];
    let errors = &by_port["slang.files.read.main.out.error"];
    use base64::Engine as _;
    assert_eq!(
        contents[0],
        serde_json::json!(base64::engine::general_purpose::STANDARD.encode(b"hello slang"))
    );
    assert_eq!(errors[0], serde_json::Value::Null);
    assert_eq!(contents[1], serde_json::Value::Null);
    assert!(errors[1].is_string());
}

/// Wiring a string source into a number sink fails at build time with a
/// type mismatch naming the ports.
#[test]
fn composite_with_incompatible_edge_fails_to_build() {
    init_logs();
    let mut def = OperatorDef::with_main(TypeDef::String, TypeDef::Number);
    def.operators.insert(
        "child".to_string(),
        InstanceDef::new("eval")
            .generic("argsType", TypeDef::Number)
            .generic("resultType", TypeDef::Number)
            .property("expression", serde_json::json!("value")),
    );
    def.connections
        .insert("main.in".to_string(), vec!["child.main.in".to_string()]);
    def.connections
        .insert("child.main.out".to_string(), vec!["main.out".to_string()]);

    let mut store = MemoryStore::new();
    store.insert("broken", def);

    match build_operator(&InstanceDef::new("broken"), &store) {
        Err(BuildError::Connect(ConnectError::TypeMismatch { src, dst })) => {
            assert!(src.contains("main.in"));
            assert!(dst.contains("child.main.in"));
        }
        other => panic!("expected TypeMismatch, got {other:?}"),
    }
}
