//! Running-operator manager.
//!
//! Wraps a started operator with an input pump and per-leaf output readers
//! so external callers can feed values in and poll results out without
//! touching ports directly. Halting is synchronous with respect to the
//! outgoing channel: readers drain their port completely before exiting,
//! so every value emitted before the stop is still observable afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::core::error::{Error, PortError, RuntimeError};
use crate::core::operator::Operator;
use crate::core::value::Value;

/// One value observed on a primitive out-port leaf, in wire form.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PortOutput {
    pub handle: String,
    pub port: String,
    pub data: serde_json::Value,
    #[serde(rename = "isBOS")]
    pub is_bos: bool,
    #[serde(rename = "isEOS")]
    pub is_eos: bool,
}

pub struct RunningOperator {
    handle: String,
    operator: Operator,
    incoming: Mutex<Option<Sender<Value>>>,
    outgoing: Receiver<PortOutput>,
    pump: Mutex<Option<JoinHandle<()>>>,
    readers: Mutex<Vec<JoinHandle<()>>>,
}

impl RunningOperator {
    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// Feeds one value into the operator's main in-port.
    pub fn push_input(&self, value: Value) -> Result<(), Error> {
        let incoming = self.incoming.lock();
        let sender = incoming.as_ref().ok_or(Error::Port(PortError::Closed))?;
        sender.send(value).map_err(|_| Error::Port(PortError::Closed))
    }

    /// Values observed on the main out-port leaves, in emission order per
    /// leaf. Disconnects once the operator is halted and drained.
    pub fn outgoing(&self) -> &Receiver<PortOutput> {
        &self.outgoing
    }
}

/// Mutex-guarded table of running operators, keyed by opaque handle.
#[derive(Default)]
pub struct RunningOperatorManager {
    ops: Mutex<HashMap<String, Arc<RunningOperator>>>,
}

impl RunningOperatorManager {
    pub fn new() -> RunningOperatorManager {
        RunningOperatorManager::default()
    }

    /// Bufferizes the operator's main out-port, starts it and spawns the
    /// I/O pumps.
    pub fn run(&self, operator: Operator) -> Arc<RunningOperator> {
        let handle = Uuid::new_v4().simple().to_string();
        operator.main().output().bufferize();
        operator.start();

        let (in_tx, in_rx) = unbounded::<Value>();
        let pump_op = operator.clone();
        let pump = std::thread::spawn(move || {
            while let Ok(value) = in_rx.recv() {
                if pump_op.main().input().push(value).is_err() {
                    break;
                }
            }
        });

        let (out_tx, out_rx) = unbounded::<PortOutput>();
        let mut readers = Vec::new();
        operator.main().output().walk_primitive_ports(&mut |leaf| {
            let leaf = leaf.clone();
            let tx = out_tx.clone();
            let reader_handle = handle.clone();
            readers.push(std::thread::spawn(move || {
                loop {
                    match leaf.pull() {
                        Ok(value) => {
                            let record = PortOutput {
                                handle: reader_handle.clone(),
                                port: leaf.to_string(),
                                data: value.to_wire(),
                                is_bos: value.is_bos(),
                                is_eos: value.is_eos(),
                            };
                            if tx.send(record).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            }));
        });
        drop(out_tx);

        let running = Arc::new(RunningOperator {
            handle: handle.clone(),
            operator,
            incoming: Mutex::new(Some(in_tx)),
            outgoing: out_rx,
            pump: Mutex::new(Some(pump)),
            readers: Mutex::new(readers),
        });
        self.ops.lock().insert(handle.clone(), Arc::clone(&running));
        tracing::info!(operator = %running.operator.name(), handle = %handle, "operator running");
        running
    }

    pub fn get(&self, handle: &str) -> Option<Arc<RunningOperator>> {
        self.ops.lock().get(handle).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        self.ops.lock().keys().cloned().collect()
    }

    /// Stops the operator, joins the pumps and removes the record. Returns
    /// once the outgoing channel holds everything the operator emitted.
    pub fn halt(&self, handle: &str) -> Result<(), Error> {
        let running = self
            .ops
            .lock()
            .remove(handle)
            .ok_or_else(|| RuntimeError::UnknownHandle(handle.to_string()))?;
        running.incoming.lock().take();
        running.operator.stop();
        if let Some(pump) = running.pump.lock().take() {
            let _ = pump.join();
        }
        for reader in running.readers.lock().drain(..) {
            let _ = reader.join();
        }
        tracing::info!(handle = %handle, "operator halted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::definition::OperatorDef;
    use crate::core::types::TypeDef;

    fn echo_worker(op: Operator) {
        let input = op.main().input().clone();
        let output = op.main().output().clone();
        while !op.should_stop() {
            let Ok(v) = input.pull() else { break };
            if output.push(v).is_err() {
                break;
            }
        }
    }

    fn echo() -> Operator {
        Operator::new(
            "echo",
            Some(echo_worker),
            None,
            &OperatorDef::with_main(TypeDef::Number, TypeDef::Number),
        )
        .unwrap()
    }

    #[test]
    fn test_run_push_poll_halt() {
        let manager = RunningOperatorManager::new();
        let running = manager.run(echo());

        running.push_input(Value::Number(1.0)).unwrap();
        running.push_input(Value::Number(2.0)).unwrap();

        let first = running.outgoing().recv().unwrap();
        assert_eq!(first.data, serde_json::json!(1.0));
        assert_eq!(first.port, "echo.main.out");
        assert!(!first.is_bos && !first.is_eos);
        assert_eq!(
            running.outgoing().recv().unwrap().data,
            serde_json::json!(2.0)
        );

        manager.halt(running.handle()).unwrap();
        assert!(manager.get(running.handle()).is_none());
        assert!(running.push_input(Value::Number(3.0)).is_err());
    }

    #[test]
    fn test_halt_preserves_emitted_values() {
        let manager = RunningOperatorManager::new();
        let running = manager.run(echo());
        for i in 0..10 {
            running.push_input(Value::Number(f64::from(i))).unwrap();
        }
        // Give the worker a moment to move everything through.
        std::thread::sleep(std::time::Duration::from_millis(50));
        manager.halt(running.handle()).unwrap();

        let collected: Vec<PortOutput> = running.outgoing().try_iter().collect();
        assert_eq!(collected.len(), 10);
        assert_eq!(collected[9].data, serde_json::json!(9.0));
    }

    #[test]
    fn test_halt_unknown_handle() {
        let manager = RunningOperatorManager::new();
        assert!(manager.halt("bogus").is_err());
    }
}
