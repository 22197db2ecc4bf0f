//! Operators: named graph nodes with typed services and a worker.
//!
//! An operator owns its ports and its children. Leaf operators run a worker
//! function on a dedicated thread; composite operators have no worker, their
//! ports act as connection hubs while the children do the work. Stopping is
//! cooperative and two-phased: every port in the subtree is closed first,
//! then workers are joined, so a worker parked on a pull or push always
//! wakes up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::core::definition::{OperatorDef, Properties, ServiceDef, MAIN_SERVICE};
use crate::core::error::BuildError;
use crate::core::port::{Direction, Port};

/// Worker function run on the operator's thread after `start()`.
pub type WorkerFn = fn(Operator);

/// Builtin property hook, invoked once at build time.
pub type PropertyFn = fn(&Operator, &Properties) -> Result<(), BuildError>;

/// Builtin connect hook, invoked when an edge into this operator is wired.
/// Arguments are the operator, the destination port and the source port.
pub type ConnectHookFn = fn(&Operator, &Port, &Port) -> Result<(), BuildError>;

/// A named (in, out) port pair.
#[derive(Clone)]
pub struct Service {
    name: String,
    input: Port,
    output: Port,
}

impl Service {
    fn new(operator: &str, name: &str, def: &ServiceDef) -> Service {
        Service {
            name: name.to_string(),
            input: Port::from_type(
                &def.input,
                Direction::In,
                format!("{operator}.{name}.in"),
            ),
            output: Port::from_type(
                &def.output,
                Direction::Out,
                format!("{operator}.{name}.out"),
            ),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> &Port {
        &self.input
    }

    pub fn output(&self) -> &Port {
        &self.output
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Built,
    Running,
    Stopped,
}

struct OperatorInner {
    name: String,
    id: Uuid,
    services: HashMap<String, Service>,
    delegates: HashMap<String, Service>,
    worker: Option<WorkerFn>,
    connect_hook: Option<ConnectHookFn>,
    properties: Mutex<Properties>,
    parent: Mutex<Option<Weak<OperatorInner>>>,
    children: Mutex<HashMap<String, Operator>>,
    stop_flag: AtomicBool,
    state: Mutex<Lifecycle>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to an operator instance. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Operator {
    inner: Arc<OperatorInner>,
}

impl Operator {
    /// Allocates an operator with ports built from `def`. The definition
    /// must declare a `main` service and every port type must validate.
    pub fn new(
        name: &str,
        worker: Option<WorkerFn>,
        connect_hook: Option<ConnectHookFn>,
        def: &OperatorDef,
    ) -> Result<Operator, BuildError> {
        if !def.services.contains_key(MAIN_SERVICE) {
            return Err(BuildError::Definition(format!(
                "operator '{name}' declares no '{MAIN_SERVICE}' service"
            )));
        }
        for (svc_name, svc) in def.services.iter().chain(def.delegates.iter()) {
            svc.input.validate().map_err(|e| {
                BuildError::Definition(format!("{name}.{svc_name}.in: {e}"))
            })?;
            svc.output.validate().map_err(|e| {
                BuildError::Definition(format!("{name}.{svc_name}.out: {e}"))
            })?;
        }
        let services = def
            .services
            .iter()
            .map(|(svc_name, svc)| (svc_name.clone(), Service::new(name, svc_name, svc)))
            .collect();
        let delegates = def
            .delegates
            .iter()
            .map(|(dlg_name, dlg)| (dlg_name.clone(), Service::new(name, dlg_name, dlg)))
            .collect();
        Ok(Operator {
            inner: Arc::new(OperatorInner {
                name: name.to_string(),
                id: Uuid::new_v4(),
                services,
                delegates,
                worker,
                connect_hook,
                properties: Mutex::new(Properties::new()),
                parent: Mutex::new(None),
                children: Mutex::new(HashMap::new()),
                stop_flag: AtomicBool::new(false),
                state: Mutex::new(Lifecycle::Built),
                handle: Mutex::new(None),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The main service.
    pub fn main(&self) -> &Service {
        self.inner
            .services
            .get(MAIN_SERVICE)
            .expect("constructor guarantees a main service")
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.inner.services.get(name)
    }

    pub fn delegate(&self, name: &str) -> Option<&Service> {
        self.inner.delegates.get(name)
    }

    pub fn delegates(&self) -> impl Iterator<Item = &Service> {
        self.inner.delegates.values()
    }

    pub fn connect_hook(&self) -> Option<ConnectHookFn> {
        self.inner.connect_hook
    }

    pub fn set_properties(&self, properties: Properties) {
        *self.inner.properties.lock() = properties;
    }

    pub fn property(&self, name: &str) -> Option<serde_json::Value> {
        self.inner.properties.lock().get(name).cloned()
    }

    /// Registers this operator as a child of `parent` under its own name.
    pub fn set_parent(&self, parent: &Operator) {
        *self.inner.parent.lock() = Some(Arc::downgrade(&parent.inner));
        parent
            .inner
            .children
            .lock()
            .insert(self.inner.name.clone(), self.clone());
    }

    pub fn parent(&self) -> Option<Operator> {
        self.inner
            .parent
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Operator { inner })
    }

    pub fn child(&self, name: &str) -> Option<Operator> {
        self.inner.children.lock().get(name).cloned()
    }

    pub fn children(&self) -> Vec<Operator> {
        self.inner.children.lock().values().cloned().collect()
    }

    /// Cooperative stop signal; workers check this between pulls.
    pub fn should_stop(&self) -> bool {
        self.inner.stop_flag.load(Ordering::Relaxed)
    }

    pub fn running(&self) -> bool {
        *self.inner.state.lock() == Lifecycle::Running
    }

    /// Starts children recursively, then spawns this operator's worker.
    pub fn start(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == Lifecycle::Running {
                return;
            }
            *state = Lifecycle::Running;
        }
        self.inner.stop_flag.store(false, Ordering::Relaxed);
        for child in self.children() {
            child.start();
        }
        if let Some(worker) = self.inner.worker {
            let op = self.clone();
            *self.inner.handle.lock() = Some(std::thread::spawn(move || worker(op)));
        }
        tracing::info!(operator = %self.inner.name, "operator started");
    }

    /// Stops the whole subtree: signals every stop flag, closes every port
    /// top-down, then joins the workers. Closing before joining guarantees
    /// a blocked worker wakes with `PortError::Closed` and exits.
    pub fn stop(&self) {
        self.signal_stop();
        self.close_ports();
        self.join_workers();
        tracing::info!(operator = %self.inner.name, "operator stopped");
    }

    fn signal_stop(&self) {
        self.inner.stop_flag.store(true, Ordering::Relaxed);
        for child in self.children() {
            child.signal_stop();
        }
    }

    fn close_ports(&self) {
        for service in self
            .inner
            .services
            .values()
            .chain(self.inner.delegates.values())
        {
            service.input().close();
            service.output().close();
        }
        for child in self.children() {
            child.close_ports();
        }
    }

    fn join_workers(&self) {
        if let Some(handle) = self.inner.handle.lock().take() {
            if handle.join().is_err() {
                tracing::warn!(operator = %self.inner.name, "worker thread panicked");
            }
        }
        for child in self.children() {
            child.join_workers();
        }
        *self.inner.state.lock() = Lifecycle::Stopped;
    }
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .field("running", &self.running())
            .finish()
    }
}
