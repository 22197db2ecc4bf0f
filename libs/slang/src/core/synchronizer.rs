//! Token-based correlator for delegate round-trips.
//!
//! Control-flow operators dispatch work items on a delegate out-port and
//! collect results on the delegate in-port. The delegated sub-graph may be
//! arbitrarily wired, so the synchronizer pairs each dispatched item with
//! the result that belongs to it: pushes enqueue a token under a mutex, a
//! single worker thread services tokens strictly in queue order, and each
//! pull rendezvouses with the worker through its token's slot. The i-th
//! caller to push is therefore the i-th to have its pull executed.
//!
//! Closing the dispatch port cancels the synchronizer: further pushes are
//! rejected and pullers whose token was not serviced yet receive
//! [`SyncError::Cancelled`], whether they were about to wait or already
//! blocked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;

use crate::core::error::{PortError, SyncError};
use crate::core::port::Port;

/// How often a waiting puller re-checks the dispatch port for closure.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Opaque correlation token. Tokens are a per-synchronizer monotonically
/// increasing counter, so collisions cannot happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

type Task = Box<dyn FnOnce(&Port) + Send>;

type Slot = (Sender<Task>, Receiver<Task>);

pub struct Synchronizer {
    out: Port,
    queue: Sender<Token>,
    slots: Arc<Mutex<HashMap<Token, Slot>>>,
    counter: AtomicU64,
    push_lock: Mutex<()>,
}

impl Synchronizer {
    /// Creates a synchronizer over a delegate's collect (in) and dispatch
    /// (out) ports and spawns its worker thread. The worker exits when the
    /// synchronizer is dropped.
    pub fn new(input: Port, output: Port) -> Synchronizer {
        let (queue_tx, queue_rx) = unbounded::<Token>();
        let slots: Arc<Mutex<HashMap<Token, Slot>>> = Arc::new(Mutex::new(HashMap::new()));
        let worker_slots = Arc::clone(&slots);
        std::thread::spawn(move || worker_loop(input, queue_rx, worker_slots));
        Synchronizer {
            out: output,
            queue: queue_tx,
            slots,
            counter: AtomicU64::new(0),
            push_lock: Mutex::new(()),
        }
    }

    /// Emits a work item on the dispatch port and enqueues a fresh token
    /// for it. The emit and the enqueue happen under one lock so queue
    /// order matches dispatch order. Fails with [`SyncError::Cancelled`]
    /// when the dispatch port is closed; no token is minted in that case.
    pub fn push(
        &self,
        emit: impl FnOnce(&Port) -> Result<(), PortError>,
    ) -> Result<Token, SyncError> {
        let _ordered = self.push_lock.lock();
        if self.out.closed() {
            return Err(SyncError::Cancelled);
        }
        emit(&self.out).map_err(|e| match e {
            PortError::Closed => SyncError::Cancelled,
            other => SyncError::Dispatch(other.to_string()),
        })?;
        let token = Token(self.counter.fetch_add(1, Ordering::Relaxed));
        self.slots.lock().insert(token, bounded::<Task>(0));
        // The worker only sees the token after its slot exists.
        let _ = self.queue.send(token);
        Ok(token)
    }

    /// Hands `collect` to the worker for `token` and waits for its result.
    /// Returns [`SyncError::Cancelled`] when the dispatch port closes
    /// before the token is serviced, including while already waiting.
    pub fn pull<T, F>(&self, token: Token, collect: F) -> Result<T, SyncError>
    where
        T: Send + 'static,
        F: FnOnce(&Port) -> T + Send + 'static,
    {
        let (result_tx, result_rx) = bounded::<T>(1);
        let mut task: Task = Box::new(move |port| {
            let _ = result_tx.send(collect(port));
        });
        let task_tx = self
            .slots
            .lock()
            .get(&token)
            .map(|(tx, _)| tx.clone())
            .ok_or(SyncError::UnknownToken)?;
        if self.out.closed() {
            return self.cancel(token);
        }
        // Rendezvous with the worker; it may still be busy with earlier
        // tokens, so keep an eye on the dispatch port meanwhile.
        loop {
            match task_tx.send_timeout(task, CANCEL_POLL) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(returned)) => {
                    task = returned;
                    if self.out.closed() {
                        return self.cancel(token);
                    }
                }
                Err(SendTimeoutError::Disconnected(_)) => return self.cancel(token),
            }
        }
        let result = loop {
            match result_rx.recv_timeout(CANCEL_POLL) {
                Ok(result) => break result,
                Err(RecvTimeoutError::Disconnected) => return self.cancel(token),
                Err(RecvTimeoutError::Timeout) => {
                    if self.out.closed() {
                        // The worker may have delivered in the meantime.
                        match result_rx.try_recv() {
                            Ok(result) => break result,
                            Err(_) => return self.cancel(token),
                        }
                    }
                }
            }
        };
        self.slots.lock().remove(&token);
        Ok(result)
    }

    fn cancel<T>(&self, token: Token) -> Result<T, SyncError> {
        self.slots.lock().remove(&token);
        Err(SyncError::Cancelled)
    }
}

fn worker_loop(input: Port, queue: Receiver<Token>, slots: Arc<Mutex<HashMap<Token, Slot>>>) {
    while let Ok(token) = queue.recv() {
        let task_rx = slots.lock().get(&token).map(|(_, rx)| rx.clone());
        let Some(task_rx) = task_rx else { continue };
        let Ok(task) = task_rx.recv() else { continue };
        task(&input);
    }
    tracing::debug!("synchronizer worker exited");
}
