//! Bounded value FIFO backing primitive port leaves.
//!
//! Push blocks while the queue is at capacity, pull blocks while it is
//! empty. Closing wakes both sides; a closed channel still hands out
//! whatever was queued before failing with `PortError::Closed`, so nothing
//! already pushed is lost on shutdown.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::core::error::PortError;
use crate::core::value::Value;

pub(crate) struct ValueChannel {
    state: Mutex<State>,
    readable: Condvar,
    writable: Condvar,
}

struct State {
    queue: VecDeque<Value>,
    capacity: Option<usize>,
    closed: bool,
}

impl ValueChannel {
    pub(crate) fn bounded(capacity: usize) -> ValueChannel {
        ValueChannel::with_capacity(Some(capacity))
    }

    pub(crate) fn unbounded() -> ValueChannel {
        ValueChannel::with_capacity(None)
    }

    fn with_capacity(capacity: Option<usize>) -> ValueChannel {
        ValueChannel {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                capacity,
                closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    pub(crate) fn push(&self, value: Value) -> Result<(), PortError> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(PortError::Closed);
            }
            match state.capacity {
                Some(cap) if state.queue.len() >= cap => self.writable.wait(&mut state),
                _ => break,
            }
        }
        state.queue.push_back(value);
        self.readable.notify_one();
        Ok(())
    }

    pub(crate) fn pull(&self) -> Result<Value, PortError> {
        let mut state = self.state.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                self.writable.notify_one();
                return Ok(value);
            }
            if state.closed {
                return Err(PortError::Closed);
            }
            self.readable.wait(&mut state);
        }
    }

    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
