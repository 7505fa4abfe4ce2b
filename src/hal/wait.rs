//! Condition-wait utility: the Rust shape of the `pthread_mutex_t` +
//! `pthread_cond_t` + predicate-flag pattern used throughout the original
//! radio driver for mode-change, transmit, receive and detection signals.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};

/// A single-shot-per-wait boolean signal with a bounded wait.
pub struct Signal {
    state: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Signal {
        Signal {
            state: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Raised from an interrupt-handling thread; wakes exactly one waiter.
    pub fn signal(&self) {
        let mut state = self.state.lock().unwrap();
        *state = true;
        self.cond.notify_all();
    }

    /// Blocks until signalled or `timeout` elapses, then clears the flag.
    pub fn wait(&self, timeout: Duration) -> Result<()> {
        let state = self.state.lock().unwrap();
        let (mut state, result) = self
            .cond
            .wait_timeout_while(state, timeout, |signalled| !*signalled)
            .unwrap();
        let was_signalled = *state;
        *state = false;
        if was_signalled && !result.timed_out() {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Signal::new()
    }
}
