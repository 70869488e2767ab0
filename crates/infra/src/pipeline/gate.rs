use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Pause/resume hook for ingestion.
///
/// When the messaging substrate becomes unavailable (or an operator asks),
/// the gate is closed: ingestion stops at a record boundary so in-memory state
/// is never left half-applied. Workers park on [`PipelineGate::wait_open`]
/// and pick up where they left off once the gate reopens.
#[derive(Debug, Default)]
pub struct PipelineGate {
    paused: Mutex<bool>,
    changed: Condvar,
}

impl PipelineGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the gate. Returns `false` if it was already closed.
    pub fn pause(&self) -> bool {
        let mut paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        let was_open = !*paused;
        *paused = true;
        was_open
    }

    /// Reopen the gate and wake every parked worker. Returns `false` if it was
    /// already open.
    pub fn resume(&self) -> bool {
        let mut paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        let was_closed = *paused;
        *paused = false;
        self.changed.notify_all();
        was_closed
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `timeout` for the gate to be open. Returns whether it is open.
    pub fn wait_open(&self, timeout: Duration) -> bool {
        let paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        let (paused, _) = self
            .changed
            .wait_timeout_while(paused, timeout, |p| *p)
            .unwrap_or_else(PoisonError::into_inner);
        !*paused
    }
}
