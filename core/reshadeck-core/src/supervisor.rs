//! Single-slot task supervision.
//!
//! Each background concern (crash watching, debounced saving) owns one slot.
//! Starting new work in a slot aborts whatever was there, so at most one task
//! per concern is ever alive and the newest event wins.
//!
//! Tasks receive the generation they were started under and call
//! [`TaskSlot::release`] once they stop being cancellable, i.e. right before
//! committing side effects. A release with a stale generation returns `false`
//! and the task must exit without touching anything.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Default)]
struct SlotState {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

pub struct TaskSlot {
    name: &'static str,
    state: Mutex<SlotState>,
}

impl TaskSlot {
    pub fn new(name: &'static str) -> Self {
        TaskSlot {
            name,
            state: Mutex::new(SlotState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Aborts the current occupant (if any) and spawns `make(generation)`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn replace<F, Fut>(&self, make: F) -> u64
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.lock();
        if let Some(previous) = state.handle.take() {
            if !previous.is_finished() {
                debug!(slot = self.name, "Replacing pending task");
            }
            previous.abort();
        }
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;
        state.handle = Some(tokio::spawn(make(generation)));
        generation
    }

    /// Aborts the current occupant. Returns whether a live task was cancelled.
    ///
    /// Safe on an empty slot or an already finished task.
    pub fn cancel(&self) -> bool {
        let mut state = self.lock();
        match state.handle.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                debug!(slot = self.name, "Task cancelled");
                true
            }
            _ => false,
        }
    }

    /// Detaches the task started under `generation` from the slot.
    pub fn release(&self, generation: u64) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.handle = None;
        true
    }

    /// Whether a task is occupying the slot and has not finished.
    pub fn is_active(&self) -> bool {
        self.lock()
            .handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}
