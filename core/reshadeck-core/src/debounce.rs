//! Coalescing of rapid parameter edits.
//!
//! A slider drag fires many edits per second. Each edit restarts one timer;
//! only when it elapses uncancelled does the session get written and the
//! active shader re-applied.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::engine::EngineContext;
use crate::supervisor::TaskSlot;

pub struct DebouncedPersister {
    slot: TaskSlot,
    delay: Duration,
}

impl DebouncedPersister {
    pub(crate) fn new(delay: Duration) -> Self {
        DebouncedPersister {
            slot: TaskSlot::new("debounce"),
            delay,
        }
    }

    /// Restarts the timer.
    pub(crate) fn schedule(&self, ctx: &Arc<EngineContext>) {
        let ctx = Arc::clone(ctx);
        let delay = self.delay;
        self.slot.replace(move |generation| async move {
            tokio::time::sleep(delay).await;
            if !ctx.debouncer.slot.release(generation) {
                return;
            }
            debug!("Debounce elapsed; saving edits");
            ctx.persist();
            ctx.reactivate_with_monitor().await;
        });
    }

    /// Writes a pending edit now. Returns whether anything was pending.
    ///
    /// Only the durable write happens here; callers re-assert activation.
    pub(crate) fn flush(&self, ctx: &EngineContext) -> bool {
        if self.slot.cancel() {
            debug!("Flushing pending edits");
            ctx.persist();
            true
        } else {
            false
        }
    }

    /// Drops a pending edit without writing it.
    pub(crate) fn discard(&self) -> bool {
        self.slot.cancel()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_active()
    }
}
