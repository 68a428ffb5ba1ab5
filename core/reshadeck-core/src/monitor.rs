//! Post-activation crash watching.
//!
//! After every state-changing activation a watcher polls the crash signal
//! source for a bounded window. A signal counts as new only when it is newer
//! than both the watcher's start and the ledger's last recorded crash, so old
//! coredumps never trigger a false positive.
//!
//! On detection the watcher releases its slot, commits the disable (state,
//! store, ledger) without suspending, and only then awaits the clearing
//! activation. An abort can therefore never land between the decision and its
//! side effects.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::EngineContext;
use crate::supervisor::TaskSlot;

const MIN_POLL: Duration = Duration::from_millis(100);

pub struct CrashMonitor {
    slot: TaskSlot,
    poll: Duration,
    window: Duration,
}

impl CrashMonitor {
    pub(crate) fn new(poll: Duration, window: Duration) -> Self {
        CrashMonitor {
            slot: TaskSlot::new("crash-monitor"),
            poll: poll.max(MIN_POLL),
            window,
        }
    }

    /// Starts a watcher for `shader`, aborting any previous one.
    pub(crate) fn start(&self, ctx: &Arc<EngineContext>, shader: &str) {
        let started_at = ctx.clock.now();
        let ctx = Arc::clone(ctx);
        let shader = shader.to_string();
        let (poll, window) = (self.poll, self.window);
        self.slot.replace(move |generation| {
            watch(ctx, generation, started_at, shader, poll, window)
        });
    }

    pub(crate) fn cancel(&self) -> bool {
        self.slot.cancel()
    }

    pub fn is_active(&self) -> bool {
        self.slot.is_active()
    }
}

async fn watch(
    ctx: Arc<EngineContext>,
    generation: u64,
    started_at: f64,
    shader: String,
    poll: Duration,
    window: Duration,
) {
    info!(
        shader = %shader,
        window_secs = window.as_secs_f64(),
        "Crash monitor started"
    );
    let started = Instant::now();

    while started.elapsed() < window {
        tokio::time::sleep(poll).await;

        let Some(timestamp) = ctx.crash_source.latest_crash_timestamp() else {
            continue;
        };
        if timestamp <= started_at {
            continue;
        }
        let last_recorded = ctx.ledger.read().last_timestamp_secs();
        if timestamp <= last_recorded {
            debug!(timestamp, last_recorded, "Crash artifact already handled");
            continue;
        }

        if !ctx.monitor.slot.release(generation) {
            return;
        }
        warn!(
            shader = %shader,
            timestamp,
            after_secs = started.elapsed().as_secs_f64(),
            "Compositor crash detected; disabling shaders"
        );
        ctx.commit_crash(timestamp);
        ctx.clear_effect().await;
        return;
    }

    ctx.monitor.slot.release(generation);
    info!(shader = %shader, "Crash monitor window elapsed without a crash");
}

/// One-shot startup probe for a crash the previous session left behind.
///
/// Returns the crash timestamp when it is newer than the ledger and no older
/// than `recency_secs`.
pub(crate) fn canary_check(ctx: &EngineContext, recency_secs: f64) -> Option<f64> {
    let timestamp = ctx.crash_source.latest_crash_timestamp()?;
    let last_recorded = ctx.ledger.read().last_timestamp_secs();
    let age = ctx.clock.now() - timestamp;

    if timestamp > last_recorded && age <= recency_secs {
        Some(timestamp)
    } else {
        debug!(timestamp, last_recorded, age, "Canary check passed");
        None
    }
}
