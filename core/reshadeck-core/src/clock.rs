use chrono::Utc;

/// Wall-clock source in epoch seconds.
///
/// Crash artifacts are timestamped by file mtime, so comparisons happen in
/// wall-clock seconds rather than monotonic instants.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        let now = Utc::now();
        now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
    }
}
