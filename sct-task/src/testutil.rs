use sct_timing::{CalibrationStats, Timer};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Virtual-time clock for tests. `sleep` advances time instead of
/// waiting, and clones share the same timeline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ns: Arc<AtomicU64>,
    frames: Arc<AtomicUsize>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.now_ns.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set_frames(&self, n: usize) {
        self.frames.store(n, Ordering::SeqCst);
    }
}

impl Timer for ManualClock {
    type Timestamp = u64;

    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }

    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }

    fn record_frame(&mut self, _d: Duration) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }

    fn frame_count(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    fn calibration_stats(&self) -> CalibrationStats {
        CalibrationStats {
            average_frame_time_ns: 16_000_000.0,
            jitter_ns: 0.0,
            min_frame_time_ns: 16_000_000.0,
            max_frame_time_ns: 16_000_000.0,
            effective_fps: 62.5,
        }
    }
}
