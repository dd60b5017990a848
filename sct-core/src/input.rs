use crate::trial::{KeyClass, KeyPress};
use std::collections::VecDeque;
use std::time::Duration;

/// Non-blocking response input. `poll` returns at most one resolved
/// action per call, stamped with the action time relative to the origin
/// set by the last `reset` (action time, not detection time).
pub trait InputChannel {
    /// Drops anything pending and re-anchors timestamps at `origin_ns`.
    fn reset(&mut self, origin_ns: u64);
    fn poll(&mut self) -> Option<KeyPress>;
}

/// Queue-backed channel. The event source (the window loop, or a test)
/// pushes actions with absolute monotonic timestamps; actions from
/// before the current origin are stale and silently dropped.
#[derive(Debug, Default)]
pub struct QueuedInput {
    origin_ns: u64,
    queue: VecDeque<KeyPress>,
}

impl QueuedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_at(&mut self, key: KeyClass, action_ns: u64) {
        if action_ns < self.origin_ns {
            return;
        }
        self.queue.push_back(KeyPress {
            key,
            rt: Duration::from_nanos(action_ns - self.origin_ns),
        });
    }
}

impl InputChannel for QueuedInput {
    fn reset(&mut self, origin_ns: u64) {
        self.origin_ns = origin_ns;
        self.queue.clear();
    }

    fn poll(&mut self) -> Option<KeyPress> {
        self.queue.pop_front()
    }
}
