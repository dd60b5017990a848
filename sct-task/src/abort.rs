use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide one-shot cancellation signal. The window loop raises it
/// (Escape); the session and runner check it at the top of every tick
/// and unwind cooperatively instead of exiting from inside the loop.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
