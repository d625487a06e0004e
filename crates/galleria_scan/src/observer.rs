//! Cooperative cancellation and initialization observers
//!
//! Long-running collaborator operations poll an observer between units of
//! work and return early once it says stop. Nothing is ever interrupted
//! forcibly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Polled by long-running operations at their checkpoints.
pub trait CancellationObserver: Send + Sync {
    /// `false` asks the operation to stop at its next checkpoint.
    fn should_continue(&self) -> bool;
}

/// Shared continue/stop flag.
///
/// Uses an AtomicBool internally. Clone is cheap and shares state. A fresh
/// flag says stop until [`ContinueFlag::arm`] is called.
#[derive(Debug, Clone, Default)]
pub struct ContinueFlag {
    keep_going: Arc<AtomicBool>,
}

impl ContinueFlag {
    /// Create a new flag (not armed).
    pub fn new() -> Self {
        Self {
            keep_going: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Allow the operation to proceed.
    pub fn arm(&self) {
        self.keep_going.store(true, Ordering::SeqCst);
    }

    /// Ask the operation to stop.
    pub fn halt(&self) {
        self.keep_going.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.keep_going.load(Ordering::SeqCst)
    }
}

impl CancellationObserver for ContinueFlag {
    fn should_continue(&self) -> bool {
        self.is_armed()
    }
}

/// Outcome of a schema update reported by the storage layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaUpdateResult {
    Success,
    Error,
    ErrorMustAbort,
}

/// Callbacks the storage layer uses while checking or updating the database.
///
/// Called from the worker thread.
pub trait InitializationObserver: CancellationObserver {
    /// A human-readable failure message.
    fn error(&self, message: &str);

    /// A schema update step completed.
    fn schema_update_progress(&self, message: &str, steps: u32);

    /// The update discovered `count` more steps than announced.
    fn more_schema_update_steps(&self, count: u32);

    fn finished_schema_update(&self, result: SchemaUpdateResult);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_starts_halted() {
        let flag = ContinueFlag::new();
        assert!(!flag.should_continue());
    }

    #[test]
    fn test_flag_clones_share_state() {
        let flag = ContinueFlag::new();
        let observer: Arc<dyn CancellationObserver> = Arc::new(flag.clone());

        flag.arm();
        assert!(observer.should_continue());

        flag.halt();
        assert!(!observer.should_continue());
    }
}
