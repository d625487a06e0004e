//! Helpers for waiting on controller events and state

use galleria_scan::ScanEvent;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Collect events until one matches `done` or `timeout` passes.
///
/// The matching event is the last element. If nothing matched, the result
/// holds whatever arrived in time.
pub fn recv_until<F>(rx: &Receiver<ScanEvent>, timeout: Duration, mut done: F) -> Vec<ScanEvent>
where
    F: FnMut(&ScanEvent) -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(event) => {
                let matched = done(&event);
                events.push(event);
                if matched {
                    return events;
                }
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return events;
            }
        }
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
pub fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}
