//! Single-shot coalescing timer
//!
//! Every `start()` pushes the deadline out to `now + interval`; the callback
//! runs once when the deadline passes without another `start()`. A burst of
//! starts inside one window therefore fires exactly once.

use crate::error::{Result, ScanError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug)]
struct TimerState {
    deadline: Option<Instant>,
    running: bool,
}

#[derive(Debug)]
struct TimerShared {
    state: Mutex<TimerState>,
    cv: Condvar,
}

impl TimerShared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct CoalescingTimer {
    name: String,
    interval: Duration,
    shared: Arc<TimerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CoalescingTimer {
    /// Spawn the timer thread. `on_fire` runs on that thread, never under the timer lock.
    pub(crate) fn spawn<F>(name: &str, interval: Duration, on_fire: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                deadline: None,
                running: true,
            }),
            cv: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(thread_shared, on_fire))
            .map_err(|source| ScanError::Spawn {
                name: name.to_string(),
                source,
            })?;

        Ok(Self {
            name: name.to_string(),
            interval,
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// (Re)start the countdown.
    pub(crate) fn start(&self) {
        let mut state = self.shared.lock();
        state.deadline = Some(Instant::now() + self.interval);
        trace!(timer = %self.name, "Timer (re)started");
        self.shared.cv.notify_all();
    }

    /// Cancel a pending expiry.
    pub(crate) fn stop(&self) {
        let mut state = self.shared.lock();
        state.deadline = None;
        self.shared.cv.notify_all();
    }

    pub(crate) fn is_active(&self) -> bool {
        self.shared.lock().deadline.is_some()
    }

    /// Stop the timer thread and join it. Idempotent.
    pub(crate) fn shut_down(&self) {
        {
            let mut state = self.shared.lock();
            state.running = false;
            state.deadline = None;
            self.shared.cv.notify_all();
        }

        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for CoalescingTimer {
    fn drop(&mut self) {
        self.shut_down();
    }
}

fn run<F: Fn()>(shared: Arc<TimerShared>, on_fire: F) {
    let mut state = shared.lock();
    loop {
        if !state.running {
            return;
        }

        match state.deadline {
            None => {
                state = shared.cv.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    state.deadline = None;
                    drop(state);
                    on_fire();
                    state = shared.lock();
                } else {
                    state = shared
                        .cv
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_timer(interval: Duration) -> (CoalescingTimer, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let timer = CoalescingTimer::spawn("test-timer", interval, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        (timer, fired)
    }

    #[test]
    fn test_burst_of_starts_fires_once() {
        let (timer, fired) = counting_timer(Duration::from_millis(100));

        for _ in 0..5 {
            timer.start();
            thread::sleep(Duration::from_millis(10));
        }
        assert!(timer.is_active());

        thread::sleep(Duration::from_millis(400));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_active());
    }

    #[test]
    fn test_stop_cancels_expiry() {
        let (timer, fired) = counting_timer(Duration::from_millis(50));

        timer.start();
        timer.stop();

        thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shut_down_is_idempotent() {
        let (timer, _fired) = counting_timer(Duration::from_millis(50));
        timer.shut_down();
        timer.shut_down();
    }
}
