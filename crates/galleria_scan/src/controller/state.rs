//! Coordinator state guarded by the controller mutex
//!
//! # Lock Invariant
//!
//! Every field lives behind one `Mutex`. The worker holds it only to pick the
//! next unit of work and to publish results; it is never held while a
//! collaborator runs.

use super::Advice;
use std::collections::{HashSet, VecDeque};

/// Completion tracking for one kind of blocking request.
///
/// Each request gets a ticket number. The worker takes all outstanding tickets
/// when it starts the operation and serves them when it finishes; a caller
/// returns once its ticket has been served. [`RequestTicket::cancel`] serves
/// every ticket issued so far; [`RequestTicket::cancel_pending`] leaves a
/// running operation to answer its own callers.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct RequestTicket {
    requested: u64,
    taken: u64,
    served: u64,
}

impl RequestTicket {
    pub(super) fn request(&mut self) -> u64 {
        self.requested += 1;
        self.requested
    }

    /// A request was made that the worker has not started yet.
    pub(super) fn is_pending(&self) -> bool {
        self.taken < self.requested
    }

    pub(super) fn take(&mut self) {
        self.taken = self.requested;
    }

    pub(super) fn serve_taken(&mut self) {
        self.served = self.served.max(self.taken);
    }

    pub(super) fn cancel(&mut self) {
        self.taken = self.requested;
        self.served = self.requested;
    }

    /// Drop requests the worker has not started.
    ///
    /// While an operation runs, the dropped callers join it and are served
    /// with its outcome. Returns true if dropped callers were released now.
    pub(super) fn cancel_pending(&mut self) -> bool {
        let pending = self.is_pending();
        let running = self.served < self.taken;
        self.taken = self.requested;
        if running {
            return false;
        }
        self.served = self.requested;
        pending
    }

    pub(super) fn is_served(&self, ticket: u64) -> bool {
        self.served >= ticket
    }
}

/// Insertion-ordered set of paths waiting for a partial scan
#[derive(Debug, Default)]
pub(super) struct ScanQueue {
    order: VecDeque<String>,
    queued: HashSet<String>,
}

impl ScanQueue {
    /// Returns false if `path` was already queued.
    pub(super) fn push(&mut self, path: &str) -> bool {
        if !self.queued.insert(path.to_string()) {
            return false;
        }
        self.order.push_back(path.to_string());
        true
    }

    pub(super) fn pop(&mut self) -> Option<String> {
        let path = self.order.pop_front()?;
        self.queued.remove(&path);
        Some(path)
    }

    pub(super) fn clear(&mut self) {
        self.order.clear();
        self.queued.clear();
    }

    pub(super) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(super) fn paths(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }
}

/// One unit of work picked by the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Work {
    Initialize,
    CompleteScan {
        defer_file_scanning: bool,
        need_total_files: bool,
    },
    UpdateUniqueHash,
    FinishDeferredScan(Vec<String>),
    PartialScan(String),
}

#[derive(Debug)]
pub(super) struct ControllerState {
    pub(super) running: bool,
    pub(super) initialization: RequestTicket,
    pub(super) complete_scan: RequestTicket,
    pub(super) unique_hash: RequestTicket,
    pub(super) defer_file_scanning: bool,
    pub(super) need_total_files: bool,
    pub(super) scan_tasks: ScanQueue,
    pub(super) deferred_albums: Vec<String>,
    pub(super) finish_scan_allowed: bool,
    pub(super) suspended: u32,
    pub(super) idle: bool,
    pub(super) advice: Advice,
    pub(super) last_init_success: bool,
    pub(super) file_watch_installed: bool,
}

impl ControllerState {
    pub(super) fn new() -> Self {
        Self {
            running: true,
            initialization: RequestTicket::default(),
            complete_scan: RequestTicket::default(),
            unique_hash: RequestTicket::default(),
            defer_file_scanning: false,
            need_total_files: false,
            scan_tasks: ScanQueue::default(),
            deferred_albums: Vec::new(),
            finish_scan_allowed: true,
            suspended: 0,
            idle: false,
            advice: Advice::Success,
            last_init_success: false,
            file_watch_installed: false,
        }
    }

    /// Pick the highest-priority pending work and mark it started.
    pub(super) fn next_work(&mut self) -> Option<Work> {
        if self.initialization.is_pending() {
            self.initialization.take();
            return Some(Work::Initialize);
        }

        if self.complete_scan.is_pending() {
            self.complete_scan.take();
            return Some(Work::CompleteScan {
                defer_file_scanning: self.defer_file_scanning,
                need_total_files: self.need_total_files,
            });
        }

        if self.unique_hash.is_pending() {
            self.unique_hash.take();
            return Some(Work::UpdateUniqueHash);
        }

        if !self.deferred_albums.is_empty() && self.finish_scan_allowed && self.suspended == 0 {
            return Some(Work::FinishDeferredScan(self.deferred_albums.clone()));
        }

        if self.suspended == 0 {
            if let Some(path) = self.scan_tasks.pop() {
                return Some(Work::PartialScan(path));
            }
        }

        None
    }

    /// Drop a pending initialization. Callers of a running one wait for its
    /// outcome.
    pub(super) fn cancel_initialization(&mut self) {
        if self.initialization.cancel_pending() {
            self.advice = Advice::ContinueWithoutDatabase;
        }
    }

    /// Drop all pending requests and queued paths.
    pub(super) fn cancel_pending(&mut self) {
        self.cancel_initialization();
        self.complete_scan.cancel();
        self.unique_hash.cancel();
        self.scan_tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_deduplicates_in_order() {
        let mut queue = ScanQueue::default();
        assert!(queue.push("/a"));
        assert!(queue.push("/b"));
        assert!(!queue.push("/a"));

        assert_eq!(queue.paths(), vec!["/a".to_string(), "/b".to_string()]);
        assert_eq!(queue.pop().as_deref(), Some("/a"));
        // popped paths may be queued again
        assert!(queue.push("/a"));
        assert_eq!(queue.paths(), vec!["/b".to_string(), "/a".to_string()]);
    }

    #[test]
    fn test_ticket_lifecycle() {
        let mut ticket = RequestTicket::default();
        let first = ticket.request();
        assert!(ticket.is_pending());

        ticket.take();
        assert!(!ticket.is_pending());
        assert!(!ticket.is_served(first));

        // a request during the run is not served by it
        let second = ticket.request();
        ticket.serve_taken();
        assert!(ticket.is_served(first));
        assert!(!ticket.is_served(second));
        assert!(ticket.is_pending());
    }

    #[test]
    fn test_ticket_cancel_releases_everyone() {
        let mut ticket = RequestTicket::default();
        let first = ticket.request();
        ticket.take();
        let second = ticket.request();

        ticket.cancel();
        assert!(!ticket.is_pending());
        assert!(ticket.is_served(first));
        assert!(ticket.is_served(second));

        // finishing the in-flight run does not move served backwards
        ticket.serve_taken();
        assert!(ticket.is_served(second));
    }

    #[test]
    fn test_cancel_pending_leaves_running_callers_waiting() {
        let mut ticket = RequestTicket::default();
        let first = ticket.request();
        ticket.take();
        let second = ticket.request();

        assert!(!ticket.cancel_pending());
        assert!(!ticket.is_pending());
        assert!(!ticket.is_served(first));
        assert!(!ticket.is_served(second));

        // the running operation answers both
        ticket.serve_taken();
        assert!(ticket.is_served(second));
    }

    #[test]
    fn test_cancel_pending_releases_unstarted_callers() {
        let mut ticket = RequestTicket::default();
        assert!(!ticket.cancel_pending());

        let first = ticket.request();
        assert!(ticket.cancel_pending());
        assert!(ticket.is_served(first));
        assert!(!ticket.is_pending());
    }

    #[test]
    fn test_cancel_running_initialization_keeps_advice() {
        let mut state = ControllerState::new();
        state.initialization.request();
        assert_eq!(state.next_work(), Some(Work::Initialize));

        state.cancel_initialization();
        assert_eq!(state.advice, Advice::Success);
        assert_eq!(state.next_work(), None);
    }

    #[test]
    fn test_priority_order() {
        let mut state = ControllerState::new();
        state.scan_tasks.push("/a");
        state.deferred_albums.push("/Trips".to_string());
        state.unique_hash.request();
        state.complete_scan.request();
        state.initialization.request();

        assert_eq!(state.next_work(), Some(Work::Initialize));
        assert!(matches!(state.next_work(), Some(Work::CompleteScan { .. })));
        assert_eq!(state.next_work(), Some(Work::UpdateUniqueHash));
        assert_eq!(
            state.next_work(),
            Some(Work::FinishDeferredScan(vec!["/Trips".to_string()]))
        );

        state.deferred_albums.clear();
        assert_eq!(state.next_work(), Some(Work::PartialScan("/a".to_string())));
        assert_eq!(state.next_work(), None);
    }

    #[test]
    fn test_suspension_blocks_finish_and_partial_only() {
        let mut state = ControllerState::new();
        state.suspended = 1;
        state.scan_tasks.push("/a");
        state.deferred_albums.push("/Trips".to_string());
        assert_eq!(state.next_work(), None);

        state.complete_scan.request();
        assert!(matches!(state.next_work(), Some(Work::CompleteScan { .. })));

        state.suspended = 0;
        assert!(matches!(state.next_work(), Some(Work::FinishDeferredScan(_))));
    }

    #[test]
    fn test_finish_gate() {
        let mut state = ControllerState::new();
        state.deferred_albums.push("/Trips".to_string());
        state.finish_scan_allowed = false;
        assert_eq!(state.next_work(), None);

        state.finish_scan_allowed = true;
        assert!(matches!(state.next_work(), Some(Work::FinishDeferredScan(_))));
    }

    #[test]
    fn test_cancel_pending_clears_everything() {
        let mut state = ControllerState::new();
        state.initialization.request();
        state.complete_scan.request();
        state.unique_hash.request();
        state.scan_tasks.push("/a");

        state.cancel_pending();

        assert!(!state.initialization.is_pending());
        assert!(!state.complete_scan.is_pending());
        assert!(!state.unique_hash.is_pending());
        assert!(state.scan_tasks.is_empty());
        assert_eq!(state.advice, Advice::ContinueWithoutDatabase);
        assert_eq!(state.next_work(), None);
    }
}
