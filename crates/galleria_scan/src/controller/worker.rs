//! The worker thread and the state it shares with the controller handle

use super::state::{ControllerState, Work};
use super::Advice;
use crate::events::{EventBus, ScanEvent, ScanProgress};
use crate::hints::HintContainer;
use crate::observer::{
    CancellationObserver, ContinueFlag, InitializationObserver, SchemaUpdateResult,
};
use crate::scanner::{ScannerFactory, ScannerOptions};
use crate::store::CollectionStore;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

const FINISH_SCAN_LABEL: &str = "Scanning collection";

pub(super) struct Shared {
    pub(super) state: Mutex<ControllerState>,
    /// The worker waits here for new work.
    pub(super) work_cv: Condvar,
    /// Blocked callers wait here for completions and for the worker going idle.
    pub(super) done_cv: Condvar,
    pub(super) continue_initialization: ContinueFlag,
    pub(super) continue_scan: ContinueFlag,
    pub(super) continue_partial_scan: ContinueFlag,
    pub(super) events: EventBus,
    pub(super) hints: Arc<HintContainer>,
    pub(super) scanners: Arc<dyn ScannerFactory>,
    pub(super) store: Arc<dyn CollectionStore>,
}

impl Shared {
    pub(super) fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn wake_worker(&self) {
        let _state = self.lock();
        self.work_cv.notify_all();
    }

    pub(super) fn halt_all(&self) {
        self.continue_initialization.halt();
        self.continue_scan.halt();
        self.continue_partial_scan.halt();
    }

    /// Block until `served` holds. Fails once the worker is gone.
    pub(super) fn wait_until<F>(&self, mut served: F) -> crate::Result<MutexGuard<'_, ControllerState>>
    where
        F: FnMut(&ControllerState) -> bool,
    {
        let mut state = self.lock();
        loop {
            if served(&state) {
                return Ok(state);
            }
            if !state.running {
                return Err(crate::ScanError::NotRunning);
            }
            state = self
                .done_cv
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn arm_for(&self, work: &Work) {
        match work {
            Work::Initialize | Work::UpdateUniqueHash => self.continue_initialization.arm(),
            Work::CompleteScan { .. } | Work::FinishDeferredScan(_) => self.continue_scan.arm(),
            Work::PartialScan(_) => self.continue_partial_scan.arm(),
        }
    }

    fn scanner_options(&self, observer: &ContinueFlag) -> ScannerOptions {
        ScannerOptions::new(Arc::clone(&self.hints)).with_observer(Arc::new(observer.clone()))
    }

    fn execute(&self, work: Work) {
        match work {
            Work::Initialize => self.initialize(),
            Work::CompleteScan {
                defer_file_scanning,
                need_total_files,
            } => self.complete_scan(defer_file_scanning, need_total_files),
            Work::UpdateUniqueHash => self.update_unique_hash(),
            Work::FinishDeferredScan(albums) => self.finish_deferred_scan(albums),
            Work::PartialScan(path) => self.partial_scan(path),
        }
    }

    fn initialize(&self) {
        info!("Initializing database");
        let relay = InitializationRelay { shared: self };
        let ready = self.store.check_ready_for_use(&relay);

        {
            let mut state = self.lock();
            if !ready && state.advice == Advice::Success {
                state.advice = Advice::ContinueWithoutDatabase;
            }
            state.last_init_success = ready;
            info!(success = ready, advice = ?state.advice, "Database initialization finished");
        }

        self.events
            .emit(ScanEvent::DatabaseInitialized { success: ready });

        let mut state = self.lock();
        state.initialization.serve_taken();
        self.done_cv.notify_all();
    }

    fn complete_scan(&self, defer_file_scanning: bool, need_total_files: bool) {
        info!(
            deferred = defer_file_scanning,
            need_total_files, "Starting complete collection scan"
        );

        let options = self
            .scanner_options(&self.continue_scan)
            .with_progress(ScanProgress::new(self.events.clone()))
            .with_need_file_count(need_total_files)
            .with_deferred_file_scanning(defer_file_scanning);
        let mut scanner = self.scanners.create(options);
        scanner.complete_scan();

        let deferred = if defer_file_scanning {
            scanner.deferred_album_paths()
        } else {
            Vec::new()
        };
        drop(scanner);

        {
            // published before completion so a returning caller sees them
            let mut state = self.lock();
            if defer_file_scanning {
                info!(albums = deferred.len(), "File scanning deferred");
                state.deferred_albums = deferred;
                state.finish_scan_allowed = false;
            }
        }

        self.events.emit(ScanEvent::CompleteScanDone);

        let mut state = self.lock();
        state.complete_scan.serve_taken();
        self.done_cv.notify_all();
    }

    fn update_unique_hash(&self) {
        info!("Updating unique hashes");
        let relay = InitializationRelay { shared: self };
        self.store.update_unique_hash(&relay);

        self.events.emit(ScanEvent::CompleteScanDone);

        let mut state = self.lock();
        state.unique_hash.serve_taken();
        self.done_cv.notify_all();
    }

    fn finish_deferred_scan(&self, albums: Vec<String>) {
        info!(albums = albums.len(), "Scanning deferred files");
        self.events.emit(ScanEvent::CollectionScanStarted {
            label: FINISH_SCAN_LABEL.to_string(),
        });

        let options = self
            .scanner_options(&self.continue_scan)
            .with_progress(ScanProgress::new(self.events.clone()))
            .with_need_file_count(true);
        let mut scanner = self.scanners.create(options);
        scanner.finish_complete_scan(&albums);
        drop(scanner);

        self.lock().deferred_albums.clear();

        self.events.emit(ScanEvent::CompleteScanDone);
        self.events.emit(ScanEvent::CollectionScanFinished);
        self.done_cv.notify_all();
    }

    fn partial_scan(&self, path: String) {
        debug!(path = %path, "Partial scan");
        let mut scanner = self
            .scanners
            .create(self.scanner_options(&self.continue_partial_scan));
        scanner.partial_scan(&path);
        drop(scanner);

        self.events.emit(ScanEvent::PartialScanDone { path });
    }
}

/// Storage-layer observer handed out during initialization and hash updates.
struct InitializationRelay<'a> {
    shared: &'a Shared,
}

impl CancellationObserver for InitializationRelay<'_> {
    fn should_continue(&self) -> bool {
        self.shared.continue_initialization.is_armed()
    }
}

impl InitializationObserver for InitializationRelay<'_> {
    fn error(&self, message: &str) {
        warn!("Database initialization error: {}", message);
        self.shared.events.emit(ScanEvent::InitializationError {
            message: message.to_string(),
        });
    }

    fn schema_update_progress(&self, message: &str, steps: u32) {
        debug!(steps, "{}", message);
        self.shared.events.emit(ScanEvent::InitializationProgress {
            message: message.to_string(),
            steps,
        });
    }

    fn more_schema_update_steps(&self, count: u32) {
        self.shared.events.emit(ScanEvent::MoreSchemaUpdateSteps(count));
    }

    fn finished_schema_update(&self, result: SchemaUpdateResult) {
        let advice = match result {
            SchemaUpdateResult::Success => Advice::Success,
            SchemaUpdateResult::Error => Advice::ContinueWithoutDatabase,
            SchemaUpdateResult::ErrorMustAbort => Advice::AbortImmediately,
        };
        debug!(?result, "Schema update finished");
        self.shared.lock().advice = advice;
    }
}

/// Worker thread body. Returns once `running` is cleared.
pub(super) fn run(shared: Arc<Shared>) {
    info!("Scan controller worker started");

    loop {
        let work = {
            let mut state = shared.lock();
            loop {
                if !state.running {
                    break None;
                }
                if let Some(work) = state.next_work() {
                    shared.arm_for(&work);
                    break Some(work);
                }

                state.idle = true;
                shared.done_cv.notify_all();
                state = shared
                    .work_cv
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
                state.idle = false;
            }
        };

        match work {
            Some(work) => shared.execute(work),
            None => break,
        }
    }

    let mut state = shared.lock();
    state.idle = true;
    shared.done_cv.notify_all();
    info!("Scan controller worker stopped");
}
