//! Scan Coordinator
//!
//! [`ScanController`] owns one worker thread that serializes every scan and
//! maintenance operation. Each loop iteration picks at most one unit of work
//! in fixed priority order:
//!
//! 1. database initialization
//! 2. complete collection scan
//! 3. unique hash update
//! 4. finish pass over albums whose file scan was deferred
//! 5. one queued partial scan
//!
//! and otherwise waits for a wake-up. Suspension only holds back 4 and 5.
//!
//! Initialization, complete scans and hash updates are requested with blocking
//! calls that return once the worker has finished the request. Partial scans
//! are fire-and-forget; the relaxed and external variants coalesce bursts
//! through single-shot timers before waking the worker.
//!
//! Cancellation is cooperative. Collaborators poll a [`ContinueFlag`] and
//! return early when it is halted; the worker then moves on without retrying.

mod state;
mod worker;

use crate::config::ScanControllerConfig;
use crate::error::{Result, ScanError};
use crate::events::{EventBus, ScanEvent};
use crate::file_watch::{self, FileWatchSink};
use crate::hints::{
    AlbumCopyMoveHint, HintContainer, ItemChangeHint, ItemCopyMoveHint,
    ItemMetadataAdjustmentHint,
};
use crate::observer::ContinueFlag;
use crate::scanner::{ScanMode, ScannerFactory, ScannerOptions};
use crate::store::CollectionStore;
use crate::timer::CoalescingTimer;
use crate::types::{ItemId, ItemInfo, PhysicalAlbum};
use state::ControllerState;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use worker::Shared;

/// Outcome of database initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Advice {
    /// The database is ready.
    #[default]
    Success,
    /// The database is unusable; the application may run without it.
    ContinueWithoutDatabase,
    /// The application must exit.
    AbortImmediately,
}

/// Application-supplied collaborators
#[derive(Clone)]
pub struct ScanCollaborators {
    pub scanners: Arc<dyn ScannerFactory>,
    pub store: Arc<dyn CollectionStore>,
    /// Cache notified of file content changes; `None` skips the bridge.
    pub file_watch: Option<Arc<dyn FileWatchSink>>,
}

impl ScanCollaborators {
    pub fn new(scanners: Arc<dyn ScannerFactory>, store: Arc<dyn CollectionStore>) -> Self {
        Self {
            scanners,
            store,
            file_watch: None,
        }
    }

    pub fn with_file_watch(mut self, sink: Arc<dyn FileWatchSink>) -> Self {
        self.file_watch = Some(sink);
        self
    }
}

/// Handle to the scan worker.
///
/// Construct one at application start and share it by reference. Dropping it
/// shuts the worker down.
pub struct ScanController {
    shared: Arc<Shared>,
    relaxed_timer: CoalescingTimer,
    external_timer: CoalescingTimer,
    worker: Mutex<Option<JoinHandle<()>>>,
    file_watch: Option<Arc<dyn FileWatchSink>>,
    file_watch_bridge: Mutex<Option<JoinHandle<()>>>,
}

/// Suspends background scanning for its lifetime.
struct SuspendGuard<'a> {
    controller: &'a ScanController,
}

impl<'a> SuspendGuard<'a> {
    fn new(controller: &'a ScanController) -> Self {
        controller.suspend_collection_scan();
        Self { controller }
    }
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        self.controller.resume_collection_scan();
    }
}

impl ScanController {
    /// Start the worker thread and the coalescing timers.
    pub fn new(config: ScanControllerConfig, collaborators: ScanCollaborators) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(ControllerState::new()),
            work_cv: Condvar::new(),
            done_cv: Condvar::new(),
            continue_initialization: ContinueFlag::new(),
            continue_scan: ContinueFlag::new(),
            continue_partial_scan: ContinueFlag::new(),
            events: EventBus::new(),
            hints: Arc::new(HintContainer::new(config.hint_quiescence())),
            scanners: collaborators.scanners,
            store: collaborators.store,
        });

        let relaxed_shared = Arc::clone(&shared);
        let relaxed_timer =
            CoalescingTimer::spawn("scan-relaxed-timer", config.relaxed_delay(), move || {
                debug!("Relaxed scan timer fired");
                relaxed_shared.wake_worker();
            })?;

        let external_shared = Arc::clone(&shared);
        let external_timer =
            CoalescingTimer::spawn("scan-external-timer", config.external_delay(), move || {
                debug!("External scan timer fired");
                external_shared.wake_worker();
            })?;

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(config.worker_thread_name.clone())
            .spawn(move || worker::run(worker_shared))
            .map_err(|source| ScanError::Spawn {
                name: config.worker_thread_name.clone(),
                source,
            })?;

        info!(
            relaxed_ms = config.relaxed_delay_ms,
            external_ms = config.external_delay_ms,
            "Scan controller started"
        );

        Ok(Self {
            shared,
            relaxed_timer,
            external_timer,
            worker: Mutex::new(Some(worker)),
            file_watch: collaborators.file_watch,
            file_watch_bridge: Mutex::new(None),
        })
    }

    /// Event stream of this controller.
    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    pub fn subscribe(&self) -> Receiver<ScanEvent> {
        self.shared.events.subscribe()
    }

    /// The hint container shared with every scanner.
    pub fn hints(&self) -> &Arc<HintContainer> {
        &self.shared.hints
    }

    // ========================================================================
    // Blocking requests
    // ========================================================================

    /// Check and, if needed, update the database. Blocks until done.
    ///
    /// The first successful call also connects the database change channel
    /// to the file-watch sink.
    pub fn initialize_database(&self) -> Result<Advice> {
        let ticket = {
            let mut state = self.shared.lock();
            if !state.running {
                return Err(ScanError::NotRunning);
            }
            state.advice = Advice::Success;
            let ticket = state.initialization.request();
            self.shared.work_cv.notify_all();
            ticket
        };

        let (advice, install_bridge) = {
            let mut state = self
                .shared
                .wait_until(|s| s.initialization.is_served(ticket))?;
            let install = state.last_init_success && !state.file_watch_installed;
            if install {
                state.file_watch_installed = true;
            }
            (state.advice, install)
        };

        if install_bridge {
            self.install_file_watch();
        }

        Ok(advice)
    }

    /// Run a complete scan and block until it is done or cancelled.
    ///
    /// Files are counted up front only if no complete scan ever finished
    /// against this database.
    pub fn complete_collection_scan(&self, defer_file_scanning: bool) -> Result<()> {
        let need_total_files = !self.shared.store.initial_scan_done();
        self.request_complete_scan(defer_file_scanning, need_total_files)
    }

    /// Like [`complete_collection_scan`](Self::complete_collection_scan), for
    /// callers that show no progress dialog.
    pub fn complete_collection_scan_in_background(&self, defer_file_scanning: bool) -> Result<()> {
        self.request_complete_scan(defer_file_scanning, true)
    }

    pub fn complete_collection_scan_defer_files(&self) -> Result<()> {
        self.complete_collection_scan(true)
    }

    fn request_complete_scan(&self, defer_file_scanning: bool, need_total_files: bool) -> Result<()> {
        let ticket = {
            let mut state = self.shared.lock();
            if !state.running {
                return Err(ScanError::NotRunning);
            }
            state.defer_file_scanning = defer_file_scanning;
            state.need_total_files = need_total_files;
            let ticket = state.complete_scan.request();
            self.shared.work_cv.notify_all();
            ticket
        };

        self.shared
            .wait_until(|s| s.complete_scan.is_served(ticket))?;
        Ok(())
    }

    /// Recompute unique hashes. Blocks until done.
    pub fn update_unique_hash(&self) -> Result<()> {
        let ticket = {
            let mut state = self.shared.lock();
            if !state.running {
                return Err(ScanError::NotRunning);
            }
            let ticket = state.unique_hash.request();
            self.shared.work_cv.notify_all();
            ticket
        };

        self.shared
            .wait_until(|s| s.unique_hash.is_served(ticket))?;
        Ok(())
    }

    /// Let the deferred finish pass run.
    pub fn allow_to_scan_deferred_files(&self) {
        let mut state = self.shared.lock();
        state.finish_scan_allowed = true;
        self.shared.work_cv.notify_all();
    }

    // ========================================================================
    // Partial scan scheduling
    // ========================================================================

    /// Queue a partial scan of `path` and wake the worker.
    pub fn schedule_collection_scan(&self, path: &str) {
        let mut state = self.shared.lock();
        if state.scan_tasks.push(path) {
            debug!(path = %path, "Scheduled partial scan");
        }
        self.shared.work_cv.notify_all();
    }

    /// Queue a partial scan and wake the worker once the relaxed window passes
    /// without further scheduling.
    pub fn schedule_collection_scan_relaxed(&self, path: &str) {
        self.shared.lock().scan_tasks.push(path);
        self.relaxed_timer.start();
    }

    /// Like [`schedule_collection_scan_relaxed`](Self::schedule_collection_scan_relaxed)
    /// with the longer window used for change notifications from outside.
    pub fn schedule_collection_scan_external(&self, path: &str) {
        self.shared.lock().scan_tasks.push(path);
        self.external_timer.start();
    }

    // ========================================================================
    // Direct scans on the calling thread
    // ========================================================================

    /// Scan one file now, with background scanning suspended meanwhile.
    pub fn scan_file_directly(&self, path: &Path) -> Option<ItemId> {
        let _suspend = SuspendGuard::new(self);
        let mut scanner = self
            .shared
            .scanners
            .create(ScannerOptions::new(Arc::clone(&self.shared.hints)));
        scanner.scan_file(path, ScanMode::ModifiedScan)
    }

    /// Rescan a known item now without suspending background scanning.
    pub fn scan_file_directly_normal(&self, item: &ItemInfo) -> Option<ItemId> {
        let mut scanner = self
            .shared
            .scanners
            .create(ScannerOptions::new(Arc::clone(&self.shared.hints)));
        scanner.scan_item(item, ScanMode::NormalScan)
    }

    /// Make sure `path` is in the database and return its item id.
    pub fn scanned_info(&self, path: &Path) -> Option<ItemId> {
        let mut scanner = self
            .shared
            .scanners
            .create(ScannerOptions::new(Arc::clone(&self.shared.hints)));
        match self.shared.store.item_for_path(path) {
            Some(item) => scanner.scan_item(&item, ScanMode::NormalScan),
            None => scanner.scan_file(path, ScanMode::NormalScan),
        }
    }

    // ========================================================================
    // Suspension and cancellation
    // ========================================================================

    pub fn suspend_collection_scan(&self) {
        let mut state = self.shared.lock();
        state.suspended += 1;
        debug!(count = state.suspended, "Collection scan suspended");
    }

    pub fn resume_collection_scan(&self) {
        let mut state = self.shared.lock();
        if state.suspended > 0 {
            state.suspended -= 1;
        }
        debug!(count = state.suspended, "Collection scan resumed");
        if state.suspended == 0 {
            self.shared.work_cv.notify_all();
        }
    }

    /// Drop a pending complete scan and stop a running one at its next checkpoint.
    pub fn cancel_complete_scan(&self) {
        {
            let mut state = self.shared.lock();
            state.complete_scan.cancel();
            self.shared.continue_scan.halt();
        }
        info!("Complete scan cancelled");
        self.shared.events.emit(ScanEvent::CompleteScanCanceled);
        self.shared.done_cv.notify_all();
    }

    /// Drop a pending initialization and stop a running one at its next checkpoint.
    pub fn abort_initialization(&self) {
        {
            let mut state = self.shared.lock();
            state.cancel_initialization();
            self.shared.continue_initialization.halt();
        }
        info!("Database initialization aborted");
        self.shared.done_cv.notify_all();
    }

    /// Drop all pending work, stop running work, suspend, and wait until the
    /// worker is idle.
    pub fn cancel_all_and_suspend_collection_scan(&self) {
        {
            let mut state = self.shared.lock();
            state.cancel_pending();
            self.shared.halt_all();
            state.suspended += 1;
        }
        self.relaxed_timer.stop();
        self.external_timer.stop();
        self.shared.done_cv.notify_all();

        info!("Cancelled all scan work, waiting for worker to go idle");
        let _state = self.shared.wait_until(|s| s.idle);
        debug!("Worker idle");
    }

    /// Stop the worker and the timers. Idempotent.
    pub fn shut_down(&self) {
        {
            let mut state = self.shared.lock();
            state.running = false;
            self.shared.halt_all();
            self.shared.work_cv.notify_all();
            self.shared.done_cv.notify_all();
        }
        self.relaxed_timer.shut_down();
        self.external_timer.shut_down();

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Scan controller worker panicked");
            }
            info!("Scan controller shut down");
        }
    }

    // ========================================================================
    // Hints
    // ========================================================================

    fn garbage_collect_hints(&self) {
        let idle = self.shared.lock().idle;
        self.shared
            .hints
            .garbage_collect(idle, Instant::now(), true);
    }

    /// `album` was moved or copied into the directory `dst_path`, as `new_name`
    /// or under its own title.
    pub fn hint_at_move_or_copy_of_album(
        &self,
        album: &PhysicalAlbum,
        dst_path: &Path,
        new_name: Option<&str>,
    ) {
        let Some(location) = self.shared.store.location_for_path(dst_path) else {
            warn!(path = %dst_path.display(), "Album hint destination is not in a collection");
            return;
        };
        let Some(relative_dst_path) = location.album_path_for(dst_path) else {
            warn!(path = %dst_path.display(), "Album hint destination is outside its collection root");
            return;
        };

        self.record_album_hints(album, location.id, &relative_dst_path, new_name);
    }

    /// `album` was moved or copied into `dst_album`.
    pub fn hint_at_move_or_copy_of_album_to(
        &self,
        album: &PhysicalAlbum,
        dst_album: &PhysicalAlbum,
        new_name: Option<&str>,
    ) {
        self.record_album_hints(album, dst_album.root_id, &dst_album.relative_path, new_name);
    }

    fn record_album_hints(
        &self,
        album: &PhysicalAlbum,
        dst_root_id: crate::types::AlbumRootId,
        relative_dst_path: &str,
        new_name: Option<&str>,
    ) {
        let name = new_name.unwrap_or(&album.title);
        let hints = AlbumCopyMoveHint::for_album_tree(album, dst_root_id, relative_dst_path, name);
        debug!(album = %album.id, hints = hints.len(), "Recording album copy/move hints");

        self.garbage_collect_hints();
        self.shared.hints.record_hints(hints);
    }

    /// Items `ids` were moved or copied into `dst_album` as `dst_names`.
    pub fn hint_at_move_or_copy_of_items(
        &self,
        ids: Vec<ItemId>,
        dst_album: &PhysicalAlbum,
        dst_names: Vec<String>,
    ) {
        if ids.len() != dst_names.len() {
            warn!(
                ids = ids.len(),
                names = dst_names.len(),
                "Item copy/move hint with mismatched names, ignoring"
            );
            return;
        }

        self.garbage_collect_hints();
        self.shared.hints.record_hint(ItemCopyMoveHint {
            src_ids: ids,
            dst_root_id: dst_album.root_id,
            dst_album_id: dst_album.id,
            dst_names,
        });
    }

    pub fn hint_at_move_or_copy_of_item(&self, id: ItemId, dst_album: &PhysicalAlbum, dst_name: &str) {
        self.hint_at_move_or_copy_of_items(vec![id], dst_album, vec![dst_name.to_string()]);
    }

    /// The files of `ids` were modified outside the scanner.
    pub fn hint_at_modification_of_items(&self, ids: Vec<ItemId>) {
        self.garbage_collect_hints();
        self.shared.hints.record_hint(ItemChangeHint::modified(ids));
    }

    pub fn hint_at_modification_of_item(&self, id: ItemId) {
        self.hint_at_modification_of_items(vec![id]);
    }

    /// Stage of a metadata edit, recorded without garbage collection.
    pub fn hint_at_metadata_edit(&self, hint: ItemMetadataAdjustmentHint) {
        self.shared.hints.record_hint(hint);
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    pub fn is_idle(&self) -> bool {
        self.shared.lock().idle
    }

    pub fn advice(&self) -> Advice {
        self.shared.lock().advice
    }

    pub fn needs_initialization(&self) -> bool {
        self.shared.lock().initialization.is_pending()
    }

    pub fn needs_complete_scan(&self) -> bool {
        self.shared.lock().complete_scan.is_pending()
    }

    pub fn needs_update_unique_hash(&self) -> bool {
        self.shared.lock().unique_hash.is_pending()
    }

    /// Paths waiting for a partial scan, in service order.
    pub fn scan_queue(&self) -> Vec<String> {
        self.shared.lock().scan_tasks.paths()
    }

    pub fn deferred_albums(&self) -> Vec<String> {
        self.shared.lock().deferred_albums.clone()
    }

    pub fn finish_scan_allowed(&self) -> bool {
        self.shared.lock().finish_scan_allowed
    }

    pub fn suspend_count(&self) -> u32 {
        self.shared.lock().suspended
    }

    /// A relaxed or external coalescing window is open.
    pub fn scan_timer_pending(&self) -> bool {
        self.relaxed_timer.is_active() || self.external_timer.is_active()
    }

    /// Whether the file-watch bridge thread was started.
    pub fn file_watch_bridge_running(&self) -> bool {
        self.file_watch_bridge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn install_file_watch(&self) {
        let Some(sink) = self.file_watch.clone() else {
            return;
        };
        let Some(changes) = self.shared.store.watch_image_changes() else {
            debug!("Store publishes no change notifications");
            return;
        };

        match file_watch::install(changes, Arc::clone(&self.shared.store), sink) {
            Ok(handle) => {
                *self
                    .file_watch_bridge
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
            Err(e) => error!("Could not start file-watch bridge: {}", e),
        }
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        self.shut_down();
    }
}
