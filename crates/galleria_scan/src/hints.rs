//! Hint Container
//!
//! Hints are notices about changes that bypassed the scanner: an album that
//! was moved or copied, items copied into an album, items whose file was
//! modified, and metadata edits in flight. The next scan pass reads them so it
//! can carry database rows along instead of re-reading everything from disk.
//!
//! # Lock Invariant
//!
//! All records sit behind one `RwLock`. Foreground threads record hints while
//! the worker's scanner reads and consumes them; the lock is held only for
//! in-memory list/map operations, never across I/O.
//!
//! # Garbage collection
//!
//! Nothing guarantees a scan ever consumes the hints. When the worker is idle
//! and no hint has been added for longer than the quiescence window, the next
//! insertion through [`HintContainer::garbage_collect`] clears everything first.

use crate::types::{AlbumId, AlbumRootId, ItemId, PhysicalAlbum};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default quiescence window before idle hints are dropped (5 minutes)
pub const DEFAULT_HINT_QUIESCENCE: Duration = Duration::from_secs(5 * 60);

/// Category of a hint record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HintKind {
    AlbumCopyMove,
    ItemCopyMove,
    ItemChange,
    ItemMetadataAdjustment,
}

/// Destination of an album move or copy: collection root plus album path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DstPath {
    pub root_id: AlbumRootId,
    pub relative_path: String,
}

impl DstPath {
    pub fn new(root_id: AlbumRootId, relative_path: impl Into<String>) -> Self {
        Self {
            root_id,
            relative_path: relative_path.into(),
        }
    }
}

/// An album was moved or copied to `dst`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumCopyMoveHint {
    pub src_root_id: AlbumRootId,
    pub src_album_id: AlbumId,
    pub dst: DstPath,
}

impl AlbumCopyMoveHint {
    /// Hint for `album` landing at `relative_dst_path/album_name` under `dst_root_id`.
    pub fn for_album(
        album: &PhysicalAlbum,
        dst_root_id: AlbumRootId,
        relative_dst_path: &str,
        album_name: &str,
    ) -> Self {
        let dst_album_path = if relative_dst_path == "/" {
            format!("/{}", album_name)
        } else {
            format!("{}/{}", relative_dst_path, album_name)
        };

        Self {
            src_root_id: album.root_id,
            src_album_id: album.id,
            dst: DstPath::new(dst_root_id, dst_album_path),
        }
    }

    /// One hint for `album` and one for every descendant.
    ///
    /// Each descendant keeps its path below `album`, re-rooted under the new
    /// name: moving `/Trips` to `/Archive` as `Old` maps `/Trips/2019` to
    /// `/Archive/Old/2019`.
    pub fn for_album_tree(
        album: &PhysicalAlbum,
        dst_root_id: AlbumRootId,
        relative_dst_path: &str,
        album_name: &str,
    ) -> Vec<Self> {
        let mut hints = vec![Self::for_album(
            album,
            dst_root_id,
            relative_dst_path,
            album_name,
        )];

        // do not cut away a "/" for the root album
        let parent_path = if album.relative_path == "/" {
            ""
        } else {
            album.relative_path.as_str()
        };

        for child in album.descendants() {
            let suffix = child
                .relative_path
                .get(parent_path.len()..)
                .unwrap_or_default();
            let child_name = format!("{}{}", album_name, suffix);
            hints.push(Self::for_album(
                child,
                dst_root_id,
                relative_dst_path,
                &child_name,
            ));
        }

        hints
    }
}

/// Items were moved or copied into an album under new names.
///
/// `src_ids[i]` became `dst_names[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCopyMoveHint {
    pub src_ids: Vec<ItemId>,
    pub dst_root_id: AlbumRootId,
    pub dst_album_id: AlbumId,
    pub dst_names: Vec<String>,
}

/// Why an item change hint was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemChangeReason {
    /// The file was modified; rescan its content.
    Modified,
    /// Rescan the item from scratch.
    Rescan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemChangeHint {
    pub ids: Vec<ItemId>,
    pub reason: ItemChangeReason,
}

impl ItemChangeHint {
    pub fn modified(ids: Vec<ItemId>) -> Self {
        Self {
            ids,
            reason: ItemChangeReason::Modified,
        }
    }

    pub fn rescan(ids: Vec<ItemId>) -> Self {
        Self {
            ids,
            reason: ItemChangeReason::Rescan,
        }
    }
}

/// Stage of a metadata edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataEditStatus {
    AboutToEdit,
    EditingFinished,
    EditingAborted,
}

/// File modification time and size observed at a metadata edit stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataStamp {
    pub modified: Option<DateTime<Utc>>,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMetadataAdjustmentHint {
    pub id: ItemId,
    pub status: MetadataEditStatus,
    pub stamp: MetadataStamp,
}

impl ItemMetadataAdjustmentHint {
    pub fn new(
        id: ItemId,
        status: MetadataEditStatus,
        modified: Option<DateTime<Utc>>,
        file_size: u64,
    ) -> Self {
        Self {
            id,
            status,
            stamp: MetadataStamp {
                modified,
                file_size,
            },
        }
    }
}

/// Any hint record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hint {
    AlbumCopyMove(AlbumCopyMoveHint),
    ItemCopyMove(ItemCopyMoveHint),
    ItemChange(ItemChangeHint),
    ItemMetadataAdjustment(ItemMetadataAdjustmentHint),
}

impl Hint {
    pub fn kind(&self) -> HintKind {
        match self {
            Self::AlbumCopyMove(_) => HintKind::AlbumCopyMove,
            Self::ItemCopyMove(_) => HintKind::ItemCopyMove,
            Self::ItemChange(_) => HintKind::ItemChange,
            Self::ItemMetadataAdjustment(_) => HintKind::ItemMetadataAdjustment,
        }
    }
}

impl From<AlbumCopyMoveHint> for Hint {
    fn from(hint: AlbumCopyMoveHint) -> Self {
        Self::AlbumCopyMove(hint)
    }
}

impl From<ItemCopyMoveHint> for Hint {
    fn from(hint: ItemCopyMoveHint) -> Self {
        Self::ItemCopyMove(hint)
    }
}

impl From<ItemChangeHint> for Hint {
    fn from(hint: ItemChangeHint) -> Self {
        Self::ItemChange(hint)
    }
}

impl From<ItemMetadataAdjustmentHint> for Hint {
    fn from(hint: ItemMetadataAdjustmentHint) -> Self {
        Self::ItemMetadataAdjustment(hint)
    }
}

#[derive(Debug, Default)]
struct HintRecords {
    albums: Vec<AlbumCopyMoveHint>,
    items: Vec<ItemCopyMoveHint>,
    changes: Vec<ItemChangeHint>,
    about_to_adjust: HashMap<ItemId, MetadataStamp>,
    adjusted: HashMap<ItemId, MetadataStamp>,
    last_hint_added: Option<Instant>,
}

impl HintRecords {
    fn insert(&mut self, hint: Hint) {
        match hint {
            Hint::AlbumCopyMove(hint) => {
                // one hint per destination; a later move to the same place wins
                self.albums.retain(|existing| existing.dst != hint.dst);
                self.albums.push(hint);
            }
            Hint::ItemCopyMove(hint) => self.items.push(hint),
            Hint::ItemChange(hint) => self.changes.push(hint),
            Hint::ItemMetadataAdjustment(hint) => match hint.status {
                MetadataEditStatus::AboutToEdit => {
                    // keep the oldest stamp across repeated edits
                    self.about_to_adjust.entry(hint.id).or_insert(hint.stamp);
                }
                MetadataEditStatus::EditingFinished => {
                    if self.about_to_adjust.remove(&hint.id).is_some() {
                        self.adjusted.insert(hint.id, hint.stamp);
                    }
                }
                MetadataEditStatus::EditingAborted => {
                    self.about_to_adjust.remove(&hint.id);
                }
            },
        }
    }

    fn clear(&mut self) {
        self.albums.clear();
        self.items.clear();
        self.changes.clear();
        self.about_to_adjust.clear();
        self.adjusted.clear();
    }

    fn count(&self, kind: HintKind) -> usize {
        match kind {
            HintKind::AlbumCopyMove => self.albums.len(),
            HintKind::ItemCopyMove => self.items.len(),
            HintKind::ItemChange => self.changes.len(),
            HintKind::ItemMetadataAdjustment => self.about_to_adjust.len() + self.adjusted.len(),
        }
    }

    fn has_change(&self, id: ItemId, reason: ItemChangeReason) -> bool {
        self.changes
            .iter()
            .any(|hint| hint.reason == reason && hint.ids.contains(&id))
    }

    fn take_change(&mut self, id: ItemId, reason: ItemChangeReason) -> bool {
        let mut found = false;
        for hint in self.changes.iter_mut().filter(|h| h.reason == reason) {
            let before = hint.ids.len();
            hint.ids.retain(|existing| *existing != id);
            found |= hint.ids.len() != before;
        }
        self.changes.retain(|hint| !hint.ids.is_empty());
        found
    }
}

/// Thread-safe store of pending hints.
#[derive(Debug)]
pub struct HintContainer {
    records: RwLock<HintRecords>,
    quiescence: Duration,
}

impl Default for HintContainer {
    fn default() -> Self {
        Self::new(DEFAULT_HINT_QUIESCENCE)
    }
}

impl HintContainer {
    /// Create an empty container with the given garbage-collection window.
    pub fn new(quiescence: Duration) -> Self {
        Self {
            records: RwLock::new(HintRecords::default()),
            quiescence,
        }
    }

    pub fn quiescence(&self) -> Duration {
        self.quiescence
    }

    fn read(&self) -> RwLockReadGuard<'_, HintRecords> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HintRecords> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a single hint.
    pub fn record_hint(&self, hint: impl Into<Hint>) {
        self.write().insert(hint.into());
    }

    /// Record several hints under one lock acquisition.
    pub fn record_hints<H: Into<Hint>>(&self, hints: impl IntoIterator<Item = H>) {
        let mut records = self.write();
        for hint in hints {
            records.insert(hint.into());
        }
    }

    /// Drop every hint.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Apply the quiescence policy before an insertion.
    ///
    /// Clears all hints when `worker_idle` is true and the last hint was added
    /// more than the quiescence window before `now`. With `touch`, `now`
    /// becomes the new last-added time. Returns whether hints were cleared.
    pub fn garbage_collect(&self, worker_idle: bool, now: Instant, touch: bool) -> bool {
        let mut records = self.write();
        let stale = records
            .last_hint_added
            .map(|last| now.saturating_duration_since(last) > self.quiescence)
            .unwrap_or(false);

        let cleared = worker_idle && stale;
        if cleared {
            debug!("Dropping hints after quiescence window");
            records.clear();
        }

        if touch {
            records.last_hint_added = Some(now);
        }

        cleared
    }

    /// Total number of hint records of all kinds.
    pub fn len(&self) -> usize {
        let records = self.read();
        [
            HintKind::AlbumCopyMove,
            HintKind::ItemCopyMove,
            HintKind::ItemChange,
            HintKind::ItemMetadataAdjustment,
        ]
        .iter()
        .map(|kind| records.count(*kind))
        .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records of one kind.
    pub fn count(&self, kind: HintKind) -> usize {
        self.read().count(kind)
    }

    pub fn has_album_hints(&self) -> bool {
        !self.read().albums.is_empty()
    }

    /// All album hints in insertion order.
    pub fn album_hints(&self) -> Vec<AlbumCopyMoveHint> {
        self.read().albums.clone()
    }

    /// The album move/copy hint whose destination is `dst`, if any.
    pub fn album_hint_for(&self, dst: &DstPath) -> Option<AlbumCopyMoveHint> {
        self.read().albums.iter().find(|h| &h.dst == dst).cloned()
    }

    /// The source item of a file that appeared as `name` in `album`.
    ///
    /// The most recent copy/move hint wins.
    pub fn source_item_for(&self, album: AlbumId, name: &str) -> Option<ItemId> {
        self.read()
            .items
            .iter()
            .rev()
            .filter(|hint| hint.dst_album_id == album)
            .find_map(|hint| {
                hint.dst_names
                    .iter()
                    .position(|n| n == name)
                    .and_then(|idx| hint.src_ids.get(idx).copied())
            })
    }

    pub fn has_modification_hint(&self, id: ItemId) -> bool {
        self.read().has_change(id, ItemChangeReason::Modified)
    }

    pub fn has_rescan_hint(&self, id: ItemId) -> bool {
        self.read().has_change(id, ItemChangeReason::Rescan)
    }

    /// Stamp recorded when a metadata edit of `id` started and has not ended yet.
    pub fn metadata_about_to_adjust(&self, id: ItemId) -> Option<MetadataStamp> {
        self.read().about_to_adjust.get(&id).copied()
    }

    /// Stamp recorded when a metadata edit of `id` finished.
    pub fn metadata_adjusted(&self, id: ItemId) -> Option<MetadataStamp> {
        self.read().adjusted.get(&id).copied()
    }

    /// Whether any item-level hint mentions `id`.
    pub fn has_any_item_hint(&self, id: ItemId) -> bool {
        let records = self.read();
        records.changes.iter().any(|hint| hint.ids.contains(&id))
            || records.about_to_adjust.contains_key(&id)
            || records.adjusted.contains_key(&id)
    }

    /// Remove the modification hint for `id`; returns whether one existed.
    pub fn take_modification_hint(&self, id: ItemId) -> bool {
        self.write().take_change(id, ItemChangeReason::Modified)
    }

    /// Remove the rescan hint for `id`; returns whether one existed.
    pub fn take_rescan_hint(&self, id: ItemId) -> bool {
        self.write().take_change(id, ItemChangeReason::Rescan)
    }

    /// Remove the finished-edit stamp for `id`.
    pub fn take_metadata_adjusted(&self, id: ItemId) -> Option<MetadataStamp> {
        self.write().adjusted.remove(&id)
    }
}
