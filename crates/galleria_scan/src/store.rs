//! Storage layer collaborator interface
//!
//! The controller never touches the database itself. It asks the store to
//! check readiness, run maintenance passes, resolve paths and locations, and
//! hand out the database change-notification channel.

use crate::observer::InitializationObserver;
use crate::types::{CollectionLocation, ItemId, ItemInfo};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

/// Database fields touched by a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseField {
    ModificationDate,
    Orientation,
    FileSize,
    Rating,
    Tags,
    Comment,
}

/// A set of items whose database rows changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageChangeset {
    pub ids: Vec<ItemId>,
    pub changes: Vec<DatabaseField>,
}

impl ImageChangeset {
    pub fn new(ids: Vec<ItemId>, changes: Vec<DatabaseField>) -> Self {
        Self { ids, changes }
    }

    /// Whether the change invalidates cached file content (thumbnails, previews).
    pub fn affects_file_content(&self) -> bool {
        self.changes
            .iter()
            .any(|field| matches!(field, DatabaseField::ModificationDate | DatabaseField::Orientation))
    }
}

/// The relational store behind the collection.
///
/// Implementations are shared between the worker and foreground threads; each
/// thread is expected to use its own connection.
pub trait CollectionStore: Send + Sync {
    /// Open the database and apply schema updates. Returns whether it is usable.
    fn check_ready_for_use(&self, observer: &dyn InitializationObserver) -> bool;

    /// Recompute the unique content hash of every item.
    fn update_unique_hash(&self, observer: &dyn InitializationObserver);

    /// Whether a complete scan has ever finished against this database.
    fn initial_scan_done(&self) -> bool;

    /// The item stored at `path`, if any.
    fn item_for_path(&self, path: &Path) -> Option<ItemInfo>;

    /// File path of item `id`, if it is known.
    fn item_path(&self, id: ItemId) -> Option<PathBuf>;

    /// The collection root containing `path`, if any.
    fn location_for_path(&self, path: &Path) -> Option<CollectionLocation>;

    /// Channel of database change notifications.
    ///
    /// Returns `None` when the store does not publish changes or the channel
    /// was already handed out.
    fn watch_image_changes(&self) -> Option<Receiver<ImageChangeset>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changeset_content_fields() {
        let ids = vec![ItemId(1)];
        assert!(ImageChangeset::new(ids.clone(), vec![DatabaseField::Orientation])
            .affects_file_content());
        assert!(ImageChangeset::new(
            ids.clone(),
            vec![DatabaseField::Rating, DatabaseField::ModificationDate]
        )
        .affects_file_content());
        assert!(!ImageChangeset::new(ids, vec![DatabaseField::Tags]).affects_file_content());
    }
}
