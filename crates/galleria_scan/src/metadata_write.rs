//! Scoped guard around writes to an image file's embedded metadata
//!
//! Wrap every metadata write in a [`FileMetadataWrite`]. Creating it records
//! an "about to edit" hint with the file's current modification time and size,
//! so a scan racing with the write does not mistake the edit for an external
//! change. Dropping it records whether the file was actually changed and then
//! rescans the item on the calling thread.

use crate::controller::ScanController;
use crate::hints::{ItemMetadataAdjustmentHint, MetadataEditStatus};
use crate::types::ItemInfo;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

pub struct FileMetadataWrite<'a> {
    controller: &'a ScanController,
    item: ItemInfo,
    changed: bool,
}

impl<'a> FileMetadataWrite<'a> {
    pub fn new(controller: &'a ScanController, item: ItemInfo) -> Self {
        // Hold a shared lock while sampling so a concurrent writer in another
        // process cannot hand us a half-written size.
        let lock = match File::open(&item.file_path) {
            Ok(file) => match file.lock_shared() {
                Ok(()) => Some(file),
                Err(e) => {
                    warn!(path = %item.file_path.display(), "Could not lock file for reading: {}", e);
                    None
                }
            },
            Err(e) => {
                debug!(path = %item.file_path.display(), "Could not open file before metadata write: {}", e);
                None
            }
        };

        let (modified, size) = file_stamp(&item.file_path);

        if let Some(file) = lock {
            if let Err(e) = file.unlock() {
                debug!(path = %item.file_path.display(), "Could not unlock file after sampling: {}", e);
            }
        }

        controller.hint_at_metadata_edit(ItemMetadataAdjustmentHint::new(
            item.id,
            MetadataEditStatus::AboutToEdit,
            modified,
            size,
        ));

        Self {
            controller,
            item,
            changed: false,
        }
    }

    /// Record whether the write went through.
    pub fn changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    pub fn item(&self) -> &ItemInfo {
        &self.item
    }
}

impl Drop for FileMetadataWrite<'_> {
    fn drop(&mut self) {
        let status = if self.changed {
            MetadataEditStatus::EditingFinished
        } else {
            MetadataEditStatus::EditingAborted
        };
        let (modified, size) = file_stamp(&self.item.file_path);

        self.controller.hint_at_metadata_edit(ItemMetadataAdjustmentHint::new(
            self.item.id,
            status,
            modified,
            size,
        ));
        self.controller.scan_file_directly_normal(&self.item);
    }
}

fn file_stamp(path: &Path) -> (Option<DateTime<Utc>>, u64) {
    match std::fs::metadata(path) {
        Ok(meta) => (
            meta.modified().ok().map(DateTime::<Utc>::from),
            meta.len(),
        ),
        Err(_) => (None, 0),
    }
}
