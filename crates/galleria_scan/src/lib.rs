//! Galleria Scan - Background Collection-Scan Coordination
//!
//! One worker thread serializes every scan and maintenance operation that
//! touches the collection database. Foreground code talks to it through a
//! [`ScanController`]: blocking calls for initialization and complete scans,
//! fire-and-forget scheduling for incremental scans, and hint recording so the
//! next scan can interpret moves, copies and metadata edits that bypassed it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  requests   ┌─────────────────┐  create   ┌───────────────────┐
//! │  foreground  │────────────▶│  ScanController │──────────▶│ CollectionScanner │
//! │   callers    │◀────────────│  (worker loop)  │           │   (collaborator)  │
//! └──────────────┘  ScanEvent  └─────────────────┘           └───────────────────┘
//!        │                            │ check/update                  │ reads
//!        │ hint_at_*                  ▼                               ▼
//!        │                    ┌─────────────────┐             ┌───────────────┐
//!        └───────────────────▶│ CollectionStore │             │ HintContainer │
//!                             └─────────────────┘             └───────────────┘
//! ```
//!
//! The filesystem walker, the storage layer and the thumbnail cache are
//! collaborators supplied by the application through the traits in
//! [`scanner`], [`store`] and [`file_watch`].

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod file_watch;
pub mod hints;
pub mod metadata_write;
pub mod observer;
pub mod scanner;
pub mod store;
mod timer;
pub mod types;

// Re-exports for convenience
pub use config::ScanControllerConfig;
pub use controller::{Advice, ScanCollaborators, ScanController};
pub use error::{Result, ScanError};
pub use events::{EventBus, ScanEvent, ScanProgress};
pub use file_watch::FileWatchSink;
pub use hints::{
    AlbumCopyMoveHint, DstPath, Hint, HintContainer, HintKind, ItemChangeHint, ItemChangeReason,
    ItemCopyMoveHint, ItemMetadataAdjustmentHint, MetadataEditStatus, MetadataStamp,
};
pub use metadata_write::FileMetadataWrite;
pub use observer::{
    CancellationObserver, ContinueFlag, InitializationObserver, SchemaUpdateResult,
};
pub use scanner::{CollectionScanner, ScanMode, ScannerFactory, ScannerOptions};
pub use store::{CollectionStore, DatabaseField, ImageChangeset};
pub use types::{AlbumId, AlbumRootId, CollectionLocation, ItemId, ItemInfo, PhysicalAlbum};
