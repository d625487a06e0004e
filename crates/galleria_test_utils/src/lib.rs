//! Galleria Test Utilities
//!
//! In-memory collaborators for driving a real [`ScanController`] worker in
//! tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use galleria_scan::{ScanCollaborators, ScanController, ScanControllerConfig};
//! use galleria_test_utils::{MemoryStore, RecordingScannerFactory, ScanCall};
//! use std::sync::Arc;
//!
//! let scanners = Arc::new(RecordingScannerFactory::new());
//! let store = Arc::new(MemoryStore::new());
//! let controller = ScanController::new(
//!     ScanControllerConfig::default(),
//!     ScanCollaborators::new(scanners.clone(), store),
//! )?;
//!
//! controller.complete_collection_scan(false)?;
//! assert!(matches!(scanners.calls()[0], ScanCall::CompleteScan { .. }));
//! ```
//!
//! [`ScanController`]: galleria_scan::ScanController

pub mod events;
pub mod file_watch;
pub mod scanner;
pub mod store;

// Re-exports for convenience
pub use events::{recv_until, wait_for};
pub use file_watch::RecordingFileWatch;
pub use scanner::{Gate, RecordingScannerFactory, ScanCall};
pub use store::MemoryStore;
