//! MemPrime Incremental Backup Engine
//!
//! This crate synchronizes the MemoryPrime flashcard app's local data
//! (one SQLite backing file plus a set of numbered audio-recording
//! directories) to up to four independently configured destination roots.
//! Per destination and per directory it decides whether existing backup
//! archives are stale, rebuilds only what is stale, and validates archive
//! structure on request, all without a manifest: staleness is derived
//! purely from timestamps and archive content.
//!
//! # Design
//!
//! - **Headless**: the engine depends only on injected services
//!   ([`engine::BackupServices`]): a location registry, a tree provider,
//!   and a feedback channel. No UI types anywhere.
//! - **Fan-out**: destinations run sequentially in slot order; the audio
//!   directories of one destination rebuild concurrently.
//! - **Failure isolation**: a scan failure aborts the run; an unreachable
//!   destination is dropped from the run; an archive failure stays inside
//!   its own artifact report.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use memprime_backup::engine::{BackupServices, IncrementalBackupEngine, RunOptions};
//! use memprime_backup::feedback::TracingFeedback;
//! use memprime_backup::locations::LocationRegistry;
//! use memprime_backup::storage::LocalTreeProvider;
//!
//! #[tokio::main]
//! async fn main() -> memprime_core::Result<()> {
//!     let services = BackupServices {
//!         registry: LocationRegistry::open_default()?,
//!         trees: Arc::new(LocalTreeProvider),
//!         feedback: Arc::new(TracingFeedback::new()),
//!         database: None,
//!     };
//!     let engine = IncrementalBackupEngine::new("/data/memprime", services);
//!     let summary = engine.run(RunOptions::default()).await?;
//!     println!("{} destinations processed", summary.destinations.len());
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod engine;
pub mod export;
pub mod feedback;
pub mod inventory;
pub mod locations;
pub mod storage;
pub mod validate;

// Re-export commonly used types
pub use archive::{entries_for_files, write_archive, ArchiveEntry};
pub use engine::{
    ArtifactOutcome, BackupJob, BackupServices, DestinationReport, DirectoryReport,
    IncrementalBackupEngine, RunOptions, RunSummary, DATABASE_ARCHIVE_NAME,
    DATABASE_ARCHIVE_ROTATED_NAME,
};
pub use export::{export_full, ExportSummary};
pub use feedback::{Feedback, SilentFeedback, TracingFeedback};
pub use inventory::{mark_directory_updated, scan, SourceInventory, UPDATE_TIME_FILE_NAME};
pub use locations::{LocationRegistry, REGISTRY_FILE_NAME};
pub use storage::{LocalNode, LocalTreeProvider, StorageError, StorageNode, TreeProvider};
pub use validate::is_valid_zip;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
