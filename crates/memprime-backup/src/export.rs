//! One-shot full export
//!
//! Writes the complete data set (the database backing file and every
//! audio recording) into a single timestamped archive at a caller-chosen
//! location. Unlike the incremental engine this path has no staleness
//! logic: it always produces a fresh archive.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::Local;
use memprime_core::{Error, Result};
use tracing::info;

use crate::archive::{write_archive, ArchiveEntry};
use crate::inventory::{self, AUDIO_MEMO_DIR_NAME, DATABASE_FILE_NAME};

/// Result of a full export.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Path of the written archive
    pub archive_path: PathBuf,

    /// Number of entries in the archive
    pub entry_count: usize,

    /// Size of the archive in bytes
    pub size_bytes: u64,
}

/// Default file name for a full export started now.
pub fn export_file_name() -> String {
    format!("memprime_note_{}.zip", Local::now().timestamp_millis())
}

/// Export everything under `storage_root` into a single archive.
///
/// `output` may be an existing directory (a timestamped file name is
/// generated inside it) or the target file path itself. Entry names are
/// relative to the application data directory, so the database lands at
/// the archive root and audio files under `AudioMemo/<dir>/`.
pub fn export_full(storage_root: &Path, output: &Path) -> Result<ExportSummary> {
    let inventory = inventory::scan(storage_root)?;

    let mut entries = vec![ArchiveEntry {
        source: inventory.database.clone(),
        name: DATABASE_FILE_NAME.to_string(),
    }];
    for (dir_name, files) in &inventory.audio_files {
        for file in files {
            let Some(base) = file.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            entries.push(ArchiveEntry {
                source: file.clone(),
                name: format!("{AUDIO_MEMO_DIR_NAME}/{dir_name}/{base}"),
            });
        }
    }

    let archive_path = if output.is_dir() {
        output.join(export_file_name())
    } else {
        output.to_path_buf()
    };

    let sink = File::create(&archive_path)?;
    if !write_archive(&entries, Box::new(sink)) {
        return Err(Error::Io(std::io::Error::other(format!(
            "export archive write failed: {}",
            archive_path.display()
        ))));
    }

    let size_bytes = std::fs::metadata(&archive_path)?.len();
    info!(
        "exported {} entries to {}",
        entries.len(),
        archive_path.display()
    );

    Ok(ExportSummary {
        archive_path,
        entry_count: entries.len(),
        size_bytes,
    })
}
