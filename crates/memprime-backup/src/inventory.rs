//! Source inventory scanning
//!
//! One scan per backup run walks the application's local storage root and
//! produces a complete inventory: the database backing file plus every
//! numbered audio directory with its file list and last-known modification
//! timestamp. The scan is all-or-nothing; downstream staleness logic
//! assumes the timestamp mapping is either complete or absent, so any
//! structural problem aborts with a named error instead of returning a
//! partial inventory.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use memprime_core::{Error, Result};
use tracing::{debug, warn};

use crate::storage::modified_millis;

/// Application data directory under the storage root
pub const DATA_DIR_NAME: &str = "com.md.MemoryPrime";

/// Parent directory holding the numbered audio directories
pub const AUDIO_MEMO_DIR_NAME: &str = "AudioMemo";

/// The single relational-database backing file
pub const DATABASE_FILE_NAME: &str = "memory_droid.db";

/// Reserved marker file name inside each audio directory; its mtime (not
/// its content) records when the directory was last known-complete
pub const UPDATE_TIME_FILE_NAME: &str = "update_time_file.txt";

/// Complete inventory of the local data to back up.
#[derive(Debug, Clone)]
pub struct SourceInventory {
    /// Path of the database backing file
    pub database: PathBuf,

    /// Last-modified time of the database file, epoch milliseconds
    pub database_modified: i64,

    /// Audio directory name -> regular files inside it (marker included)
    pub audio_files: BTreeMap<String, Vec<PathBuf>>,

    /// Audio directory name -> recorded modification time from the marker
    /// file. A directory discovered without a marker gets one created and
    /// is deliberately absent from this map ("treat as modified now").
    pub audio_modified: BTreeMap<String, i64>,
}

impl SourceInventory {
    /// Recorded modification time for a directory, if its marker existed
    /// when the scan ran.
    pub fn recorded_modified(&self, dir_name: &str) -> Option<i64> {
        self.audio_modified.get(dir_name).copied()
    }
}

/// Create or re-touch the update-time marker of an audio directory.
///
/// The host application calls this after writing new audio into the
/// directory; the scanner calls it for directories observed without a
/// marker.
pub fn mark_directory_updated(dir: &Path) -> io::Result<()> {
    fs::write(dir.join(UPDATE_TIME_FILE_NAME), b"")
}

/// Walk the local storage root and build the inventory.
///
/// Fatal conditions (empty root, missing or empty data directory, empty
/// audio parent, missing database file) abort with a named error before
/// any destination is touched.
pub fn scan(storage_root: &Path) -> Result<SourceInventory> {
    let root_entries = read_dir_sorted(storage_root)
        .map_err(|_| Error::storage_root_empty(storage_root.to_string_lossy()))?;
    if root_entries.is_empty() {
        return Err(Error::storage_root_empty(storage_root.to_string_lossy()));
    }

    let data_dir = storage_root.join(DATA_DIR_NAME);
    if !data_dir.is_dir() {
        return Err(Error::data_dir_missing(data_dir.to_string_lossy()));
    }

    let data_entries = read_dir_sorted(&data_dir)?;
    if data_entries.is_empty() {
        return Err(Error::data_dir_empty(data_dir.to_string_lossy()));
    }

    let mut database: Option<PathBuf> = None;
    let mut audio_files = BTreeMap::new();
    let mut audio_modified = BTreeMap::new();

    for entry in data_entries {
        if entry.is_dir() {
            // The audio parent (AudioMemo) holding the numbered directories.
            scan_audio_parent(&entry, &mut audio_files, &mut audio_modified)?;
        } else if entry.file_name().and_then(|n| n.to_str()) == Some(DATABASE_FILE_NAME) {
            // The backing file itself; memory_droid.db-journal and friends
            // are deliberately left out of the inventory.
            database = Some(entry);
        } else {
            debug!("scan ignoring non-database file: {}", entry.display());
        }
    }

    let database = database
        .ok_or_else(|| Error::database_missing(data_dir.join(DATABASE_FILE_NAME).to_string_lossy()))?;
    let database_modified = modified_millis(&database).unwrap_or(0);

    Ok(SourceInventory {
        database,
        database_modified,
        audio_files,
        audio_modified,
    })
}

fn scan_audio_parent(
    parent: &Path,
    audio_files: &mut BTreeMap<String, Vec<PathBuf>>,
    audio_modified: &mut BTreeMap<String, i64>,
) -> Result<()> {
    let numbered_dirs = read_dir_sorted(parent)?;
    if numbered_dirs.is_empty() {
        return Err(Error::audio_parent_empty(parent.to_string_lossy()));
    }

    for numbered in numbered_dirs {
        if !numbered.is_dir() {
            warn!(
                "audio parent contained unknown file: {}",
                numbered.display()
            );
            continue;
        }

        let name = match numbered.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };

        let marker = numbered.join(UPDATE_TIME_FILE_NAME);
        if marker.exists() {
            audio_modified.insert(name.clone(), modified_millis(&marker).unwrap_or(0));
        } else {
            // First observation of this directory: stamp it now and leave
            // it out of the timestamp map so the engine treats it as
            // freshly modified.
            mark_directory_updated(&numbered)?;
        }

        // File list is taken after the marker exists, so the marker itself
        // is archived and counted.
        let files: Vec<PathBuf> = read_dir_sorted(&numbered)?
            .into_iter()
            .filter(|p| p.is_file())
            .collect();
        audio_files.insert(name, files);
    }

    Ok(())
}

/// Directory listing with a stable order, so inventories (and the archives
/// built from them) are deterministic across runs.
fn read_dir_sorted(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    Ok(entries)
}
