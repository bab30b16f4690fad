//! Zip archive production
//!
//! Streams a fixed set of source files into a single archive, one entry
//! per file, entry names taken from the file base names. Failure is
//! reported as `false` rather than an error so callers can run their
//! rotate/retry logic without special-casing; the sink is consumed and
//! closed on every path.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::storage::WriteSeek;

/// One file destined for an archive, under a chosen entry name.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Local source file
    pub source: PathBuf,

    /// Entry name inside the archive
    pub name: String,
}

impl ArchiveEntry {
    /// Entry named after the file's base name.
    pub fn from_path(source: &Path) -> Option<Self> {
        let name = source.file_name()?.to_str()?.to_string();
        Some(Self {
            source: source.to_path_buf(),
            name,
        })
    }
}

/// Base-named entries for a list of files, silently skipping paths without
/// a representable base name.
pub fn entries_for_files(files: &[PathBuf]) -> Vec<ArchiveEntry> {
    files
        .iter()
        .filter_map(|path| ArchiveEntry::from_path(path))
        .collect()
}

/// Write `entries` into a zip archive on `sink`.
///
/// Returns `true` only when every entry was written and the archive was
/// terminated correctly. Any IO failure is logged and reported as `false`;
/// a pre-existing good archive at the destination must therefore be
/// deleted by the caller only after deciding to rebuild, never here.
pub fn write_archive(entries: &[ArchiveEntry], sink: Box<dyn WriteSeek>) -> bool {
    let mut zip = ZipWriter::new(sink);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in entries {
        if let Err(e) = zip.start_file(entry.name.as_str(), options) {
            warn!("archive entry start failed for {}: {}", entry.name, e);
            return false;
        }
        let mut source = match File::open(&entry.source) {
            Ok(file) => file,
            Err(e) => {
                warn!("archive source open failed for {}: {}", entry.name, e);
                return false;
            }
        };
        if let Err(e) = io::copy(&mut source, &mut zip) {
            warn!("archive write failed for {}: {}", entry.name, e);
            return false;
        }
    }

    match zip.finish() {
        Ok(mut sink) => {
            if let Err(e) = sink.flush() {
                warn!("archive flush failed: {}", e);
                return false;
            }
            debug!("archive written with {} entries", entries.len());
            true
        }
        Err(e) => {
            warn!("archive finish failed: {}", e);
            false
        }
    }
}
