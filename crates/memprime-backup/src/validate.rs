//! Structural zip validation
//!
//! Reads a candidate archive's entry stream and confirms every entry's
//! metadata is readable and that the entry count matches the expected
//! source file count. Purely structural: a correctly-counted archive with
//! corrupted entry *content* still passes.

use std::io::{Read, Seek};

use tracing::debug;
use zip::ZipArchive;

/// Validate an archive against the number of files expected inside it.
///
/// Any failure while opening the archive or touching an entry's checksum,
/// compressed size, or name declares the archive invalid; otherwise it is
/// valid iff the entry count equals `expected_files`.
pub fn is_valid_zip<R: Read + Seek>(reader: R, expected_files: usize) -> bool {
    let mut archive = match ZipArchive::new(reader) {
        Ok(archive) => archive,
        Err(e) => {
            debug!("zip validation failed to open archive: {}", e);
            return false;
        }
    };

    let count = archive.len();
    for index in 0..count {
        match archive.by_index(index) {
            Ok(entry) => {
                // Touching these proves the entry header is readable.
                let _ = entry.crc32();
                let _ = entry.compressed_size();
                let _ = entry.name();
            }
            Err(e) => {
                debug!("zip validation failed at entry {}: {}", index, e);
                return false;
            }
        }
    }

    debug!("zip validation read {} entries, expected {}", count, expected_files);
    count == expected_files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Cursor;
    use std::path::PathBuf;
    use tempfile::TempDir;

    use crate::archive::{entries_for_files, write_archive};

    fn build_zip(dir: &TempDir, files: &[(&str, &[u8])]) -> PathBuf {
        let paths: Vec<PathBuf> = files
            .iter()
            .map(|(name, content)| {
                let path = dir.path().join(name);
                std::fs::write(&path, content).unwrap();
                path
            })
            .collect();
        let out = dir.path().join("archive.zip");
        let sink = File::create(&out).unwrap();
        assert!(write_archive(&entries_for_files(&paths), Box::new(sink)));
        out
    }

    #[test]
    fn round_trip_archive_validates_against_its_file_count() {
        let dir = TempDir::new().unwrap();
        let out = build_zip(&dir, &[("a.mp3", b"aaa"), ("b.mp3", b"bbb")]);
        assert!(is_valid_zip(File::open(&out).unwrap(), 2));
    }

    #[test]
    fn entry_count_mismatch_is_invalid() {
        let dir = TempDir::new().unwrap();
        let out = build_zip(&dir, &[("a.mp3", b"aaa")]);
        assert!(!is_valid_zip(File::open(&out).unwrap(), 2));
        assert!(!is_valid_zip(File::open(&out).unwrap(), 0));
    }

    #[test]
    fn garbage_bytes_are_invalid() {
        let reader = Cursor::new(b"this is not a zip archive".to_vec());
        assert!(!is_valid_zip(reader, 0));
    }

    #[test]
    fn zero_length_stream_is_invalid_even_for_zero_expected() {
        // An empty *file* is not an empty *archive*: no end-of-central-
        // directory record means it never counts as valid.
        let reader = Cursor::new(Vec::new());
        assert!(!is_valid_zip(reader, 0));
    }

    #[test]
    fn truncated_archive_is_invalid() {
        let dir = TempDir::new().unwrap();
        let out = build_zip(&dir, &[("a.mp3", &[0u8; 4096])]);
        let bytes = std::fs::read(&out).unwrap();
        let truncated = Cursor::new(bytes[..bytes.len() / 2].to_vec());
        assert!(!is_valid_zip(truncated, 1));
    }
}
