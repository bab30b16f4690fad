//! Capability-style storage tree abstraction
//!
//! Destinations are addressed through [`StorageNode`] handles rather than
//! filesystem paths: the engine only ever enumerates, creates, deletes,
//! renames, and opens children of a granted root. Expected conditions
//! (missing child, revoked access) surface as values, not panics or raised
//! errors; genuinely unexpected IO failures surface as [`StorageError`].

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use thiserror::Error;
use tracing::debug;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by a storage tree implementation
#[derive(Error, Debug)]
pub enum StorageError {
    /// The node (or a required parent) no longer exists
    #[error("storage node not found: {name}")]
    NotFound { name: String },

    /// Access to the node was denied by the platform
    #[error("access denied to storage node: {name}")]
    AccessDenied { name: String },

    /// A file could not be created under the node
    #[error("could not create {name}: {message}")]
    CreateFailed { name: String, message: String },

    /// Any other IO failure
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn access_denied(name: impl Into<String>) -> Self {
        Self::AccessDenied { name: name.into() }
    }

    pub fn create_failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CreateFailed {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Readable byte stream with random access (zip reading needs `Seek`)
pub trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

/// Writable byte stream with random access (zip writing needs `Seek`)
pub trait WriteSeek: Write + Seek + Send {}
impl<T: Write + Seek + Send> WriteSeek for T {}

/// A node (file or directory) inside a granted destination tree.
///
/// Mirrors the capability surface the host platform grants over an opaque
/// destination: children are addressed by name, metadata reads never raise,
/// and `delete`/`rename` report success as a plain flag so callers can
/// treat failure as an expected condition.
pub trait StorageNode: Send + Sync {
    /// Base name of this node
    fn name(&self) -> String;

    /// Whether the node currently exists
    fn exists(&self) -> bool;

    /// Whether the node is a directory
    fn is_directory(&self) -> bool;

    /// Size in bytes; 0 when unknown or not a regular file
    fn length(&self) -> u64;

    /// Last-modified time in milliseconds since the epoch; 0 when unknown
    fn last_modified(&self) -> i64;

    /// Find an existing direct child by name
    fn find_child(&self, name: &str) -> StorageResult<Option<Arc<dyn StorageNode>>>;

    /// Create (or truncate) a direct child file
    fn create_file(&self, mime_type: &str, name: &str) -> StorageResult<Arc<dyn StorageNode>>;

    /// Create a direct child directory
    fn create_directory(&self, name: &str) -> StorageResult<Arc<dyn StorageNode>>;

    /// Delete this node; returns whether the node is gone afterwards
    fn delete(&self) -> bool;

    /// Rename this node in place; returns whether the rename took effect.
    /// The handle itself goes stale on success.
    fn rename(&self, new_name: &str) -> bool;

    /// Open the node's content for reading
    fn open_read(&self) -> StorageResult<Box<dyn ReadSeek>>;

    /// Open the node's content for writing (truncates)
    fn open_write(&self) -> StorageResult<Box<dyn WriteSeek>>;
}

/// Resolves a persisted destination identifier to a live tree root.
///
/// The registry stores identifiers only; turning one back into a usable
/// handle is deferred to backup time so a revoked or unplugged destination
/// is discovered per run, not at registration.
pub trait TreeProvider: Send + Sync {
    /// Open the tree root for an identifier; `None` when the grant no
    /// longer resolves at all.
    fn open(&self, identifier: &str) -> Option<Arc<dyn StorageNode>>;
}

/// Local-filesystem destination node; the identifier is an absolute path.
pub struct LocalNode {
    path: PathBuf,
}

impl LocalNode {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_name(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

impl StorageNode for LocalNode {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn is_directory(&self) -> bool {
        self.path.is_dir()
    }

    fn length(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    fn last_modified(&self) -> i64 {
        modified_millis(&self.path).unwrap_or(0)
    }

    fn find_child(&self, name: &str) -> StorageResult<Option<Arc<dyn StorageNode>>> {
        let child = self.path.join(name);
        match child.try_exists() {
            Ok(true) => Ok(Some(Arc::new(LocalNode::new(child)))),
            Ok(false) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(StorageError::access_denied(child.to_string_lossy()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn create_file(&self, _mime_type: &str, name: &str) -> StorageResult<Arc<dyn StorageNode>> {
        let child = self.path.join(name);
        File::create(&child)
            .map_err(|e| StorageError::create_failed(child.to_string_lossy(), e.to_string()))?;
        Ok(Arc::new(LocalNode::new(child)))
    }

    fn create_directory(&self, name: &str) -> StorageResult<Arc<dyn StorageNode>> {
        let child = self.path.join(name);
        fs::create_dir_all(&child)
            .map_err(|e| StorageError::create_failed(child.to_string_lossy(), e.to_string()))?;
        Ok(Arc::new(LocalNode::new(child)))
    }

    fn delete(&self) -> bool {
        let result = if self.path.is_dir() {
            fs::remove_dir_all(&self.path)
        } else {
            fs::remove_file(&self.path)
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                debug!("delete failed for {}: {}", self.display_name(), e);
                !self.path.exists()
            }
        }
    }

    fn rename(&self, new_name: &str) -> bool {
        let Some(parent) = self.path.parent() else {
            return false;
        };
        match fs::rename(&self.path, parent.join(new_name)) {
            Ok(()) => true,
            Err(e) => {
                debug!("rename failed for {}: {}", self.display_name(), e);
                false
            }
        }
    }

    fn open_read(&self) -> StorageResult<Box<dyn ReadSeek>> {
        match File::open(&self.path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(self.display_name()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn open_write(&self) -> StorageResult<Box<dyn WriteSeek>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        Ok(Box::new(file))
    }
}

/// Provider resolving identifiers as local directory paths.
pub struct LocalTreeProvider;

impl TreeProvider for LocalTreeProvider {
    fn open(&self, identifier: &str) -> Option<Arc<dyn StorageNode>> {
        let path = PathBuf::from(identifier);
        if identifier.is_empty() {
            return None;
        }
        Some(Arc::new(LocalNode::new(path)))
    }
}

/// Last-modified time of a local path in epoch milliseconds.
pub fn modified_millis(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let duration = modified.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(duration.as_millis()).ok()
}
