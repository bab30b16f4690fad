//! Error types for memprime-core

use thiserror::Error;

/// Result type alias using memprime-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the MemPrime backup tools
#[derive(Error, Debug)]
pub enum Error {
    /// Application storage root missing or with no entries at all
    #[error("application storage root is empty or unreadable: {path}")]
    StorageRootEmpty { path: String },

    /// The inner application data directory is absent
    #[error("application data directory not found: {path}")]
    DataDirMissing { path: String },

    /// The inner application data directory exists but holds nothing
    #[error("no database or audio directory under: {path}")]
    DataDirEmpty { path: String },

    /// The audio parent directory holds no numbered directories
    #[error("no numbered audio directories under: {path}")]
    AudioParentEmpty { path: String },

    /// The database backing file is absent from the data directory
    #[error("database file not found: {path}")]
    DatabaseMissing { path: String },

    /// Configuration file not found
    #[error("configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration contents
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A slot index outside 1..=4
    #[error("invalid backup slot: {value} (expected 1-4)")]
    InvalidSlot { value: String },

    /// A background job was torn down before finishing
    #[error("backup job interrupted: {message}")]
    Interrupted { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a storage-root-empty error
    pub fn storage_root_empty(path: impl Into<String>) -> Self {
        Self::StorageRootEmpty { path: path.into() }
    }

    /// Create a data-dir-missing error
    pub fn data_dir_missing(path: impl Into<String>) -> Self {
        Self::DataDirMissing { path: path.into() }
    }

    /// Create a data-dir-empty error
    pub fn data_dir_empty(path: impl Into<String>) -> Self {
        Self::DataDirEmpty { path: path.into() }
    }

    /// Create an audio-parent-empty error
    pub fn audio_parent_empty(path: impl Into<String>) -> Self {
        Self::AudioParentEmpty { path: path.into() }
    }

    /// Create a database-missing error
    pub fn database_missing(path: impl Into<String>) -> Self {
        Self::DatabaseMissing { path: path.into() }
    }

    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an interrupted-job error
    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::Interrupted {
            message: message.into(),
        }
    }

    /// Create an invalid slot error
    pub fn invalid_slot(value: impl Into<String>) -> Self {
        Self::InvalidSlot {
            value: value.into(),
        }
    }

    /// Whether this error aborts an entire backup run before any
    /// destination is touched.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            Self::StorageRootEmpty { .. }
                | Self::DataDirMissing { .. }
                | Self::DataDirEmpty { .. }
                | Self::AudioParentEmpty { .. }
                | Self::DatabaseMissing { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_errors_are_fatal_to_run() {
        assert!(Error::storage_root_empty("/data").is_fatal_to_run());
        assert!(Error::data_dir_empty("/data/com.md.MemoryPrime").is_fatal_to_run());
        assert!(Error::audio_parent_empty("/data/AudioMemo").is_fatal_to_run());
        assert!(Error::database_missing("memory_droid.db").is_fatal_to_run());
    }

    #[test]
    fn config_errors_are_not_fatal_to_run() {
        assert!(!Error::config_not_found("memprime.yaml").is_fatal_to_run());
        assert!(!Error::invalid_slot("9").is_fatal_to_run());
    }

    #[test]
    fn error_messages_name_the_offending_path() {
        let err = Error::database_missing("/data/com.md.MemoryPrime/memory_droid.db");
        assert!(err.to_string().contains("memory_droid.db"));
    }
}
