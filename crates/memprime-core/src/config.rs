//! Configuration file loading and parsing

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::error::{Error, Result};
use crate::types::RetryPolicy;

/// Configuration file names to search for
const CONFIG_FILE_NAMES: &[&str] = &["memprime.yaml", "memprime.yml"];

/// Directory name used for platform config/data locations
const APP_DIR_NAME: &str = "memprime";

/// Application configuration, merged from `memprime.yaml` and defaults.
///
/// Every field is optional in the file; CLI flags override whatever is
/// loaded here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Root of the application's local storage (the directory containing
    /// `com.md.MemoryPrime/`)
    #[serde(default)]
    pub storage_root: Option<Utf8PathBuf>,

    /// Path of the backup location registry store
    #[serde(default)]
    pub registry_path: Option<Utf8PathBuf>,

    /// Emit spoken-style progress feedback during runs
    #[serde(default)]
    pub announce: bool,

    /// Run deep zip-content validation on existing archives
    #[serde(default)]
    pub deep_validation: bool,

    /// Retry policy for destination sink creation
    #[serde(default = "RetryPolicy::default")]
    pub retry: RetryPolicy,
}

impl AppConfig {
    /// Load configuration from the specified path or search for it.
    ///
    /// An explicit `path` must exist. Without one, the working directory and
    /// then the platform config directory are searched; if no file is found
    /// the built-in defaults are returned.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let content = match path {
            Some(p) => Some(fs::read_to_string(p).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::config_not_found(p.as_str())
                } else {
                    Error::Io(e)
                }
            })?),
            None => Self::find_config()?,
        };

        match content {
            Some(content) => {
                let config: AppConfig = serde_yaml_ng::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Search the working directory, then the platform config directory.
    fn find_config() -> Result<Option<String>> {
        let mut candidates: Vec<Utf8PathBuf> = CONFIG_FILE_NAMES
            .iter()
            .map(|name| Utf8PathBuf::from(*name))
            .collect();

        if let Some(config_dir) = platform_config_dir() {
            for name in CONFIG_FILE_NAMES {
                candidates.push(config_dir.join(name));
            }
        }

        for candidate in candidates {
            match fs::read_to_string(&candidate) {
                Ok(content) => return Ok(Some(content)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }

        Ok(None)
    }
}

/// The platform config directory for this application, if resolvable.
pub fn platform_config_dir() -> Option<Utf8PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", APP_DIR_NAME)?;
    Utf8PathBuf::from_path_buf(dirs.config_dir().to_path_buf()).ok()
}
