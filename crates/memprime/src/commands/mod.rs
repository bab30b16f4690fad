//! Command implementations

pub mod backup;
pub mod export;
pub mod locations;
pub mod version;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use memprime_backup::LocationRegistry;
use memprime_core::AppConfig;

/// Load configuration, treating an explicitly passed path as required.
pub(crate) fn load_config(config_path: Option<&Utf8Path>) -> Result<AppConfig> {
    AppConfig::load(config_path).context("could not load configuration")
}

/// Resolve the application storage root from flag, then config.
pub(crate) fn resolve_root(
    flag: Option<Utf8PathBuf>,
    config: &AppConfig,
) -> Result<Utf8PathBuf> {
    flag.or_else(|| config.storage_root.clone()).context(
        "no storage root configured; pass --root or set storage_root in memprime.yaml",
    )
}

/// Resolve the location registry from flag, then config, then the platform
/// default store.
pub(crate) fn resolve_registry(
    flag: Option<Utf8PathBuf>,
    config: &AppConfig,
) -> Result<LocationRegistry> {
    match flag.or_else(|| config.registry_path.clone()) {
        Some(path) => Ok(LocationRegistry::open(path.into_std_path_buf())),
        None => LocationRegistry::open_default().context("could not open default registry store"),
    }
}
