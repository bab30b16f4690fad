//! Backup location registry
//!
//! Persists up to four destination identifiers under fixed slot keys in a
//! single JSON store. The registry only persists; it never verifies that a
//! destination is still reachable, since liveness is the engine's concern
//! at backup time. Writes go through a temp file in the store's directory
//! and a rename, so a concurrent reader never observes a half-written
//! store.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use memprime_core::{BackupSlot, Error, Result};
use tracing::debug;

/// Default file name of the registry store
pub const REGISTRY_FILE_NAME: &str = "backup_locations.json";

/// Registry of configured backup destinations.
#[derive(Debug, Clone)]
pub struct LocationRegistry {
    store_path: PathBuf,
}

impl LocationRegistry {
    /// Open a registry backed by the given store file. The file does not
    /// need to exist yet.
    pub fn open(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
        }
    }

    /// Open the registry at the platform default location.
    pub fn open_default() -> Result<Self> {
        let config_dir = memprime_core::config::platform_config_dir()
            .ok_or_else(|| Error::invalid_config("no platform config directory available"))?;
        Ok(Self::open(config_dir.join(REGISTRY_FILE_NAME).into_std_path_buf()))
    }

    /// Path of the backing store file.
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Persist `identifier` under `slot`, overwriting any prior value.
    pub fn register(&self, slot: BackupSlot, identifier: &str) -> Result<()> {
        let mut map = self.load_map()?;
        map.insert(slot.key().to_string(), identifier.to_string());
        self.write_map(&map)
    }

    /// Remove whatever is persisted under `slot`. Returns the removed
    /// identifier, if any.
    pub fn remove(&self, slot: BackupSlot) -> Result<Option<String>> {
        let mut map = self.load_map()?;
        let removed = map.remove(slot.key());
        if removed.is_some() {
            self.write_map(&map)?;
        }
        Ok(removed)
    }

    /// The identifier currently persisted under `slot`, if any.
    pub fn get(&self, slot: BackupSlot) -> Result<Option<String>> {
        Ok(self.load_map()?.get(slot.key()).cloned())
    }

    /// All currently persisted (slot, identifier) pairs, in slot order.
    ///
    /// Reachability is deliberately not checked here.
    pub fn configured(&self) -> Result<Vec<(BackupSlot, String)>> {
        let map = self.load_map()?;
        Ok(BackupSlot::ALL
            .into_iter()
            .filter_map(|slot| map.get(slot.key()).map(|id| (slot, id.clone())))
            .collect())
    }

    fn load_map(&self) -> Result<BTreeMap<String, String>> {
        let content = match fs::read_to_string(&self.store_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(Error::Io(e)),
        };
        let map: BTreeMap<String, String> = serde_json::from_str(&content)?;
        Ok(map)
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let parent = self
            .store_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent)?;

        // Write-then-rename keeps the store whole under concurrent reads.
        let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
        serde_json::to_writer_pretty(&mut temp, map)?;
        temp.write_all(b"\n")?;
        temp.persist(&self.store_path)
            .map_err(|e| Error::Io(e.error))?;
        debug!("registry store rewritten: {}", self.store_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_registry() -> (TempDir, LocationRegistry) {
        let dir = TempDir::new().unwrap();
        let registry = LocationRegistry::open(dir.path().join(REGISTRY_FILE_NAME));
        (dir, registry)
    }

    #[test]
    fn empty_registry_lists_nothing() {
        let (_dir, registry) = temp_registry();
        assert!(registry.configured().unwrap().is_empty());
    }

    #[test]
    fn register_and_list_in_slot_order() {
        let (_dir, registry) = temp_registry();
        registry
            .register(BackupSlot::Location3, "/media/usb3")
            .unwrap();
        registry
            .register(BackupSlot::Location1, "/media/usb1")
            .unwrap();

        let configured = registry.configured().unwrap();
        assert_eq!(
            configured,
            vec![
                (BackupSlot::Location1, "/media/usb1".to_string()),
                (BackupSlot::Location3, "/media/usb3".to_string()),
            ]
        );
    }

    #[test]
    fn register_overwrites_prior_value() {
        let (_dir, registry) = temp_registry();
        registry.register(BackupSlot::Location2, "/old").unwrap();
        registry.register(BackupSlot::Location2, "/new").unwrap();
        assert_eq!(registry.get(BackupSlot::Location2).unwrap().unwrap(), "/new");
    }

    #[test]
    fn remove_clears_a_slot() {
        let (_dir, registry) = temp_registry();
        registry.register(BackupSlot::Location1, "/media").unwrap();
        assert_eq!(
            registry.remove(BackupSlot::Location1).unwrap().as_deref(),
            Some("/media")
        );
        assert!(registry.get(BackupSlot::Location1).unwrap().is_none());
        assert!(registry.remove(BackupSlot::Location1).unwrap().is_none());
    }

    #[test]
    fn store_uses_slot_key_layout() {
        let (_dir, registry) = temp_registry();
        registry.register(BackupSlot::Location1, "/media").unwrap();

        let raw = fs::read_to_string(registry.store_path()).unwrap();
        let map: BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(map["backup_location_slot_1"], "/media");
    }

    #[test]
    fn corrupt_store_is_an_error_not_a_panic() {
        let (_dir, registry) = temp_registry();
        fs::write(registry.store_path(), b"{not json").unwrap();
        assert!(registry.configured().is_err());
    }
}
