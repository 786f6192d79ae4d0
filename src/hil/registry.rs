//! File-backed registry of golden devices.
//!
//! The whole registry lives in `registry.json` under a base directory and is
//! rewritten on every mutation. A missing or unreadable file loads as an
//! empty registry. Writers are expected to be serialized by the caller.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use time::OffsetDateTime;

use crate::error::{HilError, Result};
use crate::hil::models::{GoldenDeviceInfo, GoldenRegistryRoot};

pub const REGISTRY_FILE_NAME: &str = "registry.json";

pub struct GoldenDeviceRegistry {
    base_dir: PathBuf,
    registry_file: PathBuf,
    root: GoldenRegistryRoot,
}

impl GoldenDeviceRegistry {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let registry_file = base_dir.join(REGISTRY_FILE_NAME);
        let root = load(&registry_file);
        GoldenDeviceRegistry {
            base_dir,
            registry_file,
            root,
        }
    }

    pub fn path(&self) -> &Path {
        &self.registry_file
    }

    /// Insert `info`, replacing any entry with the same `device_id`, and
    /// persist. `registered_at` is stamped with the current time. When the
    /// write fails the in-memory registry is left as it was.
    pub fn register(&mut self, mut info: GoldenDeviceInfo) -> Result<&GoldenDeviceInfo> {
        info.registered_at = now();
        let mut root = self.root.clone();
        let before = root.devices.len();
        root.devices.retain(|d| d.device_id != info.device_id);
        let replaced = root.devices.len() != before;
        let device_id = info.device_id.clone();
        let model = info.model.clone();
        root.devices.push(info);

        self.save(&root)?;
        self.root = root;
        info!(
            "{} golden device {} ({})",
            if replaced { "Replaced" } else { "Registered" },
            device_id,
            model
        );
        let index = self.root.devices.len() - 1;
        Ok(&self.root.devices[index])
    }

    pub fn get(&self, device_id: &str) -> Option<&GoldenDeviceInfo> {
        self.root.devices.iter().find(|d| d.device_id == device_id)
    }

    pub fn list(&self) -> impl Iterator<Item = &GoldenDeviceInfo> {
        self.root.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.root.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.devices.is_empty()
    }

    fn save(&self, root: &GoldenRegistryRoot) -> Result<()> {
        fs::create_dir_all(&self.base_dir).map_err(|e| HilError::io(&self.base_dir, e))?;
        let json = serde_json::to_string_pretty(root)?;
        fs::write(&self.registry_file, json).map_err(|e| HilError::io(&self.registry_file, e))?;
        debug!("Wrote {} devices to {}", root.devices.len(), self.registry_file.display());
        Ok(())
    }
}

fn load(path: &Path) -> GoldenRegistryRoot {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(_) => return GoldenRegistryRoot::default(),
    };
    match serde_json::from_str(&json) {
        Ok(root) => root,
        Err(e) => {
            warn!("Ignoring unreadable registry {}: {}", path.display(), e);
            GoldenRegistryRoot::default()
        }
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_empty_registry() {
        let dir = tempdir().unwrap();
        let registry = GoldenDeviceRegistry::new(dir.path().join("nowhere"));
        assert!(registry.is_empty());
        assert!(registry.get("x").is_none());
    }

    #[test]
    fn corrupt_file_is_empty_registry() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(REGISTRY_FILE_NAME), "{ not json").unwrap();
        let registry = GoldenDeviceRegistry::new(dir.path());
        assert_eq!(registry.list().count(), 0);
    }

    #[test]
    fn register_replaces_and_persists() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("golden");
        let mut registry = GoldenDeviceRegistry::new(&base);
        registry
            .register(GoldenDeviceInfo::new("X", "first").with_scenario("sahara", "a.json"))
            .unwrap();
        registry.register(GoldenDeviceInfo::new("Y", "other")).unwrap();
        registry.register(GoldenDeviceInfo::new("X", "second")).unwrap();

        let x: Vec<_> = registry.list().filter(|d| d.device_id == "X").collect();
        assert_eq!(x.len(), 1);
        assert_eq!(x[0].model, "second");
        assert!(x[0].scenarios.is_empty());
        assert!(x[0].registered_at > OffsetDateTime::UNIX_EPOCH);

        let reloaded = GoldenDeviceRegistry::new(&base);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("X").map(|d| d.model.as_str()), Some("second"));
        assert_eq!(reloaded.get("Y").map(|d| d.model.as_str()), Some("other"));
    }

    #[test]
    fn registry_file_layout() {
        let dir = tempdir().unwrap();
        let mut registry = GoldenDeviceRegistry::new(dir.path());
        registry
            .register(GoldenDeviceInfo::new("dev", "m").with_scenario("firehose", "f.json"))
            .unwrap();

        let json = fs::read_to_string(registry.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["devices"][0]["device_id"], "dev");
        assert_eq!(value["devices"][0]["chipset"], serde_json::Value::Null);
        assert_eq!(value["devices"][0]["scenarios"]["firehose"], "f.json");
        assert!(value["devices"][0]["registered_at"].is_string());
        assert!(json.contains('\n'));
    }

    #[test]
    fn failed_write_is_returned_and_keeps_previous_entry() {
        let dir = tempdir().unwrap();
        let mut registry = GoldenDeviceRegistry::new(dir.path());
        registry.register(GoldenDeviceInfo::new("X", "old")).unwrap();

        // A directory where the file should be makes the next write fail.
        fs::remove_file(registry.path()).unwrap();
        fs::create_dir(registry.path()).unwrap();

        let err = registry.register(GoldenDeviceInfo::new("X", "new")).unwrap_err();
        assert!(matches!(err, HilError::Io { .. }));
        assert_eq!(registry.get("X").map(|d| d.model.as_str()), Some("old"));
        assert_eq!(registry.len(), 1);

        let err = registry.register(GoldenDeviceInfo::new("Y", "other")).unwrap_err();
        assert!(matches!(err, HilError::Io { .. }));
        assert!(registry.get("Y").is_none());
    }
}
