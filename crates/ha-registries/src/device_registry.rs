//! Device registry. Entities without an area of their own inherit their
//! device's area.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entity_registry::DisabledBy;
use crate::index::MemberIndex;
use crate::storage::{Storable, Storage, StorageResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub disabled_by: Option<DisabledBy>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl DeviceEntry {
    pub fn new(name: &str, area_id: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            name: Some(name.to_string()),
            area_id: area_id.map(String::from),
            disabled_by: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DeviceRegistryData {
    devices: Vec<DeviceEntry>,
}

impl Storable for DeviceRegistryData {
    const KEY: &'static str = "core.device_registry";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 12;
}

pub struct DeviceRegistry {
    storage: Arc<Storage>,
    devices: DashMap<String, Arc<DeviceEntry>>,
    by_area: MemberIndex,
}

impl DeviceRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            devices: DashMap::new(),
            by_area: MemberIndex::default(),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        let Some(file) = self.storage.load::<DeviceRegistryData>().await? else {
            return Ok(());
        };
        info!(count = file.data.devices.len(), "Loading devices from storage");
        for entry in file.data.devices {
            self.insert(Arc::new(entry));
        }
        Ok(())
    }

    pub async fn save(&self) -> StorageResult<()> {
        let mut devices: Vec<DeviceEntry> = self.iter().map(|d| d.as_ref().clone()).collect();
        devices.sort_by_key(|d| d.created_at);
        let count = devices.len();
        self.storage.save(&DeviceRegistryData { devices }).await?;
        debug!(count, "Saved devices to storage");
        Ok(())
    }

    fn insert(&self, entry: Arc<DeviceEntry>) {
        self.by_area.add(entry.area_id.as_deref(), &entry.id);
        self.devices.insert(entry.id.clone(), entry);
    }

    fn take(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        let (_, entry) = self.devices.remove(device_id)?;
        self.by_area.remove(entry.area_id.as_deref(), device_id);
        Some(entry)
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        self.devices.get(device_id).map(|r| Arc::clone(r.value()))
    }

    pub fn get_by_area_id(&self, area_id: &str) -> Vec<Arc<DeviceEntry>> {
        self.by_area
            .members(area_id)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn create(&self, name: &str, area_id: Option<&str>) -> Arc<DeviceEntry> {
        let entry = Arc::new(DeviceEntry::new(name, area_id));
        info!(device_id = %entry.id, name = %name, "Registered new device");
        self.insert(Arc::clone(&entry));
        entry
    }

    pub fn update(
        &self,
        device_id: &str,
        f: impl FnOnce(&mut DeviceEntry),
    ) -> Option<Arc<DeviceEntry>> {
        let mut entry = self.take(device_id)?.as_ref().clone();
        f(&mut entry);
        entry.modified_at = Utc::now();

        let entry = Arc::new(entry);
        self.insert(Arc::clone(&entry));
        Some(entry)
    }

    pub fn remove(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        let entry = self.take(device_id)?;
        info!(device_id = %device_id, "Removed device");
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Arc<DeviceEntry>> + '_ {
        self.devices.iter().map(|r| Arc::clone(r.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DeviceRegistry {
        DeviceRegistry::new(Arc::new(Storage::new(std::env::temp_dir())))
    }

    #[test]
    fn test_area_index_follows_updates() {
        let devices = registry();
        let hub = devices.create("Motion Hub", Some("hallway"));
        assert_eq!(devices.get_by_area_id("hallway").len(), 1);

        devices.update(&hub.id, |d| d.area_id = Some("kitchen".into()));
        assert!(devices.get_by_area_id("hallway").is_empty());
        assert_eq!(devices.get_by_area_id("kitchen")[0].id, hub.id);

        devices.remove(&hub.id);
        assert!(devices.get_by_area_id("kitchen").is_empty());
        assert!(devices.is_empty());
    }

    #[test]
    fn test_disabled_device() {
        let devices = registry();
        let hub = devices.create("Hub", None);
        assert!(!hub.is_disabled());
        let hub = devices
            .update(&hub.id, |d| d.disabled_by = Some(DisabledBy::User))
            .unwrap();
        assert!(hub.is_disabled());
        assert!(devices.update("missing", |_| {}).is_none());
    }
}
