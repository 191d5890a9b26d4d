//! Area, device, and entity registries
//!
//! All registries persist as JSON in the `.storage/` directory with a
//! versioned envelope.

mod index;
pub mod storage;

pub mod area_registry;
pub mod device_registry;
pub mod entity_registry;

pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};

pub use entity_registry::{DisabledBy, EntityEntry, EntityRegistry, EntityRegistryError};

pub use device_registry::{DeviceEntry, DeviceRegistry};

pub use area_registry::{AreaEntry, AreaRegistry};

use std::sync::Arc;

/// All registries bundled together
pub struct Registries {
    pub storage: Arc<Storage>,
    pub entities: EntityRegistry,
    pub devices: DeviceRegistry,
    pub areas: AreaRegistry,
}

impl Registries {
    /// Create empty registries backed by `<config_dir>/.storage`
    pub fn new(config_dir: impl AsRef<std::path::Path>) -> Self {
        let storage = Arc::new(Storage::new(config_dir));

        Self {
            entities: EntityRegistry::new(storage.clone()),
            devices: DeviceRegistry::new(storage.clone()),
            areas: AreaRegistry::new(storage.clone()),
            storage,
        }
    }

    pub async fn load_all(&self) -> StorageResult<()> {
        self.areas.load().await?;
        self.devices.load().await?;
        self.entities.load().await?;
        Ok(())
    }

    pub async fn save_all(&self) -> StorageResult<()> {
        self.areas.save().await?;
        self.devices.save().await?;
        self.entities.save().await?;
        Ok(())
    }

    /// Area of an entity: its own assignment, else its device's
    pub fn entity_area_id(&self, entity_id: &str) -> Option<String> {
        let entry = self.entities.get(entity_id)?;
        if let Some(area_id) = &entry.area_id {
            return Some(area_id.clone());
        }
        let device = self.devices.get(entry.device_id.as_deref()?)?;
        device.area_id.clone()
    }

    /// Every entity located in `area_id`, directly or through its device
    pub fn entities_in_area(&self, area_id: &str) -> Vec<Arc<EntityEntry>> {
        let mut found = self.entities.get_by_area_id(area_id);
        for device in self.devices.get_by_area_id(area_id) {
            found.extend(
                self.entities
                    .get_by_device_id(&device.id)
                    .into_iter()
                    .filter(|e| e.area_id.is_none()),
            );
        }
        found.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        found.dedup_by(|a, b| a.entity_id == b.entity_id);
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_registries_roundtrip_through_storage() {
        let temp_dir = TempDir::new().unwrap();
        let registries = Registries::new(temp_dir.path());

        let bedroom = registries.areas.create("Bedroom");
        let hub = registries.devices.create("Ceiling sensor", Some(&bedroom.id));
        registries
            .entities
            .get_or_create("zha", "binary_sensor.bedroom_motion", Some("m1"), Some(&hub.id));

        registries.save_all().await.unwrap();

        let reloaded = Registries::new(temp_dir.path());
        reloaded.load_all().await.unwrap();

        assert_eq!(reloaded.areas.len(), 1);
        assert_eq!(reloaded.devices.len(), 1);
        assert_eq!(reloaded.entities.len(), 1);
        assert_eq!(
            reloaded.entity_area_id("binary_sensor.bedroom_motion").as_deref(),
            Some("bedroom")
        );
    }

    #[test]
    fn test_entity_area_overrides_device_area() {
        let temp_dir = TempDir::new().unwrap();
        let registries = Registries::new(temp_dir.path());
        let hub = registries.devices.create("Hub", Some("hallway"));

        registries
            .entities
            .get_or_create("zha", "sensor.hub_lux", None, Some(&hub.id));
        registries
            .entities
            .get_or_create("zha", "binary_sensor.hub_motion", None, Some(&hub.id));
        registries
            .entities
            .update("sensor.hub_lux", |e| e.area_id = Some("kitchen".into()))
            .unwrap();

        let hallway: Vec<_> = registries
            .entities_in_area("hallway")
            .iter()
            .map(|e| e.entity_id.clone())
            .collect();
        assert_eq!(hallway, vec!["binary_sensor.hub_motion"]);
        assert_eq!(registries.entities_in_area("kitchen").len(), 1);
        assert_eq!(registries.entity_area_id("sensor.missing"), None);
    }
}
