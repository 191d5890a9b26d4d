//! Entity registry: which integration provides an entity, and where it lives

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::index::MemberIndex;
use crate::storage::{Storable, Storage, StorageResult};

#[derive(Debug, Error, Clone)]
pub enum EntityRegistryError {
    #[error("Entity not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledBy {
    ConfigEntry,
    Device,
    Hass,
    Integration,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    pub id: String,
    pub entity_id: String,
    /// Integration that provides the entity
    pub platform: String,

    #[serde(default)]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    /// Overrides the device's area when set
    #[serde(default)]
    pub area_id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,
    /// User override of `original_device_class`
    #[serde(default)]
    pub device_class: Option<String>,
    #[serde(default)]
    pub original_device_class: Option<String>,
    #[serde(default)]
    pub disabled_by: Option<DisabledBy>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl EntityEntry {
    pub fn new(entity_id: impl Into<String>, platform: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            entity_id: entity_id.into(),
            platform: platform.into(),
            unique_id: None,
            device_id: None,
            area_id: None,
            name: None,
            device_class: None,
            original_device_class: None,
            disabled_by: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn domain(&self) -> &str {
        ha_core::domains::domain_of(&self.entity_id)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }

    pub fn effective_device_class(&self) -> Option<&str> {
        self.device_class
            .as_deref()
            .or(self.original_device_class.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EntityRegistryData {
    entities: Vec<EntityEntry>,
}

impl Storable for EntityRegistryData {
    const KEY: &'static str = "core.entity_registry";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 19;
}

pub struct EntityRegistry {
    storage: Arc<Storage>,
    /// entity_id -> entry, kept in registration order for saving
    entries: RwLock<IndexMap<String, Arc<EntityEntry>>>,
    unique_ids: DashMap<String, String>,
    by_device: MemberIndex,
    by_area: MemberIndex,
    by_platform: MemberIndex,
}

impl EntityRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entries: RwLock::new(IndexMap::new()),
            unique_ids: DashMap::new(),
            by_device: MemberIndex::default(),
            by_area: MemberIndex::default(),
            by_platform: MemberIndex::default(),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        let Some(file) = self.storage.load::<EntityRegistryData>().await? else {
            return Ok(());
        };
        info!(count = file.data.entities.len(), "Loading entities from storage");
        for entry in file.data.entities {
            self.insert(Arc::new(entry));
        }
        Ok(())
    }

    pub async fn save(&self) -> StorageResult<()> {
        let entities: Vec<EntityEntry> = self.iter().iter().map(|e| e.as_ref().clone()).collect();
        let count = entities.len();
        self.storage.save(&EntityRegistryData { entities }).await?;
        debug!(count, "Saved entities to storage");
        Ok(())
    }

    fn insert(&self, entry: Arc<EntityEntry>) {
        let id = entry.entity_id.as_str();
        if let Some(unique_id) = &entry.unique_id {
            self.unique_ids.insert(unique_id.clone(), id.to_string());
        }
        self.by_device.add(entry.device_id.as_deref(), id);
        self.by_area.add(entry.area_id.as_deref(), id);
        self.by_platform.add(Some(&entry.platform), id);
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(id.to_string(), entry);
        }
    }

    fn take(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        let entry = self.entries.write().ok()?.shift_remove(entity_id)?;
        if let Some(unique_id) = &entry.unique_id {
            self.unique_ids.remove(unique_id);
        }
        self.by_device.remove(entry.device_id.as_deref(), entity_id);
        self.by_area.remove(entry.area_id.as_deref(), entity_id);
        self.by_platform.remove(Some(&entry.platform), entity_id);
        Some(entry)
    }

    fn lookup(&self, entity_ids: Vec<String>) -> Vec<Arc<EntityEntry>> {
        entity_ids.iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.entries.read().ok()?.get(entity_id).cloned()
    }

    pub fn get_by_unique_id(&self, unique_id: &str) -> Option<Arc<EntityEntry>> {
        let entity_id = self.unique_ids.get(unique_id)?.clone();
        self.get(&entity_id)
    }

    pub fn get_by_device_id(&self, device_id: &str) -> Vec<Arc<EntityEntry>> {
        self.lookup(self.by_device.members(device_id))
    }

    /// Entities assigned to `area_id` directly, not through their device
    pub fn get_by_area_id(&self, area_id: &str) -> Vec<Arc<EntityEntry>> {
        self.lookup(self.by_area.members(area_id))
    }

    pub fn get_by_platform(&self, platform: &str) -> Vec<Arc<EntityEntry>> {
        self.lookup(self.by_platform.members(platform))
    }

    /// Register an entity unless one with the same unique_id or entity_id
    /// already exists, in which case that entry is returned unchanged.
    pub fn get_or_create(
        &self,
        platform: &str,
        entity_id: &str,
        unique_id: Option<&str>,
        device_id: Option<&str>,
    ) -> Arc<EntityEntry> {
        if let Some(existing) = unique_id
            .and_then(|uid| self.get_by_unique_id(uid))
            .or_else(|| self.get(entity_id))
        {
            return existing;
        }

        let mut entry = EntityEntry::new(entity_id, platform);
        entry.unique_id = unique_id.map(String::from);
        entry.device_id = device_id.map(String::from);
        let entry = Arc::new(entry);
        self.insert(Arc::clone(&entry));
        info!(entity_id = %entity_id, platform = %platform, "Registered new entity");
        entry
    }

    pub fn update(
        &self,
        entity_id: &str,
        f: impl FnOnce(&mut EntityEntry),
    ) -> Result<Arc<EntityEntry>, EntityRegistryError> {
        let old = self
            .take(entity_id)
            .ok_or_else(|| EntityRegistryError::NotFound(entity_id.to_string()))?;
        let mut entry = old.as_ref().clone();
        f(&mut entry);
        entry.modified_at = Utc::now();

        let entry = Arc::new(entry);
        self.insert(Arc::clone(&entry));
        Ok(entry)
    }

    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        let entry = self.take(entity_id)?;
        info!(entity_id = %entity_id, "Removed entity");
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries in registration order
    pub fn iter(&self) -> Vec<Arc<EntityEntry>> {
        self.entries
            .read()
            .map(|e| e.values().cloned().collect())
            .unwrap_or_default()
    }
}
