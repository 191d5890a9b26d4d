//! Area registry: the rooms and zones devices and entities are placed in

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ha_core::slugify;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaEntry {
    pub id: String,
    /// Display name, e.g. "Living Room"
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl AreaEntry {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: slugify(&name),
            name,
            icon: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// Identifier fragment derived from the display name ("living_room")
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

/// Lookup key for names: case, surrounding whitespace and punctuation are
/// ignored
fn name_key(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AreaRegistryData {
    areas: Vec<AreaEntry>,
}

impl Storable for AreaRegistryData {
    const KEY: &'static str = "core.area_registry";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 6;
}

pub struct AreaRegistry {
    storage: Arc<Storage>,
    areas: DashMap<String, Arc<AreaEntry>>,
    /// name_key -> area id
    names: DashMap<String, String>,
}

impl AreaRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            areas: DashMap::new(),
            names: DashMap::new(),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        let Some(file) = self.storage.load::<AreaRegistryData>().await? else {
            return Ok(());
        };
        info!(count = file.data.areas.len(), "Loading areas from storage");
        for entry in file.data.areas {
            self.insert(Arc::new(entry));
        }
        Ok(())
    }

    pub async fn save(&self) -> StorageResult<()> {
        let mut areas: Vec<AreaEntry> = self.iter().map(|a| a.as_ref().clone()).collect();
        areas.sort_by_key(|a| a.created_at);
        let count = areas.len();
        self.storage.save(&AreaRegistryData { areas }).await?;
        debug!(count, "Saved areas to storage");
        Ok(())
    }

    fn insert(&self, entry: Arc<AreaEntry>) {
        self.names.insert(name_key(&entry.name), entry.id.clone());
        self.areas.insert(entry.id.clone(), entry);
    }

    pub fn get(&self, area_id: &str) -> Option<Arc<AreaEntry>> {
        self.areas.get(area_id).map(|r| Arc::clone(r.value()))
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<AreaEntry>> {
        let area_id = self.names.get(&name_key(name))?.clone();
        self.get(&area_id)
    }

    /// Look an area up by id first, then by name
    pub fn resolve(&self, reference: &str) -> Option<Arc<AreaEntry>> {
        self.get(reference).or_else(|| self.get_by_name(reference))
    }

    /// Create an area, or return the one that already has this name.
    /// Names that slugify alike get a numeric suffix on their id.
    pub fn create(&self, name: &str) -> Arc<AreaEntry> {
        if let Some(existing) = self.get_by_name(name) {
            return existing;
        }
        let mut entry = AreaEntry::new(name);
        let base = entry.id.clone();
        for suffix in 2.. {
            if !self.areas.contains_key(&entry.id) {
                break;
            }
            entry.id = format!("{base}_{suffix}");
        }

        let entry = Arc::new(entry);
        info!(area_id = %entry.id, name = %name, "Created area");
        self.insert(Arc::clone(&entry));
        entry
    }

    pub fn remove(&self, area_id: &str) -> Option<Arc<AreaEntry>> {
        let (_, entry) = self.areas.remove(area_id)?;
        self.names.remove(&name_key(&entry.name));
        info!(area_id = %area_id, "Removed area");
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Arc<AreaEntry>> + '_ {
        self.areas.iter().map(|r| Arc::clone(r.value()))
    }
}
