//! Secondary index shared by the device and entity registries

use std::collections::BTreeSet;

use dashmap::DashMap;

/// Maps a key (area, device, platform, ...) to the ids filed under it.
/// Members come back sorted.
#[derive(Debug, Default)]
pub(crate) struct MemberIndex {
    members: DashMap<String, BTreeSet<String>>,
}

impl MemberIndex {
    pub fn add(&self, key: Option<&str>, id: &str) {
        if let Some(key) = key {
            self.members
                .entry(key.to_string())
                .or_default()
                .insert(id.to_string());
        }
    }

    pub fn remove(&self, key: Option<&str>, id: &str) {
        let Some(key) = key else { return };
        let now_empty = self.members.get_mut(key).is_some_and(|mut ids| {
            ids.remove(id);
            ids.is_empty()
        });
        if now_empty {
            self.members.remove_if(key, |_, ids| ids.is_empty());
        }
    }

    pub fn members(&self, key: &str) -> Vec<String> {
        self.members
            .get(key)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}
