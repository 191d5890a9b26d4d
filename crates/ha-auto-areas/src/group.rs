//! Area light group
//!
//! Every area with lights gets `light.area_lights_<area>`, a group over the
//! area's lights minus the excluded ones. The group reads `on` while any
//! member is on. Light commands addressed to a group are forwarded to its
//! members by the actuator, which looks them up in [`LightGroups`].

use std::collections::{BTreeMap, HashMap};

use dashmap::DashMap;
use ha_core::attributes::{ATTR_ENTITY_ID, ATTR_FRIENDLY_NAME};
use ha_core::domains::LIGHT;
use ha_core::states::{STATE_OFF, STATE_ON, STATE_UNAVAILABLE, STATE_UNKNOWN};
use ha_core::{EntityId, EntityIdError, State};
use serde_json::{json, Value};
use tracing::debug;

const LIGHT_GROUP_PREFIX: &str = "area_lights_";

pub fn light_group_entity_id(slug: &str) -> Result<EntityId, EntityIdError> {
    EntityId::with_slug(LIGHT, LIGHT_GROUP_PREFIX, slug)
}

/// Group state over its members' last known values
#[derive(Debug)]
pub struct LightGroup {
    entity_id: EntityId,
    friendly_name: String,
    /// Member -> last value; members that never reported are absent
    members: BTreeMap<String, Option<String>>,
}

impl LightGroup {
    pub fn new(entity_id: EntityId, friendly_name: impl Into<String>, members: &[String]) -> Self {
        Self {
            entity_id,
            friendly_name: friendly_name.into(),
            members: members.iter().map(|id| (id.clone(), None)).collect(),
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Member ids, sorted
    pub fn members(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    pub fn tracks(&self, entity_id: &str) -> bool {
        self.members.contains_key(entity_id)
    }

    pub fn initialize<'a, I>(&mut self, states: I)
    where
        I: IntoIterator<Item = &'a State>,
    {
        for value in self.members.values_mut() {
            *value = None;
        }
        for state in states {
            if let Some(value) = self.members.get_mut(&state.entity_id.to_string()) {
                *value = Some(state.state.clone());
            }
        }
    }

    /// Record a member's new value. Returns whether the group state changed.
    pub fn handle(&mut self, entity_id: &str, new: Option<&str>) -> bool {
        let before = self.state();
        let Some(value) = self.members.get_mut(entity_id) else {
            return false;
        };
        *value = new.map(String::from);
        let after = self.state();
        if before != after {
            debug!(group = %self.entity_id, state = after, "Light group changed");
        }
        before != after
    }

    /// `on` if any member is on, `off` if any is off, `unavailable` if all
    /// are unavailable, `unknown` otherwise
    pub fn state(&self) -> &'static str {
        let values = || self.members.values().flatten().map(String::as_str);
        if values().any(|v| v == STATE_ON) {
            STATE_ON
        } else if values().any(|v| v == STATE_OFF) {
            STATE_OFF
        } else if !self.members.is_empty()
            && self
                .members
                .values()
                .all(|v| v.as_deref() == Some(STATE_UNAVAILABLE))
        {
            STATE_UNAVAILABLE
        } else {
            STATE_UNKNOWN
        }
    }

    pub fn attributes(&self) -> HashMap<String, Value> {
        HashMap::from([
            (ATTR_FRIENDLY_NAME.to_string(), json!(self.friendly_name)),
            (ATTR_ENTITY_ID.to_string(), json!(self.members())),
        ])
    }
}

/// Membership of every running light group
#[derive(Debug, Default)]
pub struct LightGroups {
    groups: DashMap<String, Vec<String>>,
}

impl LightGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, entity_id: &EntityId, members: Vec<String>) {
        debug!(group = %entity_id, members = ?members, "Registered light group");
        self.groups.insert(entity_id.to_string(), members);
    }

    pub fn remove(&self, entity_id: &EntityId) -> bool {
        self.groups.remove(&entity_id.to_string()).is_some()
    }

    pub fn members(&self, entity_id: &str) -> Option<Vec<String>> {
        self.groups.get(entity_id).map(|m| m.clone())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Replace group ids with their members, keeping order and dropping
    /// duplicates
    pub fn expand(&self, targets: Vec<String>) -> Vec<String> {
        let mut expanded: Vec<String> = Vec::with_capacity(targets.len());
        for target in targets {
            let ids = self.members(&target).unwrap_or_else(|| vec![target]);
            for id in ids {
                if !expanded.contains(&id) {
                    expanded.push(id);
                }
            }
        }
        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_core::Context;

    fn group() -> LightGroup {
        LightGroup::new(
            light_group_entity_id("office").unwrap(),
            "Area Lights Office",
            &["light.desk".to_string(), "light.ceiling".to_string()],
        )
    }

    fn state(entity_id: &str, value: &str) -> State {
        State::new(entity_id.parse().unwrap(), value, HashMap::new(), Context::new())
    }

    #[test]
    fn test_group_state_follows_members() {
        let mut g = group();
        assert_eq!(g.entity_id().to_string(), "light.area_lights_office");
        assert_eq!(g.state(), "unknown");

        g.initialize([&state("light.desk", "off"), &state("light.other", "on")]);
        assert_eq!(g.state(), "off");

        assert!(g.handle("light.ceiling", Some("on")));
        assert!(!g.handle("light.desk", Some("on")));
        assert!(!g.handle("light.ceiling", Some("off")));
        assert!(g.handle("light.desk", Some("off")));
        assert!(!g.handle("light.other", Some("on")));
        assert_eq!(g.state(), "off");
    }

    #[test]
    fn test_all_members_unavailable() {
        let mut g = group();
        g.handle("light.desk", Some("unavailable"));
        assert_eq!(g.state(), "unknown");
        assert!(g.handle("light.ceiling", Some("unavailable")));
        assert_eq!(g.state(), "unavailable");
        assert!(g.handle("light.ceiling", None));
        assert_eq!(g.state(), "unknown");
    }

    #[test]
    fn test_attributes_list_members() {
        let attributes = group().attributes();
        assert_eq!(attributes["friendly_name"], json!("Area Lights Office"));
        assert_eq!(attributes["entity_id"], json!(["light.ceiling", "light.desk"]));
    }

    #[test]
    fn test_expand_forwards_to_members() {
        let groups = LightGroups::new();
        let id = light_group_entity_id("office").unwrap();
        groups.create(&id, vec!["light.ceiling".into(), "light.desk".into()]);

        assert_eq!(
            groups.expand(vec![id.to_string(), "light.desk".into(), "light.hall".into()]),
            vec!["light.ceiling", "light.desk", "light.hall"]
        );
        assert!(groups.remove(&id));
        assert_eq!(groups.expand(vec![id.to_string()]), vec![id.to_string()]);
        assert!(groups.is_empty());
    }
}
