//! Integration-owned switches: presence lock and sleep mode
//!
//! The switches live in the state store like any other entity, so the area
//! engines see their flips as ordinary state changes. `switch.turn_on`,
//! `switch.turn_off` and `switch.toggle` act on owned switches only.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use ha_core::attributes::ATTR_FRIENDLY_NAME;
use ha_core::domains::SWITCH;
use ha_core::services::{SERVICE_TOGGLE, SERVICE_TURN_OFF, SERVICE_TURN_ON};
use ha_core::states::{STATE_OFF, STATE_ON};
use ha_core::{Context, EntityId, EntityIdError, ServiceCall};
use ha_service_registry::{ServiceDescription, ServiceError, ServiceRegistry, ServiceResult};
use ha_state_store::SharedStateStore;
use serde_json::json;
use tracing::{debug, info, instrument};

const PRESENCE_LOCK_PREFIX: &str = "area_presence_lock_";
const SLEEP_MODE_PREFIX: &str = "area_sleep_mode_";

pub fn presence_lock_entity_id(slug: &str) -> Result<EntityId, EntityIdError> {
    EntityId::with_slug(SWITCH, PRESENCE_LOCK_PREFIX, slug)
}

pub fn sleep_mode_entity_id(slug: &str) -> Result<EntityId, EntityIdError> {
    EntityId::with_slug(SWITCH, SLEEP_MODE_PREFIX, slug)
}

pub struct OwnedSwitches {
    states: SharedStateStore,
    /// Owned switch -> friendly name
    owned: DashMap<EntityId, String>,
}

impl OwnedSwitches {
    pub fn new(states: SharedStateStore) -> Self {
        Self {
            states,
            owned: DashMap::new(),
        }
    }

    /// Take ownership of a switch and publish it as `off`
    #[instrument(skip(self, friendly_name), fields(entity_id = %entity_id))]
    pub fn create(&self, entity_id: EntityId, friendly_name: impl Into<String>) {
        self.owned.insert(entity_id.clone(), friendly_name.into());
        self.write(&entity_id, false, Context::new());
        debug!("Created switch");
    }

    /// Drop ownership and remove the state
    pub fn remove(&self, entity_id: &EntityId) -> bool {
        let removed = self.owned.remove(entity_id).is_some();
        if removed {
            self.states.remove(entity_id);
        }
        removed
    }

    pub fn is_owned(&self, entity_id: &str) -> bool {
        entity_id
            .parse::<EntityId>()
            .is_ok_and(|id| self.owned.contains_key(&id))
    }

    pub fn len(&self) -> usize {
        self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }

    /// Turn an owned switch on or off. Returns false for unknown switches.
    pub fn set(&self, entity_id: &str, on: bool, context: Context) -> bool {
        let Ok(id) = entity_id.parse::<EntityId>() else {
            return false;
        };
        if !self.owned.contains_key(&id) {
            return false;
        }
        self.write(&id, on, context);
        true
    }

    pub fn is_on(&self, entity_id: &str) -> bool {
        self.states.is_state(entity_id, STATE_ON)
    }

    fn write(&self, entity_id: &EntityId, on: bool, context: Context) {
        let mut attributes = HashMap::new();
        if let Some(name) = self.owned.get(entity_id) {
            attributes.insert(ATTR_FRIENDLY_NAME.to_string(), json!(name.value()));
        }
        let value = if on { STATE_ON } else { STATE_OFF };
        self.states.set(entity_id.clone(), value, attributes, context);
    }

    fn apply(&self, call: &ServiceCall) -> ServiceResult {
        let targets = call.entity_ids();
        if targets.is_empty() {
            return Err(ServiceError::InvalidData(format!(
                "{} needs an entity_id",
                call.service_id()
            )));
        }
        for entity_id in targets {
            let on = match call.service.as_str() {
                SERVICE_TURN_ON => true,
                SERVICE_TURN_OFF => false,
                _ => !self.is_on(&entity_id),
            };
            if self.set(&entity_id, on, call.context.clone()) {
                info!(entity_id = %entity_id, on, "Switch toggled");
            } else {
                debug!(entity_id = %entity_id, "Not an area switch, ignoring");
            }
        }
        Ok(())
    }

    /// Register the switch services
    pub fn register_services(self: &Arc<Self>, services: &ServiceRegistry) {
        for (service, name) in [
            (SERVICE_TURN_ON, "Turn on"),
            (SERVICE_TURN_OFF, "Turn off"),
            (SERVICE_TOGGLE, "Toggle"),
        ] {
            let switches = Arc::clone(self);
            let description = ServiceDescription::new(SWITCH, service).named(name);
            services.register_with_description(description, move |call: ServiceCall| {
                let result = switches.apply(&call);
                async move { result }
            });
        }
    }

    pub fn unregister_services(&self, services: &ServiceRegistry) {
        for service in [SERVICE_TURN_ON, SERVICE_TURN_OFF, SERVICE_TOGGLE] {
            services.unregister(SWITCH, service);
        }
    }
}
