//! Host interfaces consumed by the area engines
//!
//! The engines see the host through three narrow traits: a directory of
//! entities per area, a reader for current states, and a fire-and-forget
//! actuator. The `Registry*`/`Service*` types implement them on top of the
//! registries, state store and service registry. The service actuator also
//! forwards light commands addressed to an area light group to its members.

use std::sync::Arc;

use ha_core::domains::LIGHT;
use ha_core::{Context, State};
use ha_registries::Registries;
use ha_service_registry::SharedServiceRegistry;
use ha_state_store::{SharedStateStore, StateStore};
use serde_json::json;
use tracing::{debug, warn};

use crate::device_class::EntityKind;
use crate::group::LightGroups;
use crate::DOMAIN;

/// A source entity of an area with its role
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackedEntity {
    pub entity_id: String,
    pub kind: EntityKind,
}

impl TrackedEntity {
    pub fn new(entity_id: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind,
        }
    }
}

/// Which entities belong to an area
pub trait EntityDirectory: Send + Sync {
    /// Entities of `area_id` in any of `domains`, sorted by entity id
    fn list_entities(&self, area_id: &str, domains: &[&str]) -> Vec<TrackedEntity>;

    /// Disabled entities and entities currently `unavailable` are not valid
    fn entity_is_valid(&self, entity_id: &str) -> bool;
}

/// Current entity states
pub trait StateReader {
    fn current(&self, entity_id: &str) -> Option<State>;
}

impl StateReader for StateStore {
    fn current(&self, entity_id: &str) -> Option<State> {
        self.get(entity_id)
    }
}

/// Issues service calls without waiting for them
pub trait Actuator: Send + Sync {
    fn call_service(&self, domain: &str, service: &str, targets: Vec<String>, context: Context);
}

/// Directory backed by the entity, device and area registries
pub struct RegistryDirectory {
    registries: Arc<Registries>,
    states: SharedStateStore,
}

impl RegistryDirectory {
    pub fn new(registries: Arc<Registries>, states: SharedStateStore) -> Self {
        Self { registries, states }
    }
}

impl EntityDirectory for RegistryDirectory {
    fn list_entities(&self, area_id: &str, domains: &[&str]) -> Vec<TrackedEntity> {
        self.registries
            .entities_in_area(area_id)
            .into_iter()
            // Never feed synthesized entities back in
            .filter(|e| e.platform != DOMAIN)
            .filter(|e| domains.contains(&e.domain()))
            .map(|e| {
                let kind = EntityKind::classify(&e.entity_id, e.effective_device_class());
                TrackedEntity::new(e.entity_id.clone(), kind)
            })
            .collect()
    }

    fn entity_is_valid(&self, entity_id: &str) -> bool {
        if let Some(entry) = self.registries.entities.get(entity_id) {
            if entry.is_disabled() {
                debug!(entity_id, "Skipping disabled entity");
                return false;
            }
        }
        !self
            .states
            .get(entity_id)
            .is_some_and(|state| state.is_unavailable())
    }
}

/// Actuator calling services on the service registry from a spawned task.
///
/// Must be used from within a tokio runtime.
pub struct ServiceActuator {
    services: SharedServiceRegistry,
    light_groups: Arc<LightGroups>,
}

impl ServiceActuator {
    pub fn new(services: SharedServiceRegistry, light_groups: Arc<LightGroups>) -> Self {
        Self {
            services,
            light_groups,
        }
    }
}

impl Actuator for ServiceActuator {
    fn call_service(&self, domain: &str, service: &str, targets: Vec<String>, context: Context) {
        let targets = if domain == LIGHT {
            self.light_groups.expand(targets)
        } else {
            targets
        };
        let services = Arc::clone(&self.services);
        let domain = domain.to_string();
        let service = service.to_string();
        tokio::spawn(async move {
            let data = json!({ "entity_id": targets });
            if let Err(e) = services.call(&domain, &service, data, context).await {
                warn!(domain = %domain, service = %service, error = %e, "Service call failed");
            }
        });
    }
}
