//! Test Home Assistant instance
//!
//! Real bus, state store, service registry and registries in a temporary
//! config directory. Light and scene services are captured instead of
//! executed.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ha_auto_areas::{AutoAreas, AutoAreasConfig, Host};
use ha_config::CoreConfig;
use ha_core::{Context, EntityId, ServiceCall, State};
use ha_event_bus::EventBus;
use ha_registries::{AreaEntry, Registries};
use ha_service_registry::ServiceRegistry;
use ha_state_store::StateStore;
use tempfile::TempDir;

/// Captured service domains and names
const CAPTURED: &[(&str, &str)] = &[
    ("light", "turn_on"),
    ("light", "turn_off"),
    ("scene", "turn_on"),
];

pub struct TestHomeAssistant {
    pub bus: Arc<EventBus>,
    pub states: Arc<StateStore>,
    pub services: Arc<ServiceRegistry>,
    pub registries: Arc<Registries>,
    pub core: CoreConfig,
    captured_service_calls: Arc<Mutex<Vec<ServiceCall>>>,
    _config_dir: TempDir,
}

impl TestHomeAssistant {
    pub fn new() -> Self {
        let config_dir = TempDir::new().expect("temp dir");
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateStore::new(bus.clone()));
        let services = Arc::new(ServiceRegistry::new());
        let registries = Arc::new(Registries::new(config_dir.path()));
        let captured_service_calls = Arc::new(Mutex::new(Vec::new()));

        for (domain, service) in CAPTURED {
            let captured = captured_service_calls.clone();
            services.register(*domain, *service, move |call: ServiceCall| {
                captured.lock().unwrap().push(call);
                async { Ok(()) }
            });
        }

        Self {
            bus,
            states,
            services,
            registries,
            core: CoreConfig::default(),
            captured_service_calls,
            _config_dir: config_dir,
        }
    }

    pub fn host(&self) -> Host {
        Host::new(
            self.states.clone(),
            self.bus.clone(),
            self.services.clone(),
            self.registries.clone(),
            self.core.clone(),
        )
    }

    /// Parse an `auto_areas:` YAML snippet and start the integration
    pub async fn setup(&self, yaml: &str) -> AutoAreas {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml).expect("valid yaml");
        let config = AutoAreasConfig::from_yaml(&value).expect("valid config");
        let auto_areas = AutoAreas::setup(&config, self.host()).await;
        self.settle().await;
        auto_areas
    }

    pub fn add_area(&self, name: &str) -> Arc<AreaEntry> {
        self.registries.areas.create(name)
    }

    /// Register an entity directly in an area
    pub fn add_entity(&self, entity_id: &str, area_id: &str, device_class: Option<&str>) {
        self.registries
            .entities
            .get_or_create("test", entity_id, None, None);
        self.registries
            .entities
            .update(entity_id, |e| {
                e.area_id = Some(area_id.to_string());
                e.original_device_class = device_class.map(String::from);
            })
            .expect("entity exists");
    }

    pub fn set_state(&self, entity_id: &str, state: &str) -> State {
        let entity_id: EntityId = entity_id.parse().expect("Invalid entity_id");
        self.states
            .set(entity_id, state, HashMap::new(), Context::new())
    }

    pub fn get_state(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id)
    }

    pub fn assert_state(&self, entity_id: &str, expected: &str) {
        let state = self.states.get_state(entity_id);
        assert_eq!(
            state.as_deref(),
            Some(expected),
            "Expected entity {} to be in state '{}', but was {:?}",
            entity_id,
            expected,
            state
        );
    }

    /// Let area tasks and spawned service calls run
    pub async fn settle(&self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    /// Poll until `entity_id` reads `expected`, then assert
    pub async fn wait_for_state(&self, entity_id: &str, expected: &str) {
        for _ in 0..100 {
            if self.states.is_state(entity_id, expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.assert_state(entity_id, expected);
    }

    pub fn captured_service_calls(&self) -> Vec<ServiceCall> {
        self.captured_service_calls.lock().unwrap().clone()
    }

    /// Captured calls as `domain.service` followed by targets
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.captured_service_calls()
            .iter()
            .map(|c| (c.service_id(), c.entity_ids()))
            .collect()
    }

    pub fn clear_service_calls(&self) {
        self.captured_service_calls.lock().unwrap().clear();
    }
}

impl Default for TestHomeAssistant {
    fn default() -> Self {
        Self::new()
    }
}

/// `(service_id, targets)` pair for comparing against [`TestHomeAssistant::calls`]
pub fn call(service_id: &str, targets: &[&str]) -> (String, Vec<String>) {
    (
        service_id.to_string(),
        targets.iter().map(|t| t.to_string()).collect(),
    )
}
