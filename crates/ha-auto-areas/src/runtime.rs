//! Running area engines on the host
//!
//! Each area gets its own task fed by a bounded inbox subscribed to value
//! changes of the area's tracked entities. Events are processed strictly in
//! arrival order and the resulting effects are applied before the next event
//! is read. Entities whose changes overflowed the inbox are re-read from the
//! state store once the queue has drained.

use std::collections::HashMap;
use std::sync::Arc;

use ha_config::CoreConfig;
use ha_core::domains::{BINARY_SENSOR, LIGHT, SENSOR};
use ha_core::{Context, EntityId, StateChangedData};
use ha_event_bus::{
    inbox, Delivery, ListenerId, SharedEventBus, Subscription, DEFAULT_INBOX_CAPACITY,
};
use ha_registries::{AreaEntry, Registries};
use ha_service_registry::SharedServiceRegistry;
use ha_state_store::SharedStateStore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::area::{AreaEngine, Effect};
use crate::config::{validate, AreaConfig, AutoAreasConfig, Issue};
use crate::error::AutoAreasResult;
use crate::group::LightGroups;
use crate::host::{Actuator, EntityDirectory, RegistryDirectory, ServiceActuator};
use crate::switch::{presence_lock_entity_id, sleep_mode_entity_id, OwnedSwitches};
use crate::DOMAIN;

/// Domains scanned for area sources
const SOURCE_DOMAINS: &[&str] = &[BINARY_SENSOR, SENSOR, LIGHT];

/// Everything the integration needs from the host
#[derive(Clone)]
pub struct Host {
    pub states: SharedStateStore,
    pub bus: SharedEventBus,
    pub services: SharedServiceRegistry,
    pub registries: Arc<Registries>,
    pub core: CoreConfig,
    pub directory: Arc<dyn EntityDirectory>,
    pub actuator: Arc<dyn Actuator>,
    /// Area light groups, shared with the actuator that forwards to them
    pub light_groups: Arc<LightGroups>,
}

impl Host {
    /// Host with the registry-backed directory and the service actuator.
    ///
    /// `states` must fire its changes on `bus`.
    pub fn new(
        states: SharedStateStore,
        bus: SharedEventBus,
        services: SharedServiceRegistry,
        registries: Arc<Registries>,
        core: CoreConfig,
    ) -> Self {
        let light_groups = Arc::new(LightGroups::new());
        Self {
            directory: Arc::new(RegistryDirectory::new(
                Arc::clone(&registries),
                Arc::clone(&states),
            )),
            actuator: Arc::new(ServiceActuator::new(
                Arc::clone(&services),
                Arc::clone(&light_groups),
            )),
            light_groups,
            states,
            bus,
            services,
            registries,
            core,
        }
    }

    pub fn with_actuator(mut self, actuator: Arc<dyn Actuator>) -> Self {
        self.actuator = actuator;
        self
    }
}

fn apply(states: &SharedStateStore, actuator: &dyn Actuator, effects: Vec<Effect>, context: &Context) {
    for effect in effects {
        match effect {
            Effect::Publish {
                entity_id,
                state,
                attributes,
            } => {
                states.set(entity_id, state, attributes, context.child());
            }
            Effect::Actuate(action) => {
                debug!(domain = action.domain(), service = action.service(), targets = ?action.targets(), "Actuating");
                actuator.call_service(
                    action.domain(),
                    action.service(),
                    action.targets(),
                    context.child(),
                );
            }
        }
    }
}

/// A running area engine
pub struct AreaHandle {
    area: Arc<AreaEntry>,
    owned_entities: Vec<EntityId>,
    subscription: Subscription,
    task: JoinHandle<()>,
}

impl AreaHandle {
    /// Subscribe, apply the start effects, then process events on a task
    pub fn spawn(mut engine: AreaEngine, area: Arc<AreaEntry>, host: &Host) -> Self {
        let (tx, mut rx) = inbox(DEFAULT_INBOX_CAPACITY);
        // Subscribe before reading initial states so no change is missed
        let subscription =
            Subscription::value_changes(Arc::clone(&host.bus), engine.tracked_entity_ids(), tx);

        let effects = engine.start(host.states.as_ref());
        apply(&host.states, host.actuator.as_ref(), effects, &Context::new());

        let owned_entities = engine.published_entity_ids();
        let states = Arc::clone(&host.states);
        let actuator = Arc::clone(&host.actuator);
        let area_id = area.id.clone();
        let task = tokio::spawn(async move {
            while let Some(delivery) = rx.next().await {
                match delivery {
                    Delivery::Change(event) => {
                        let context = trigger_context(&event);
                        let effects = engine.handle(&event);
                        apply(&states, actuator.as_ref(), effects, &context);
                    }
                    Delivery::Missed(entity_ids) => {
                        warn!(area_id = %area_id, entities = ?entity_ids, "Re-reading entities after inbox overflow");
                        for entity_id in &entity_ids {
                            let effects = engine.resync(entity_id, states.as_ref());
                            apply(&states, actuator.as_ref(), effects, &Context::new());
                        }
                    }
                }
            }
            debug!(area_id = %area_id, "Area inbox closed");
        });

        Self {
            area,
            owned_entities,
            subscription,
            task,
        }
    }

    pub fn area(&self) -> &AreaEntry {
        &self.area
    }

    pub fn listener_id(&self) -> Option<ListenerId> {
        self.subscription.id()
    }

    /// Synthesized sensors published by this area
    pub fn owned_entities(&self) -> &[EntityId] {
        &self.owned_entities
    }

    /// Release the subscription and wait for queued events to drain
    pub async fn stop(mut self) {
        self.subscription.release();
        if let Err(e) = self.task.await {
            warn!(area_id = %self.area.id, error = %e, "Area task failed");
        }
    }
}

fn trigger_context(event: &StateChangedData) -> Context {
    event
        .new_state
        .as_ref()
        .or(event.old_state.as_ref())
        .map(|s| s.context.clone())
        .unwrap_or_default()
}

/// The integration: one engine per configured area
pub struct AutoAreas {
    host: Host,
    switches: Arc<OwnedSwitches>,
    areas: HashMap<String, AreaHandle>,
    issues: Vec<Issue>,
}

impl AutoAreas {
    /// Validate the configuration and start every usable area.
    ///
    /// Problems with single areas are recorded as issues; the remaining
    /// areas still start.
    #[instrument(skip_all, fields(areas = config.areas.len()))]
    pub async fn setup(config: &AutoAreasConfig, host: Host) -> Self {
        let validated = validate(config, &host.registries.areas);

        let switches = Arc::new(OwnedSwitches::new(Arc::clone(&host.states)));
        switches.register_services(&host.services);

        let mut auto_areas = Self {
            host,
            switches,
            areas: HashMap::new(),
            issues: validated.issues,
        };
        for (area_config, area) in validated.areas {
            match auto_areas.start_area(&area_config, Arc::clone(&area)) {
                Ok(handle) => {
                    auto_areas.areas.insert(area.id.clone(), handle);
                }
                Err(e) => warn!(area_id = %area.id, error = %e, "Failed to start area"),
            }
        }
        info!(
            started = auto_areas.areas.len(),
            issues = auto_areas.issues.len(),
            "Auto areas set up"
        );
        auto_areas
    }

    fn start_area(&self, config: &AreaConfig, area: Arc<AreaEntry>) -> AutoAreasResult<AreaHandle> {
        let slug = area.slug();

        let lock = presence_lock_entity_id(&slug)?;
        self.switches
            .create(lock.clone(), format!("Area Presence Lock {}", area.name));
        let mut synthesized = vec![lock];
        if config.is_sleeping_area {
            let sleep = sleep_mode_entity_id(&slug)?;
            self.switches
                .create(sleep.clone(), format!("Area Sleep Mode {}", area.name));
            synthesized.push(sleep);
        }

        let tracked: Vec<_> = self
            .host
            .directory
            .list_entities(&area.id, SOURCE_DOMAINS)
            .into_iter()
            .filter(|t| self.host.directory.entity_is_valid(&t.entity_id))
            .collect();
        debug!(area_id = %area.id, entities = tracked.len(), "Resolved area entities");

        let engine = AreaEngine::new(
            Arc::clone(&area),
            config,
            &tracked,
            self.host.core.temperature_unit(),
        )?;
        synthesized.extend(engine.published_entity_ids());
        self.register_entities(&area, &synthesized);
        if let Some(group) = engine.light_group() {
            self.host
                .light_groups
                .create(group.entity_id(), group.members());
        }

        info!(area_id = %area.id, name = %area.name, "Starting area");
        Ok(AreaHandle::spawn(engine, area, &self.host))
    }

    /// Record synthesized entities in the entity registry under this
    /// integration's platform
    fn register_entities(&self, area: &AreaEntry, entity_ids: &[EntityId]) {
        let entities = &self.host.registries.entities;
        for entity_id in entity_ids {
            let entity_id = entity_id.to_string();
            let unique_id = format!("{}_{}", area.id, entity_id);
            entities.get_or_create(DOMAIN, &entity_id, Some(&unique_id), None);
            if let Err(e) = entities.update(&entity_id, |e| e.area_id = Some(area.id.clone())) {
                warn!(entity_id = %entity_id, error = %e, "Could not assign area");
            }
        }
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Ids of running areas, sorted
    pub fn area_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.areas.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn area(&self, area_id: &str) -> Option<&AreaHandle> {
        self.areas.get(area_id)
    }

    /// Stop one area and remove its synthesized entities' states.
    ///
    /// Returns `false` if the area was not running.
    pub async fn unload(&mut self, area_id: &str) -> bool {
        let Some(handle) = self.areas.remove(area_id) else {
            return false;
        };
        let owned = handle.owned_entities().to_vec();
        let area = Arc::clone(&handle.area);
        handle.stop().await;

        for entity_id in &owned {
            self.host.light_groups.remove(entity_id);
            self.host.states.remove(entity_id);
        }
        let slug = area.slug();
        for switch in [presence_lock_entity_id(&slug), sleep_mode_entity_id(&slug)]
            .into_iter()
            .flatten()
        {
            self.switches.remove(&switch);
        }
        info!(area_id = %area_id, "Area unloaded");
        true
    }

    /// Stop every area and unregister the switch services
    pub async fn unload_all(&mut self) {
        for area_id in self.area_ids() {
            self.unload(&area_id).await;
        }
        self.switches.unregister_services(&self.host.services);
    }
}
