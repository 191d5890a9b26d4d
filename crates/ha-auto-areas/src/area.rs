//! One area's engine: presence, light policy and derived sensors wired
//! together
//!
//! The engine is synchronous and owns all per-area state. It turns state
//! changes into [`Effect`]s; applying them (writing states, calling
//! services) is the runtime's job.

use std::collections::HashMap;
use std::sync::Arc;

use ha_core::attributes::{ATTR_DEVICE_CLASS, ATTR_FRIENDLY_NAME, ATTR_UNIT_OF_MEASUREMENT};
use ha_core::states::{STATE_OFF, STATE_ON};
use ha_core::{EntityId, State, StateChangedData};
use ha_registries::AreaEntry;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::AreaConfig;
use crate::device_class::{EntityKind, SensorDeviceClass, AGGREGATED_CLASSES};
use crate::error::{AutoAreasError, AutoAreasResult};
use crate::group::{light_group_entity_id, LightGroup};
use crate::host::{StateReader, TrackedEntity};
use crate::lights::{Actuation, LightController};
use crate::presence::PresenceAggregator;
use crate::sensor::AggregatedSensor;
use crate::switch::{presence_lock_entity_id, sleep_mode_entity_id};

/// Something the runtime must do on behalf of an engine
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Write a synthesized entity's state
    Publish {
        entity_id: EntityId,
        state: String,
        attributes: HashMap<String, Value>,
    },
    Actuate(Actuation),
}

struct DerivedSensor {
    entity_id: EntityId,
    friendly_name: String,
    unit: Option<String>,
    aggregate: AggregatedSensor,
}

pub struct AreaEngine {
    area: Arc<AreaEntry>,
    presence_entity: EntityId,
    presence_lock: EntityId,
    sleep_mode: Option<EntityId>,
    presence: PresenceAggregator,
    light_group: Option<LightGroup>,
    lights: Option<LightController>,
    sensors: Vec<DerivedSensor>,
    /// Last state processed per tracked entity
    seen: HashMap<String, State>,
}

impl AreaEngine {
    pub fn new(
        area: Arc<AreaEntry>,
        config: &AreaConfig,
        tracked: &[TrackedEntity],
        temperature_unit: &str,
    ) -> AutoAreasResult<Self> {
        let slug = area.slug();
        if slug.is_empty() {
            return Err(AutoAreasError::InvalidAreaName(area.name.clone()));
        }

        let occupancy = SensorDeviceClass::Occupancy;
        let presence_entity =
            EntityId::with_slug(occupancy.domain(), occupancy.entity_prefix(), &slug)?;
        let presence_lock = presence_lock_entity_id(&slug)?;
        let sleep_mode = if config.is_sleeping_area {
            Some(sleep_mode_entity_id(&slug)?)
        } else {
            None
        };

        let of_kind = |kind: EntityKind| {
            tracked
                .iter()
                .filter(move |t| t.kind == kind)
                .map(|t| t.entity_id.clone())
        };

        let presence = PresenceAggregator::new(
            of_kind(EntityKind::Presence).chain(std::iter::once(presence_lock.to_string())),
        );

        let lights: Vec<String> = of_kind(EntityKind::Light)
            .filter(|id| !config.excluded_light_entities.contains(id))
            .collect();
        let (light_group, lights) = if lights.is_empty() {
            info!(area = %area.name, "No lights found, light automation disabled");
            (None, None)
        } else {
            let group_id = light_group_entity_id(&slug)?;
            let controller =
                LightController::new(config.light_settings(), vec![group_id.to_string()]);
            let group = LightGroup::new(group_id, format!("Area Lights {}", area.name), &lights);
            debug!(area = %area.name, members = ?group.members(), "Light group");
            (Some(group), Some(controller))
        };

        let mut sensors = Vec::with_capacity(AGGREGATED_CLASSES.len());
        for class in AGGREGATED_CLASSES {
            let entity_id = EntityId::with_slug(class.domain(), class.entity_prefix(), &slug)?;
            let aggregate = AggregatedSensor::new(
                class,
                entity_id.to_string(),
                config.calculation_for(class),
                of_kind(EntityKind::Sensor(class)),
            );
            debug!(
                area = %area.name,
                sensor = %entity_id,
                calculation = %aggregate.calculation(),
                sources = aggregate.sources().count(),
                "Derived sensor"
            );
            sensors.push(DerivedSensor {
                friendly_name: format!("{} {}", class.name_prefix(), area.name),
                unit: class.unit(temperature_unit).map(String::from),
                entity_id,
                aggregate,
            });
        }

        Ok(Self {
            area,
            presence_entity,
            presence_lock,
            sleep_mode,
            presence,
            light_group,
            lights,
            sensors,
            seen: HashMap::new(),
        })
    }

    pub fn area(&self) -> &AreaEntry {
        &self.area
    }

    pub fn presence_entity_id(&self) -> &EntityId {
        &self.presence_entity
    }

    pub fn presence_lock_entity_id(&self) -> &EntityId {
        &self.presence_lock
    }

    pub fn sleep_mode_entity_id(&self) -> Option<&EntityId> {
        self.sleep_mode.as_ref()
    }

    /// Entities published by the engine itself
    pub fn published_entity_ids(&self) -> Vec<EntityId> {
        std::iter::once(self.presence_entity.clone())
            .chain(self.light_group.iter().map(|g| g.entity_id().clone()))
            .chain(self.sensors.iter().map(|s| s.entity_id.clone()))
            .collect()
    }

    pub fn light_group(&self) -> Option<&LightGroup> {
        self.light_group.as_ref()
    }

    pub fn has_light_automation(&self) -> bool {
        self.lights.is_some()
    }

    pub fn lights(&self) -> Option<&LightController> {
        self.lights.as_ref()
    }

    pub fn is_present(&self) -> Option<bool> {
        self.presence.is_present()
    }

    /// Every entity whose changes the engine needs, sorted
    pub fn tracked_entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .presence
            .tracked()
            .chain(self.sensors.iter().flat_map(|s| s.aggregate.sources()))
            .map(String::from)
            .chain(self.light_group.iter().flat_map(LightGroup::members))
            .chain(self.sleep_mode.iter().map(ToString::to_string))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Compute initial values from current states and apply the light
    /// policy for the initial presence
    pub fn start(&mut self, states: &dyn StateReader) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.seen = self
            .tracked_entity_ids()
            .into_iter()
            .filter_map(|id| states.current(&id).map(|s| (id, s)))
            .collect();

        for sensor in &mut self.sensors {
            let current: Vec<_> = sensor
                .aggregate
                .sources()
                .filter_map(|id| states.current(id))
                .collect();
            sensor.aggregate.initialize(current.iter());
            effects.push(publish_sensor(sensor));
        }

        if let Some(group) = &mut self.light_group {
            let current: Vec<_> = group
                .members()
                .iter()
                .filter_map(|id| states.current(id))
                .collect();
            group.initialize(current.iter());
            effects.push(publish_group(group));
        }

        let current: Vec<(String, String)> = self
            .presence
            .tracked()
            .filter_map(|id| states.current(id).map(|s| (id.to_string(), s.state)))
            .collect();
        let present = self
            .presence
            .initialize(current.iter().map(|(id, v)| (id.as_str(), v.as_str())));
        effects.push(self.publish_presence(present));
        info!(area = %self.area.name, present, "Area engine started");

        let sleep_mode = self
            .sleep_mode
            .as_ref()
            .and_then(|id| states.current(&id.to_string()))
            .map(|s| s.state == STATE_ON);
        let illuminance = self.illuminance();
        if let Some(lights) = &mut self.lights {
            effects.extend(
                lights
                    .start(present, sleep_mode, illuminance)
                    .map(Effect::Actuate),
            );
        }
        effects
    }

    /// React to one state change
    pub fn handle(&mut self, event: &StateChangedData) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !event.value_changed() {
            return effects;
        }
        let entity_id = event.entity_id.to_string();
        match &event.new_state {
            Some(state) => {
                self.seen.insert(entity_id.clone(), state.clone());
            }
            None => {
                self.seen.remove(&entity_id);
            }
        }

        if let Some(present) =
            self.presence
                .handle(&entity_id, event.old_value(), event.new_value())
        {
            info!(area = %self.area.name, present, trigger = %entity_id, "Presence changed");
            effects.push(self.publish_presence(present));
            if let Some(lights) = &mut self.lights {
                effects.extend(lights.on_presence(present).map(Effect::Actuate));
            }
        }

        if self.sleep_mode.as_ref() == Some(&event.entity_id) {
            let enabled = match event.new_value() {
                Some(STATE_ON) => Some(true),
                Some(STATE_OFF) => Some(false),
                _ => None,
            };
            if let (Some(enabled), Some(lights)) = (enabled, &mut self.lights) {
                effects.extend(lights.on_sleep_mode(enabled).map(Effect::Actuate));
            }
        }

        if let Some(group) = &mut self.light_group {
            if group.handle(&entity_id, event.new_value()) {
                effects.push(publish_group(group));
            }
        }

        let mut illuminance_changed = false;
        for sensor in &mut self.sensors {
            if sensor.aggregate.handle(event) {
                debug!(sensor = %sensor.entity_id, value = %sensor.aggregate.state_string(), "Aggregate changed");
                illuminance_changed |=
                    sensor.aggregate.device_class() == SensorDeviceClass::Illuminance;
                effects.push(publish_sensor(sensor));
            }
        }
        if illuminance_changed {
            let illuminance = self.illuminance();
            if let Some(lights) = &mut self.lights {
                effects.extend(lights.on_illuminance(illuminance).map(Effect::Actuate));
            }
        }

        effects
    }

    /// Catch up with an entity whose changes were dropped: compare its
    /// current state with the last one processed and handle the difference
    /// as a regular change
    pub fn resync(&mut self, entity_id: &str, states: &dyn StateReader) -> Vec<Effect> {
        let Ok(id) = entity_id.parse::<EntityId>() else {
            return Vec::new();
        };
        let event = StateChangedData {
            entity_id: id,
            old_state: self.seen.get(entity_id).cloned(),
            new_state: states.current(entity_id),
        };
        if !event.value_changed() {
            return Vec::new();
        }
        debug!(area = %self.area.name, entity_id, value = ?event.new_value(), "Resynced");
        self.handle(&event)
    }

    fn illuminance(&self) -> Option<f64> {
        self.sensors
            .iter()
            .find(|s| s.aggregate.device_class() == SensorDeviceClass::Illuminance)
            .and_then(|s| s.aggregate.numeric_value())
    }

    fn publish_presence(&self, present: bool) -> Effect {
        let occupancy = SensorDeviceClass::Occupancy;
        Effect::Publish {
            entity_id: self.presence_entity.clone(),
            state: if present { STATE_ON } else { STATE_OFF }.to_string(),
            attributes: attributes(
                &format!("{} {}", occupancy.name_prefix(), self.area.name),
                occupancy,
                None,
            ),
        }
    }
}

fn publish_group(group: &LightGroup) -> Effect {
    Effect::Publish {
        entity_id: group.entity_id().clone(),
        state: group.state().to_string(),
        attributes: group.attributes(),
    }
}

fn publish_sensor(sensor: &DerivedSensor) -> Effect {
    Effect::Publish {
        entity_id: sensor.entity_id.clone(),
        state: sensor.aggregate.state_string(),
        attributes: attributes(
            &sensor.friendly_name,
            sensor.aggregate.device_class(),
            sensor.unit.as_deref(),
        ),
    }
}

fn attributes(
    friendly_name: &str,
    device_class: SensorDeviceClass,
    unit: Option<&str>,
) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    attributes.insert(ATTR_FRIENDLY_NAME.to_string(), json!(friendly_name));
    attributes.insert(ATTR_DEVICE_CLASS.to_string(), json!(device_class.as_str()));
    if let Some(unit) = unit {
        attributes.insert(ATTR_UNIT_OF_MEASUREMENT.to_string(), json!(unit));
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_core::{Context, State};
    use std::cell::RefCell;

    /// In-memory stand-in for the state store
    #[derive(Default)]
    struct States(RefCell<HashMap<String, State>>);

    impl States {
        fn set(&self, entity_id: &str, value: &str) -> StateChangedData {
            let new = State::new(entity_id.parse().unwrap(), value, HashMap::new(), Context::new());
            let old = self.0.borrow_mut().insert(entity_id.to_string(), new.clone());
            StateChangedData {
                entity_id: new.entity_id.clone(),
                old_state: old,
                new_state: Some(new),
            }
        }
    }

    impl StateReader for States {
        fn current(&self, entity_id: &str) -> Option<State> {
            self.0.borrow().get(entity_id).cloned()
        }
    }

    fn area(name: &str) -> Arc<AreaEntry> {
        Arc::new(AreaEntry::new(name))
    }

    fn tracked() -> Vec<TrackedEntity> {
        vec![
            TrackedEntity::new("binary_sensor.motion_a", EntityKind::Presence),
            TrackedEntity::new("binary_sensor.motion_b", EntityKind::Presence),
            TrackedEntity::new("light.ceiling", EntityKind::Light),
            TrackedEntity::new(
                "sensor.lux",
                EntityKind::Sensor(SensorDeviceClass::Illuminance),
            ),
        ]
    }

    fn actuations(effects: &[Effect]) -> Vec<Actuation> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Actuate(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    fn published<'a>(effects: &'a [Effect], entity_id: &str) -> Option<&'a str> {
        effects.iter().find_map(|e| match e {
            Effect::Publish { entity_id: id, state, .. } if id.to_string() == entity_id => {
                Some(state.as_str())
            }
            _ => None,
        })
    }

    fn on(slug: &str) -> Vec<Actuation> {
        vec![Actuation::TurnOnLights(vec![format!("light.area_lights_{slug}")])]
    }

    fn off(slug: &str) -> Vec<Actuation> {
        vec![Actuation::TurnOffLights(vec![format!("light.area_lights_{slug}")])]
    }

    #[test]
    fn test_entity_naming_and_tracking() {
        let mut config = AreaConfig::new("living_room");
        config.is_sleeping_area = true;
        let engine = AreaEngine::new(area("Living Room"), &config, &tracked(), "°C").unwrap();
        assert_eq!(
            engine.presence_entity_id().to_string(),
            "binary_sensor.area_presence_living_room"
        );
        assert_eq!(
            engine.sleep_mode_entity_id().map(ToString::to_string).as_deref(),
            Some("switch.area_sleep_mode_living_room")
        );
        assert_eq!(
            engine.tracked_entity_ids(),
            vec![
                "binary_sensor.motion_a",
                "binary_sensor.motion_b",
                "light.ceiling",
                "sensor.lux",
                "switch.area_presence_lock_living_room",
                "switch.area_sleep_mode_living_room",
            ]
        );
        assert_eq!(engine.published_entity_ids().len(), 5);
        assert_eq!(
            engine.light_group().map(|g| g.members()),
            Some(vec!["light.ceiling".to_string()])
        );
    }

    #[test]
    fn test_start_publishes_everything() {
        let states = States::default();
        states.set("binary_sensor.motion_a", "on");
        states.set("sensor.lux", "42");
        let mut engine =
            AreaEngine::new(area("Office"), &AreaConfig::new("office"), &tracked(), "°F").unwrap();

        let effects = engine.start(&states);
        assert_eq!(published(&effects, "binary_sensor.area_presence_office"), Some("on"));
        assert_eq!(published(&effects, "sensor.area_illuminance_office"), Some("42"));
        assert_eq!(published(&effects, "sensor.area_temperature_office"), Some("unknown"));
        assert_eq!(actuations(&effects), on("office"));

        let Some(Effect::Publish { attributes, .. }) = effects
            .iter()
            .find(|e| matches!(e, Effect::Publish { entity_id, .. } if entity_id.object_id() == "area_temperature_office"))
        else {
            panic!("temperature sensor not published");
        };
        assert_eq!(attributes["unit_of_measurement"], json!("°F"));
        assert_eq!(attributes["friendly_name"], json!("Area Temperature Office"));
    }

    #[test]
    fn test_duplicate_events_do_not_reactuate() {
        let states = States::default();
        let mut engine =
            AreaEngine::new(area("Office"), &AreaConfig::new("office"), &tracked(), "°C").unwrap();
        engine.start(&states);

        let event = states.set("binary_sensor.motion_a", "on");
        assert_eq!(actuations(&engine.handle(&event)), on("office"));
        assert!(engine.handle(&event).is_empty());
        let again = states.set("binary_sensor.motion_a", "on");
        assert!(engine.handle(&again).is_empty());
    }

    #[test]
    fn test_presence_lock_keeps_lights_on() {
        let states = States::default();
        let mut engine =
            AreaEngine::new(area("Office"), &AreaConfig::new("office"), &tracked(), "°C").unwrap();
        engine.start(&states);

        engine.handle(&states.set("binary_sensor.motion_a", "on"));
        engine.handle(&states.set("switch.area_presence_lock_office", "on"));
        assert!(actuations(&engine.handle(&states.set("binary_sensor.motion_a", "off"))).is_empty());
        assert_eq!(engine.is_present(), Some(true));
        let effects = engine.handle(&states.set("switch.area_presence_lock_office", "off"));
        assert_eq!(actuations(&effects), off("office"));
        assert_eq!(published(&effects, "binary_sensor.area_presence_office"), Some("off"));
    }

    #[test]
    fn test_illuminance_turns_lights_on_when_dark() {
        let states = States::default();
        states.set("sensor.lux", "150");
        let mut config = AreaConfig::new("office");
        config.auto_lights_illuminance_threshold = 100.0;
        let mut engine = AreaEngine::new(area("Office"), &config, &tracked(), "°C").unwrap();
        engine.start(&states);

        assert!(actuations(&engine.handle(&states.set("binary_sensor.motion_a", "on"))).is_empty());
        let effects = engine.handle(&states.set("sensor.lux", "50"));
        assert_eq!(published(&effects, "sensor.area_illuminance_office"), Some("50"));
        assert_eq!(actuations(&effects), on("office"));
        assert!(actuations(&engine.handle(&states.set("sensor.lux", "20"))).is_empty());
    }

    #[test]
    fn test_sleeping_bedroom_scenario() {
        let states = States::default();
        states.set("binary_sensor.motion_a", "off");
        states.set("binary_sensor.motion_b", "off");
        states.set("switch.area_sleep_mode_bedroom", "off");
        let mut config = AreaConfig::new("bedroom");
        config.is_sleeping_area = true;
        let mut engine = AreaEngine::new(area("Bedroom"), &config, &tracked(), "°C").unwrap();

        let effects = engine.start(&states);
        assert_eq!(published(&effects, "binary_sensor.area_presence_bedroom"), Some("off"));
        assert_eq!(actuations(&effects), off("bedroom"));

        assert_eq!(
            actuations(&engine.handle(&states.set("binary_sensor.motion_a", "on"))),
            on("bedroom")
        );
        assert_eq!(
            actuations(&engine.handle(&states.set("switch.area_sleep_mode_bedroom", "on"))),
            off("bedroom")
        );
        let effects = engine.handle(&states.set("binary_sensor.motion_a", "off"));
        assert_eq!(published(&effects, "binary_sensor.area_presence_bedroom"), Some("off"));
        assert!(actuations(&effects).is_empty());
        assert!(
            actuations(&engine.handle(&states.set("switch.area_sleep_mode_bedroom", "off")))
                .is_empty()
        );
    }

    #[test]
    fn test_excluded_lights_and_no_lights() {
        let mut config = AreaConfig::new("office");
        config.excluded_light_entities = vec!["light.ceiling".into()];
        let mut engine = AreaEngine::new(area("Office"), &config, &tracked(), "°C").unwrap();
        assert!(!engine.has_light_automation());

        let states = States::default();
        engine.start(&states);
        let effects = engine.handle(&states.set("binary_sensor.motion_b", "on"));
        assert_eq!(published(&effects, "binary_sensor.area_presence_office"), Some("on"));
        assert!(actuations(&effects).is_empty());
    }

    #[test]
    fn test_unusable_area_name() {
        let result = AreaEngine::new(area("!!!"), &AreaConfig::new("x"), &[], "°C");
        assert!(matches!(result, Err(AutoAreasError::InvalidAreaName(_))));
    }

    #[test]
    fn test_light_group_published() {
        let states = States::default();
        states.set("light.ceiling", "off");
        let mut engine =
            AreaEngine::new(area("Office"), &AreaConfig::new("office"), &tracked(), "°C").unwrap();

        let effects = engine.start(&states);
        assert_eq!(published(&effects, "light.area_lights_office"), Some("off"));

        let effects = engine.handle(&states.set("light.ceiling", "on"));
        assert_eq!(published(&effects, "light.area_lights_office"), Some("on"));
        assert!(actuations(&effects).is_empty());
    }

    #[test]
    fn test_resync_catches_up_with_dropped_changes() {
        let states = States::default();
        let mut engine =
            AreaEngine::new(area("Office"), &AreaConfig::new("office"), &tracked(), "°C").unwrap();
        engine.start(&states);
        engine.handle(&states.set("binary_sensor.motion_a", "on"));

        // The change to off never reached the engine
        states.set("binary_sensor.motion_a", "off");
        let effects = engine.resync("binary_sensor.motion_a", &states);
        assert_eq!(published(&effects, "binary_sensor.area_presence_office"), Some("off"));
        assert_eq!(actuations(&effects), off("office"));
        assert_eq!(engine.is_present(), Some(false));

        // Nothing left to catch up on
        assert!(engine.resync("binary_sensor.motion_a", &states).is_empty());
        assert!(engine.resync("sensor.unrelated", &states).is_empty());
    }
}
