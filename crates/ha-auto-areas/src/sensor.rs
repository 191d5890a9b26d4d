//! Generic derived sensor: one aggregate per device class per area

use std::collections::{HashMap, HashSet};

use ha_core::states::STATE_UNKNOWN;
use ha_core::{State, StateChangedData};
use tracing::trace;

use crate::calculation::{Calculation, Reading, ReadingValue};
use crate::device_class::SensorDeviceClass;

#[derive(Debug)]
pub struct AggregatedSensor {
    device_class: SensorDeviceClass,
    entity_id: String,
    calculation: Calculation,
    sources: HashSet<String>,
    /// Last valid reading per source
    window: HashMap<String, Reading>,
    value: Option<ReadingValue>,
}

impl AggregatedSensor {
    /// `entity_id` is the synthesized entity; it is never its own source
    pub fn new<I, S>(
        device_class: SensorDeviceClass,
        entity_id: impl Into<String>,
        calculation: Calculation,
        sources: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entity_id = entity_id.into();
        let sources = sources
            .into_iter()
            .map(Into::into)
            .filter(|id: &String| *id != entity_id)
            .collect();
        Self {
            device_class,
            entity_id,
            calculation,
            sources,
            window: HashMap::new(),
            value: None,
        }
    }

    pub fn device_class(&self) -> SensorDeviceClass {
        self.device_class
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn calculation(&self) -> Calculation {
        self.calculation
    }

    pub fn tracks(&self, entity_id: &str) -> bool {
        self.sources.contains(entity_id)
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(String::as_str)
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Fill the window from current states and compute the first value
    pub fn initialize<'a, I>(&mut self, states: I)
    where
        I: IntoIterator<Item = &'a State>,
    {
        self.window.clear();
        for state in states {
            let id = state.entity_id.to_string();
            if self.sources.contains(&id) {
                self.update_window(id, Some(state));
            }
        }
        self.recompute();
    }

    /// Apply a state change. Returns whether the aggregate changed.
    pub fn handle(&mut self, event: &StateChangedData) -> bool {
        let id = event.entity_id.to_string();
        if !self.sources.contains(&id) {
            return false;
        }
        self.update_window(id, event.new_state.as_ref());
        self.recompute()
    }

    pub fn value(&self) -> Option<&ReadingValue> {
        self.value.as_ref()
    }

    pub fn numeric_value(&self) -> Option<f64> {
        self.value.as_ref().and_then(ReadingValue::as_number)
    }

    /// Published state: the aggregate, or `unknown`
    pub fn state_string(&self) -> String {
        self.value
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| STATE_UNKNOWN.to_string())
    }

    fn update_window(&mut self, entity_id: String, state: Option<&State>) {
        let reading = state.map(Reading::from_state).filter(|r| self.accepts(&r.value));
        match reading {
            Some(reading) => {
                self.window.insert(entity_id, reading);
            }
            None => {
                trace!(entity_id = %entity_id, sensor = %self.entity_id, "Evicting reading");
                self.window.remove(&entity_id);
            }
        }
    }

    fn accepts(&self, value: &ReadingValue) -> bool {
        if self.device_class.is_numeric() {
            value.as_number().is_some()
        } else {
            value.as_bool().is_some()
        }
    }

    fn recompute(&mut self) -> bool {
        let readings: Vec<Reading> = self.window.values().cloned().collect();
        let value = self.calculation.apply(&readings);
        let changed = value != self.value;
        self.value = value;
        changed
    }
}
