//! Latest [`State`] of every entity
//!
//! Every write that changes a value or its attributes is announced on the
//! [`EventBus`](ha_event_bus::EventBus) as a [`StateChangedData`] carrying the
//! old and new state. Removals announce `new_state: None`.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ha_core::{Context, EntityId, State, StateChangedData};
use ha_event_bus::SharedEventBus;
use serde_json::Value;
use tracing::{debug, instrument, trace};

pub struct StateStore {
    states: DashMap<EntityId, State>,
    event_bus: SharedEventBus,
}

impl StateStore {
    pub fn new(event_bus: SharedEventBus) -> Self {
        Self {
            states: DashMap::new(),
            event_bus,
        }
    }

    /// Write an entity's state.
    ///
    /// Repeating the current value and attributes only refreshes
    /// `last_reported` and announces nothing.
    #[instrument(skip(self, value, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        value: impl Into<String>,
        attributes: HashMap<String, Value>,
        context: Context,
    ) -> State {
        let value = value.into();

        // The entry guard is dropped before firing so subscribers may read
        let (old_state, new_state) = match self.states.entry(entity_id.clone()) {
            Entry::Occupied(mut slot) => {
                let current = slot.get();
                if current.state == value && current.attributes == attributes {
                    trace!("State unchanged");
                    let reported = current.reported();
                    slot.insert(reported.clone());
                    return reported;
                }
                let updated = current.with_update(value, attributes, context);
                (Some(slot.insert(updated.clone())), updated)
            }
            Entry::Vacant(slot) => {
                let created = State::new(entity_id.clone(), value, attributes, context);
                slot.insert(created.clone());
                (None, created)
            }
        };

        debug!(
            state = %new_state.state,
            old = ?old_state.as_ref().map(|s| s.state.as_str()),
            "State written"
        );
        self.event_bus.fire_state_changed(StateChangedData {
            entity_id,
            old_state,
            new_state: Some(new_state.clone()),
        });
        new_state
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        let id = entity_id.parse::<EntityId>().ok()?;
        self.states.get(&id).map(|s| s.clone())
    }

    /// Current value, or `None` for an unknown entity
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.get(entity_id).map(|s| s.state)
    }

    pub fn is_state(&self, entity_id: &str, value: &str) -> bool {
        self.get(entity_id).is_some_and(|s| s.state == value)
    }

    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId) -> Option<State> {
        let (_, old_state) = self.states.remove(entity_id)?;
        trace!("State removed");
        self.event_bus.fire_state_changed(StateChangedData {
            entity_id: entity_id.clone(),
            old_state: Some(old_state.clone()),
            new_state: None,
        });
        Some(old_state)
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

pub type SharedStateStore = Arc<StateStore>;
