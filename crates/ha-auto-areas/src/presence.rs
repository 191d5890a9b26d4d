//! Per-area presence state machine
//!
//! Presence is a fan-in of every tracked presence entity plus the presence
//! lock switch. One on-equivalent reading is enough to become present; the
//! area only becomes absent again once no tracked entity reads on.

use std::collections::{HashMap, HashSet};

use ha_core::states::{STATE_HOME, STATE_ON, STATE_PLAYING};
use tracing::debug;

/// Values counted as "someone is here"
pub const PRESENCE_ON_STATES: &[&str] = &[STATE_ON, STATE_HOME, STATE_PLAYING];

pub fn is_on_equivalent(value: &str) -> bool {
    PRESENCE_ON_STATES.contains(&value)
}

#[derive(Debug)]
pub struct PresenceAggregator {
    tracked: HashSet<String>,
    /// Latest known value per tracked entity; entities that never reported
    /// are absent from the map
    readings: HashMap<String, String>,
    present: Option<bool>,
}

impl PresenceAggregator {
    /// Track `entity_ids`; the presence lock is passed like any other input
    pub fn new<I, S>(entity_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tracked: entity_ids.into_iter().map(Into::into).collect(),
            readings: HashMap::new(),
            present: None,
        }
    }

    pub fn tracks(&self, entity_id: &str) -> bool {
        self.tracked.contains(entity_id)
    }

    pub fn tracked(&self) -> impl Iterator<Item = &str> {
        self.tracked.iter().map(String::as_str)
    }

    /// `None` until [`initialize`](Self::initialize) ran
    pub fn is_present(&self) -> Option<bool> {
        self.present
    }

    /// Entities currently reading on-equivalent, sorted
    pub fn active_entities(&self) -> Vec<&str> {
        let mut active: Vec<&str> = self
            .readings
            .iter()
            .filter(|(_, v)| is_on_equivalent(v))
            .map(|(k, _)| k.as_str())
            .collect();
        active.sort_unstable();
        active
    }

    /// Evaluate presence from the current values of tracked entities
    pub fn initialize<'a, I>(&mut self, current: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.readings.clear();
        for (entity_id, value) in current {
            if self.tracked.contains(entity_id) {
                self.readings.insert(entity_id.to_string(), value.to_string());
            }
        }
        let present = self.evaluate();
        debug!(present, active = ?self.active_entities(), "Initial presence");
        self.present = Some(present);
        present
    }

    /// Apply one state change. Returns the new presence only when it flips.
    ///
    /// `new` is `None` when the entity was removed from the state store.
    pub fn handle(&mut self, entity_id: &str, old: Option<&str>, new: Option<&str>) -> Option<bool> {
        if !self.tracked.contains(entity_id) || old == new {
            return None;
        }
        match new {
            Some(value) => {
                self.readings.insert(entity_id.to_string(), value.to_string());
            }
            None => {
                self.readings.remove(entity_id);
            }
        }

        let now_on = new.is_some_and(is_on_equivalent);
        let next = match self.present {
            Some(true) if now_on => return None,
            Some(true) => self.evaluate(),
            _ if now_on => true,
            // Absent (or never evaluated) and another off reading
            Some(false) => return None,
            None => self.evaluate(),
        };

        if self.present == Some(next) {
            return None;
        }
        debug!(entity_id, present = next, "Presence flipped");
        self.present = Some(next);
        Some(next)
    }

    /// Anyone here? No readings means nobody.
    fn evaluate(&self) -> bool {
        self.readings.values().any(|v| is_on_equivalent(v))
    }
}
