use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::states::{STATE_UNAVAILABLE, STATE_UNKNOWN};
use crate::{Context, EntityId};

/// One entity's value at a point in time.
///
/// `last_changed` moves only when the value string changes, `last_updated`
/// on any value or attribute change, and `last_reported` on every write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub entity_id: EntityId,
    pub state: String,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
    pub last_changed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reported: Option<DateTime<Utc>>,
    pub context: Context,
}

impl State {
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, Value>,
        context: Context,
    ) -> Self {
        Self::new_at(entity_id, state, attributes, context, Utc::now())
    }

    /// Like [`State::new`], stamped with `at`
    pub fn new_at(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, Value>,
        context: Context,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: at,
            last_updated: at,
            last_reported: Some(at),
            context,
        }
    }

    /// Successor of this state. `last_changed` carries over when the value
    /// string is the same.
    pub fn with_update(
        &self,
        state: impl Into<String>,
        attributes: HashMap<String, Value>,
        context: Context,
    ) -> Self {
        let mut next = Self::new(self.entity_id.clone(), state, attributes, context);
        if next.state == self.state {
            next.last_changed = self.last_changed;
        }
        next
    }

    /// Same state, re-reported now
    pub fn reported(&self) -> Self {
        Self {
            last_reported: Some(Utc::now()),
            ..self.clone()
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }

    pub fn is_unknown(&self) -> bool {
        self.state == STATE_UNKNOWN
    }

    /// Neither `unknown` nor `unavailable`
    pub fn is_valid(&self) -> bool {
        !self.is_unknown() && !self.is_unavailable()
    }

    /// Typed attribute lookup; `None` when missing or of another type
    pub fn attribute<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        T::deserialize(self.attributes.get(key)?).ok()
    }
}

/// Timestamps and context are ignored
impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}
