//! State-change event payload

use serde::{Deserialize, Serialize};

use crate::{EntityId, State};

/// A single state change of one entity.
///
/// `old_state` is `None` the first time an entity is written; `new_state` is
/// `None` when the entity is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangedData {
    pub entity_id: EntityId,
    pub old_state: Option<State>,
    pub new_state: Option<State>,
}

impl StateChangedData {
    /// Previous state value, if the entity had one
    pub fn old_value(&self) -> Option<&str> {
        self.old_state.as_ref().map(|s| s.state.as_str())
    }

    /// New state value, or `None` if the entity was removed
    pub fn new_value(&self) -> Option<&str> {
        self.new_state.as_ref().map(|s| s.state.as_str())
    }

    /// Whether the state value differs between old and new.
    ///
    /// Attribute-only updates return `false`.
    pub fn value_changed(&self) -> bool {
        self.old_value() != self.new_value()
    }
}
