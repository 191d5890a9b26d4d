//! Types shared by every crate in the workspace: entity ids, states,
//! contexts, service calls and the state-change payload.

mod context;
pub mod domains;
mod entity_id;
mod event;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{slugify, EntityId, EntityIdError};
pub use event::StateChangedData;
pub use service_call::ServiceCall;
pub use state::State;

/// Well-known state values
pub mod states {
    pub const STATE_ON: &str = "on";
    pub const STATE_OFF: &str = "off";
    pub const STATE_HOME: &str = "home";
    pub const STATE_PLAYING: &str = "playing";
    pub const STATE_UNKNOWN: &str = "unknown";
    pub const STATE_UNAVAILABLE: &str = "unavailable";
}

/// Well-known service names
pub mod services {
    pub const SERVICE_TURN_ON: &str = "turn_on";
    pub const SERVICE_TURN_OFF: &str = "turn_off";
    pub const SERVICE_TOGGLE: &str = "toggle";
}

/// Well-known attribute keys
pub mod attributes {
    pub const ATTR_ENTITY_ID: &str = "entity_id";
    pub const ATTR_FRIENDLY_NAME: &str = "friendly_name";
    pub const ATTR_DEVICE_CLASS: &str = "device_class";
    pub const ATTR_UNIT_OF_MEASUREMENT: &str = "unit_of_measurement";
}
