//! Auto areas: per-area presence, light automation and derived sensors
//!
//! For every configured area the integration
//!
//! - fuses motion/occupancy/presence sensors and a presence lock switch into
//!   `binary_sensor.area_presence_<area>`,
//! - aggregates illuminance, temperature and humidity sensors into
//!   `sensor.area_<class>_<area>`,
//! - groups the area's lights into `light.area_lights_<area>`,
//! - turns that group (or scenes) on and off following presence, sleep mode
//!   and an illuminance threshold.
//!
//! The decision logic ([`PresenceAggregator`], [`LightController`],
//! [`AggregatedSensor`], composed by [`AreaEngine`]) is synchronous and
//! host-agnostic. [`AutoAreas`] runs one engine per area on the event bus.

pub mod area;
pub mod calculation;
pub mod config;
pub mod device_class;
mod error;
pub mod group;
pub mod host;
pub mod lights;
pub mod presence;
pub mod runtime;
pub mod sensor;
pub mod switch;

pub use area::{AreaEngine, Effect};
pub use calculation::{Calculation, Reading, ReadingValue};
pub use config::{AreaConfig, AutoAreasConfig, Issue, IssueKind};
pub use device_class::{EntityKind, SensorDeviceClass};
pub use error::{AutoAreasError, AutoAreasResult};
pub use group::{LightGroup, LightGroups};
pub use host::{Actuator, EntityDirectory, StateReader, TrackedEntity};
pub use lights::{Actuation, LightController, LightSettings};
pub use presence::PresenceAggregator;
pub use runtime::{AreaHandle, AutoAreas, Host};
pub use sensor::AggregatedSensor;
pub use switch::OwnedSwitches;

/// Integration name; also the platform of every entity it creates
pub const DOMAIN: &str = "auto_areas";
