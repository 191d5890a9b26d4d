//! Entity domains the area automation reads from or writes to

pub const BINARY_SENSOR: &str = "binary_sensor";
pub const LIGHT: &str = "light";
pub const SCENE: &str = "scene";
pub const SENSOR: &str = "sensor";
pub const SWITCH: &str = "switch";

/// Domain part of a raw entity id string, without validating it. A string
/// with no `.` is returned whole.
pub fn domain_of(entity_id: &str) -> &str {
    entity_id
        .split_once('.')
        .map_or(entity_id, |(domain, _)| domain)
}
