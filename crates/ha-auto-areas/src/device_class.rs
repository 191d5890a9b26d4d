//! Device classes of the synthesized sensors and classification of source
//! entities

use ha_core::domains::{self, BINARY_SENSOR, SENSOR};

use crate::calculation::Calculation;

/// Device classes of binary sensors that indicate presence
pub const PRESENCE_DEVICE_CLASSES: &[&str] = &["motion", "occupancy", "presence"];

/// Device class of a derived per-area sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorDeviceClass {
    Illuminance,
    Temperature,
    Humidity,
    Occupancy,
}

/// Classes with a numeric derived sensor
pub const AGGREGATED_CLASSES: [SensorDeviceClass; 3] = [
    SensorDeviceClass::Illuminance,
    SensorDeviceClass::Temperature,
    SensorDeviceClass::Humidity,
];

impl SensorDeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorDeviceClass::Illuminance => "illuminance",
            SensorDeviceClass::Temperature => "temperature",
            SensorDeviceClass::Humidity => "humidity",
            SensorDeviceClass::Occupancy => "occupancy",
        }
    }

    pub fn parse(device_class: &str) -> Option<Self> {
        match device_class {
            "illuminance" => Some(SensorDeviceClass::Illuminance),
            "temperature" => Some(SensorDeviceClass::Temperature),
            "humidity" => Some(SensorDeviceClass::Humidity),
            "occupancy" => Some(SensorDeviceClass::Occupancy),
            _ => None,
        }
    }

    /// Domain of the synthesized entity
    pub fn domain(&self) -> &'static str {
        match self {
            SensorDeviceClass::Occupancy => BINARY_SENSOR,
            _ => SENSOR,
        }
    }

    /// Object id prefix of the synthesized entity, completed by the area slug
    pub fn entity_prefix(&self) -> &'static str {
        match self {
            SensorDeviceClass::Illuminance => "area_illuminance_",
            SensorDeviceClass::Temperature => "area_temperature_",
            SensorDeviceClass::Humidity => "area_humidity_",
            SensorDeviceClass::Occupancy => "area_presence_",
        }
    }

    /// Friendly name prefix, completed by the area name
    pub fn name_prefix(&self) -> &'static str {
        match self {
            SensorDeviceClass::Illuminance => "Area Illuminance",
            SensorDeviceClass::Temperature => "Area Temperature",
            SensorDeviceClass::Humidity => "Area Humidity",
            SensorDeviceClass::Occupancy => "Area Presence",
        }
    }

    /// Unit of measurement. Temperature takes the configured unit system's
    /// unit.
    pub fn unit<'a>(&self, temperature_unit: &'a str) -> Option<&'a str> {
        match self {
            SensorDeviceClass::Illuminance => Some("lx"),
            SensorDeviceClass::Temperature => Some(temperature_unit),
            SensorDeviceClass::Humidity => Some("%"),
            SensorDeviceClass::Occupancy => None,
        }
    }

    pub fn default_calculation(&self) -> Calculation {
        match self {
            SensorDeviceClass::Illuminance => Calculation::Last,
            SensorDeviceClass::Temperature => Calculation::Median,
            SensorDeviceClass::Humidity => Calculation::Max,
            SensorDeviceClass::Occupancy => Calculation::One,
        }
    }

    /// Whether source readings are numbers (as opposed to on/off)
    pub fn is_numeric(&self) -> bool {
        !matches!(self, SensorDeviceClass::Occupancy)
    }
}

impl std::fmt::Display for SensorDeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a source entity inside an area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Presence,
    Light,
    Sensor(SensorDeviceClass),
    Scene,
    Switch,
    Other,
}

impl EntityKind {
    /// Classify by domain and (effective) device class
    pub fn classify(entity_id: &str, device_class: Option<&str>) -> Self {
        match (domains::domain_of(entity_id), device_class) {
            (domains::BINARY_SENSOR, Some(dc)) if PRESENCE_DEVICE_CLASSES.contains(&dc) => {
                EntityKind::Presence
            }
            (domains::LIGHT, _) => EntityKind::Light,
            (domains::SENSOR, Some(dc)) => match SensorDeviceClass::parse(dc) {
                Some(class) if class.is_numeric() => EntityKind::Sensor(class),
                _ => EntityKind::Other,
            },
            (domains::SCENE, _) => EntityKind::Scene,
            (domains::SWITCH, _) => EntityKind::Switch,
            _ => EntityKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            EntityKind::classify("binary_sensor.hall_motion", Some("motion")),
            EntityKind::Presence
        );
        assert_eq!(
            EntityKind::classify("binary_sensor.desk", Some("occupancy")),
            EntityKind::Presence
        );
        assert_eq!(
            EntityKind::classify("binary_sensor.door", Some("door")),
            EntityKind::Other
        );
        assert_eq!(EntityKind::classify("binary_sensor.x", None), EntityKind::Other);
        assert_eq!(EntityKind::classify("light.ceiling", None), EntityKind::Light);
        assert_eq!(
            EntityKind::classify("sensor.lux", Some("illuminance")),
            EntityKind::Sensor(SensorDeviceClass::Illuminance)
        );
        assert_eq!(
            EntityKind::classify("sensor.power", Some("power")),
            EntityKind::Other
        );
        assert_eq!(EntityKind::classify("scene.evening", None), EntityKind::Scene);
        assert_eq!(EntityKind::classify("switch.fan", None), EntityKind::Switch);
    }

    #[test]
    fn test_synthesized_naming() {
        let class = SensorDeviceClass::Humidity;
        assert_eq!(class.domain(), "sensor");
        assert_eq!(class.entity_prefix(), "area_humidity_");
        assert_eq!(class.unit("°C"), Some("%"));
        assert_eq!(SensorDeviceClass::Temperature.unit("°F"), Some("°F"));
        assert_eq!(SensorDeviceClass::Occupancy.domain(), "binary_sensor");
        assert_eq!(SensorDeviceClass::Occupancy.unit("°C"), None);
    }

    #[test]
    fn test_default_calculations() {
        assert_eq!(
            SensorDeviceClass::Illuminance.default_calculation(),
            Calculation::Last
        );
        assert_eq!(
            SensorDeviceClass::Temperature.default_calculation(),
            Calculation::Median
        );
        assert_eq!(
            SensorDeviceClass::Humidity.default_calculation(),
            Calculation::Max
        );
    }
}
