//! The `homeassistant:` section

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::ConfigResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    #[serde(alias = "us_customary")]
    Imperial,
}

impl UnitSystem {
    pub fn temperature_unit(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "°C",
            UnitSystem::Imperial => "°F",
        }
    }
}

/// Location-wide settings. Only the unit system affects the areas: it
/// picks the unit published on aggregated temperature sensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub name: String,
    pub unit_system: UnitSystem,
    pub time_zone: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            name: "Home".to_string(),
            unit_system: UnitSystem::Metric,
            time_zone: "UTC".to_string(),
        }
    }
}

impl CoreConfig {
    pub fn from_yaml(config: &Value) -> ConfigResult<Self> {
        Ok(crate::section(config, "homeassistant")?.unwrap_or_default())
    }

    pub fn temperature_unit(&self) -> &'static str {
        self.unit_system.temperature_unit()
    }
}
