//! `auto_areas:` configuration and setup-time validation
//!
//! ```yaml
//! auto_areas:
//!   areas:
//!     - area: bedroom
//!       is_sleeping_area: true
//!       auto_lights_illuminance_threshold: 50
//!       excluded_light_entities: [light.night_lamp]
//!       sleeping_scene: scene.bedroom_night
//!       temperature_calculation: mean
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use ha_config::Value;
use ha_registries::{AreaEntry, AreaRegistry};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::calculation::Calculation;
use crate::device_class::SensorDeviceClass;
use crate::error::{AutoAreasError, AutoAreasResult};
use crate::lights::LightSettings;
use crate::DOMAIN;

/// Settings of one managed area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AreaConfig {
    /// Area id or area name
    pub area: String,

    #[serde(default)]
    pub is_sleeping_area: bool,

    #[serde(default)]
    pub auto_lights_illuminance_threshold: f64,

    #[serde(default)]
    pub excluded_light_entities: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_scene: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goodbye_scene: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleeping_scene: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub illuminance_calculation: Option<Calculation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_calculation: Option<Calculation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_calculation: Option<Calculation>,
}

impl AreaConfig {
    pub fn new(area: impl Into<String>) -> Self {
        Self {
            area: area.into(),
            is_sleeping_area: false,
            auto_lights_illuminance_threshold: 0.0,
            excluded_light_entities: Vec::new(),
            presence_scene: None,
            goodbye_scene: None,
            sleeping_scene: None,
            illuminance_calculation: None,
            temperature_calculation: None,
            humidity_calculation: None,
        }
    }

    /// Configured reducer for `class`, or the class default
    pub fn calculation_for(&self, class: SensorDeviceClass) -> Calculation {
        let configured = match class {
            SensorDeviceClass::Illuminance => self.illuminance_calculation,
            SensorDeviceClass::Temperature => self.temperature_calculation,
            SensorDeviceClass::Humidity => self.humidity_calculation,
            SensorDeviceClass::Occupancy => None,
        };
        configured.unwrap_or_else(|| class.default_calculation())
    }

    pub fn light_settings(&self) -> LightSettings {
        LightSettings {
            is_sleeping_area: self.is_sleeping_area,
            illuminance_threshold: self.auto_lights_illuminance_threshold,
            presence_scene: self.presence_scene.clone(),
            goodbye_scene: self.goodbye_scene.clone(),
            sleeping_scene: self.sleeping_scene.clone(),
        }
    }

    fn set_calculation(&mut self, class: SensorDeviceClass, calculation: Option<Calculation>) {
        match class {
            SensorDeviceClass::Illuminance => self.illuminance_calculation = calculation,
            SensorDeviceClass::Temperature => self.temperature_calculation = calculation,
            SensorDeviceClass::Humidity => self.humidity_calculation = calculation,
            SensorDeviceClass::Occupancy => {}
        }
    }
}

/// The whole `auto_areas:` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutoAreasConfig {
    #[serde(default)]
    pub areas: Vec<AreaConfig>,
}

impl AutoAreasConfig {
    /// Read the section from a loaded `configuration.yaml`; absent means
    /// no managed areas
    pub fn from_yaml(config: &Value) -> AutoAreasResult<Self> {
        Ok(ha_config::section(config, DOMAIN)?.unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    AreaNotFound,
    AreaAlreadyManaged,
    InvalidAreaName,
    InvalidCalculation,
}

/// A configuration problem found during setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Area reference as written in the configuration
    pub area: String,
    pub message: String,
}

impl Issue {
    fn new(kind: IssueKind, area: &str, message: String) -> Self {
        warn!(kind = ?kind, area = %area, "{}", message);
        Self {
            kind,
            area: area.to_string(),
            message,
        }
    }
}

/// Result of validating a configuration against the area registry
#[derive(Debug, Default)]
pub struct Validated {
    pub areas: Vec<(AreaConfig, Arc<AreaEntry>)>,
    pub issues: Vec<Issue>,
}

/// Resolve every configured area. Entries with an unknown or duplicate area
/// are skipped; a boolean reducer on a numeric sensor falls back to the
/// class default.
pub fn validate(config: &AutoAreasConfig, areas: &AreaRegistry) -> Validated {
    let mut validated = Validated::default();
    let mut managed = HashSet::new();

    for area_config in &config.areas {
        let Some(entry) = areas.resolve(&area_config.area) else {
            validated.issues.push(Issue::new(
                IssueKind::AreaNotFound,
                &area_config.area,
                AutoAreasError::AreaNotFound(area_config.area.clone()).to_string(),
            ));
            continue;
        };
        if !managed.insert(entry.id.clone()) {
            validated.issues.push(Issue::new(
                IssueKind::AreaAlreadyManaged,
                &area_config.area,
                AutoAreasError::AreaAlreadyManaged(entry.name.clone()).to_string(),
            ));
            continue;
        }
        if entry.slug().is_empty() {
            validated.issues.push(Issue::new(
                IssueKind::InvalidAreaName,
                &area_config.area,
                AutoAreasError::InvalidAreaName(entry.name.clone()).to_string(),
            ));
            continue;
        }

        let mut area_config = area_config.clone();
        for class in crate::device_class::AGGREGATED_CLASSES {
            let calculation = area_config.calculation_for(class);
            if !calculation.is_numeric() {
                validated.issues.push(Issue::new(
                    IssueKind::InvalidCalculation,
                    &area_config.area,
                    format!(
                        "'{calculation}' cannot aggregate {class} sensors, using '{}'",
                        class.default_calculation()
                    ),
                ));
                area_config.set_calculation(class, None);
            }
        }
        validated.areas.push((area_config, entry));
    }

    validated
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_registries::Storage;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> AutoAreasConfig {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        AutoAreasConfig::from_yaml(&value).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse("auto_areas:\n  areas:\n    - area: kitchen\n");
        let area = &config.areas[0];
        assert_eq!(area, &AreaConfig::new("kitchen"));
        assert_eq!(area.calculation_for(SensorDeviceClass::Illuminance), Calculation::Last);
        assert_eq!(area.calculation_for(SensorDeviceClass::Temperature), Calculation::Median);
        assert_eq!(area.calculation_for(SensorDeviceClass::Humidity), Calculation::Max);
    }

    #[test]
    fn test_full_area() {
        let config = parse(
            r#"
auto_areas:
  areas:
    - area: Bedroom
      is_sleeping_area: true
      auto_lights_illuminance_threshold: 50
      excluded_light_entities: [light.night_lamp]
      presence_scene: scene.bedroom_on
      sleeping_scene: scene.bedroom_night
      temperature_calculation: mean
"#,
        );
        let area = &config.areas[0];
        assert!(area.is_sleeping_area);
        assert_eq!(area.excluded_light_entities, vec!["light.night_lamp"]);
        assert_eq!(area.calculation_for(SensorDeviceClass::Temperature), Calculation::Mean);

        let settings = area.light_settings();
        assert_eq!(settings.illuminance_threshold, 50.0);
        assert_eq!(settings.sleeping_scene.as_deref(), Some("scene.bedroom_night"));
        assert_eq!(settings.goodbye_scene, None);
    }

    #[test]
    fn test_missing_section_and_unknown_keys() {
        let value: Value = serde_yaml::from_str("homeassistant:\n  name: Home\n").unwrap();
        assert!(AutoAreasConfig::from_yaml(&value).unwrap().areas.is_empty());

        let value: Value =
            serde_yaml::from_str("auto_areas:\n  areas:\n    - area: x\n      colour: red\n")
                .unwrap();
        assert!(AutoAreasConfig::from_yaml(&value).is_err());
    }

    #[test]
    fn test_validate_reports_issues() {
        let temp_dir = TempDir::new().unwrap();
        let registry = AreaRegistry::new(Arc::new(Storage::new(temp_dir.path())));
        registry.create("Living Room");
        registry.create("Office");

        let mut office = AreaConfig::new("office");
        office.humidity_calculation = Some(Calculation::All);
        let config = AutoAreasConfig {
            areas: vec![
                AreaConfig::new("Living Room"),
                AreaConfig::new("living_room"),
                AreaConfig::new("garage"),
                office,
            ],
        };

        let validated = validate(&config, &registry);
        let kinds: Vec<IssueKind> = validated.issues.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                IssueKind::AreaAlreadyManaged,
                IssueKind::AreaNotFound,
                IssueKind::InvalidCalculation
            ]
        );
        let ids: Vec<&str> = validated.areas.iter().map(|(_, a)| a.id.as_str()).collect();
        assert_eq!(ids, vec!["living_room", "office"]);
        assert_eq!(
            validated.areas[1].0.calculation_for(SensorDeviceClass::Humidity),
            Calculation::Max
        );
    }
}
