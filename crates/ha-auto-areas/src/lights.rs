//! Light automation decisions for one area
//!
//! [`LightController`] consumes presence flips, sleep mode flips and
//! illuminance updates and answers with at most one [`Actuation`] per input.
//! It never reads the lights back: `lights_turned_on` is the last commanded
//! intent.

use ha_core::domains::{LIGHT, SCENE};
use ha_core::services::{SERVICE_TURN_OFF, SERVICE_TURN_ON};
use tracing::{debug, info};

/// A service call the controller wants issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actuation {
    TurnOnLights(Vec<String>),
    TurnOffLights(Vec<String>),
    ActivateScene(String),
}

impl Actuation {
    pub fn domain(&self) -> &'static str {
        match self {
            Actuation::TurnOnLights(_) | Actuation::TurnOffLights(_) => LIGHT,
            Actuation::ActivateScene(_) => SCENE,
        }
    }

    pub fn service(&self) -> &'static str {
        match self {
            Actuation::TurnOnLights(_) | Actuation::ActivateScene(_) => SERVICE_TURN_ON,
            Actuation::TurnOffLights(_) => SERVICE_TURN_OFF,
        }
    }

    pub fn targets(&self) -> Vec<String> {
        match self {
            Actuation::TurnOnLights(lights) | Actuation::TurnOffLights(lights) => lights.clone(),
            Actuation::ActivateScene(scene) => vec![scene.clone()],
        }
    }
}

/// Static light policy of an area
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightSettings {
    pub is_sleeping_area: bool,
    /// Lights stay off above this illuminance; 0 disables the check
    pub illuminance_threshold: f64,
    pub presence_scene: Option<String>,
    pub goodbye_scene: Option<String>,
    pub sleeping_scene: Option<String>,
}

#[derive(Debug)]
pub struct LightController {
    settings: LightSettings,
    lights: Vec<String>,
    sleep_mode_enabled: Option<bool>,
    lights_turned_on: Option<bool>,
    /// A sleeping scene ran since the lights were last turned off
    sleeping_scene_active: bool,
    present: Option<bool>,
    illuminance: Option<f64>,
}

impl LightController {
    pub fn new(settings: LightSettings, mut lights: Vec<String>) -> Self {
        lights.sort();
        lights.dedup();
        Self {
            settings,
            lights,
            sleep_mode_enabled: None,
            lights_turned_on: None,
            sleeping_scene_active: false,
            present: None,
            illuminance: None,
        }
    }

    pub fn lights(&self) -> &[String] {
        &self.lights
    }

    pub fn settings(&self) -> &LightSettings {
        &self.settings
    }

    pub fn sleep_mode_enabled(&self) -> Option<bool> {
        self.sleep_mode_enabled
    }

    pub fn lights_turned_on(&self) -> Option<bool> {
        self.lights_turned_on
    }

    /// Seed the controller and apply the policy for the initial presence
    pub fn start(
        &mut self,
        present: bool,
        sleep_mode: Option<bool>,
        illuminance: Option<f64>,
    ) -> Option<Actuation> {
        self.sleep_mode_enabled = if self.settings.is_sleeping_area {
            Some(sleep_mode.unwrap_or(false))
        } else {
            Some(false)
        };
        self.illuminance = illuminance;
        self.on_presence(present)
    }

    pub fn on_presence(&mut self, present: bool) -> Option<Actuation> {
        self.present = Some(present);
        if present {
            self.presence_detected()
        } else {
            self.presence_cleared()
        }
    }

    pub fn on_sleep_mode(&mut self, enabled: bool) -> Option<Actuation> {
        if self.sleep_mode_enabled == Some(enabled) {
            return None;
        }
        self.sleep_mode_enabled = Some(enabled);

        if enabled {
            info!("Sleep mode enabled");
            let action = match (self.settings.sleeping_scene.clone(), self.present) {
                (Some(scene), Some(true)) => self.sleeping_scene(scene),
                _ => {
                    self.sleeping_scene_active = false;
                    self.turn_off()?
                }
            };
            self.lights_turned_on = Some(false);
            Some(action)
        } else {
            info!("Sleep mode disabled");
            if self.present == Some(true) {
                self.presence_detected()
            } else {
                None
            }
        }
    }

    pub fn on_illuminance(&mut self, illuminance: Option<f64>) -> Option<Actuation> {
        self.illuminance = illuminance;
        if self.present != Some(true)
            || self.is_sleeping()
            || self.lights_turned_on == Some(true)
            || self.settings.illuminance_threshold <= 0.0
        {
            return None;
        }
        let value = illuminance?;
        if value > self.settings.illuminance_threshold {
            return None;
        }
        debug!(illuminance = value, "Area got dark while occupied");
        self.switch_on()
    }

    fn is_sleeping(&self) -> bool {
        self.sleep_mode_enabled == Some(true)
    }

    fn presence_detected(&mut self) -> Option<Actuation> {
        if self.is_sleeping() {
            debug!("Sleep mode on, not turning lights on");
            let scene = self.settings.sleeping_scene.clone()?;
            return Some(self.sleeping_scene(scene));
        }
        if self.is_too_bright() {
            debug!(
                illuminance = ?self.illuminance,
                threshold = self.settings.illuminance_threshold,
                "Bright enough, not turning lights on"
            );
            return None;
        }
        self.switch_on()
    }

    /// Not a light-on intent, but leaving the area must still switch off
    /// whatever the scene lit
    fn sleeping_scene(&mut self, scene: String) -> Actuation {
        self.sleeping_scene_active = true;
        Actuation::ActivateScene(scene)
    }

    fn presence_cleared(&mut self) -> Option<Actuation> {
        if self.is_sleeping() && self.lights_turned_on == Some(false) && !self.sleeping_scene_active
        {
            debug!("Sleep mode on and lights already off");
            return None;
        }
        let action = match &self.settings.goodbye_scene {
            Some(scene) => Actuation::ActivateScene(scene.clone()),
            None => self.turn_off()?,
        };
        self.lights_turned_on = Some(false);
        self.sleeping_scene_active = false;
        info!(service = action.service(), "Presence cleared, lights off");
        Some(action)
    }

    /// Presence scene if configured, plain turn_on otherwise
    fn switch_on(&mut self) -> Option<Actuation> {
        let action = match &self.settings.presence_scene {
            Some(scene) => Actuation::ActivateScene(scene.clone()),
            None if self.lights.is_empty() => return None,
            None => Actuation::TurnOnLights(self.lights.clone()),
        };
        self.lights_turned_on = Some(true);
        info!(domain = action.domain(), "Presence detected, lights on");
        Some(action)
    }

    fn turn_off(&self) -> Option<Actuation> {
        (!self.lights.is_empty()).then(|| Actuation::TurnOffLights(self.lights.clone()))
    }

    fn is_too_bright(&self) -> bool {
        let threshold = self.settings.illuminance_threshold;
        threshold > 0.0 && self.illuminance.is_some_and(|lx| lx > threshold)
    }
}
