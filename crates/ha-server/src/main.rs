//! Auto areas server
//!
//! Usage: `auto-areas [CONFIG_DIR]` (defaults to the current directory).
//! Loads `configuration.yaml` and the `.storage/` registries, starts one
//! engine per configured area and runs until Ctrl-C.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use ha_auto_areas::{AutoAreas, AutoAreasConfig, Host};
use ha_config::{CoreConfig, Value, CONFIG_FILE};
use ha_event_bus::EventBus;
use ha_registries::Registries;
use ha_service_registry::ServiceRegistry;
use ha_state_store::StateStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// The central host instance
pub struct HomeAssistant {
    pub bus: Arc<EventBus>,
    pub states: Arc<StateStore>,
    pub services: Arc<ServiceRegistry>,
    pub registries: Arc<Registries>,
    pub core: CoreConfig,
    /// Parsed `configuration.yaml`
    pub config: Value,
}

impl HomeAssistant {
    /// Load configuration and registries from `config_dir`
    pub async fn load(config_dir: &Path) -> Result<Self> {
        let config = if config_dir.join(CONFIG_FILE).exists() {
            ha_config::load_yaml(config_dir, CONFIG_FILE)
                .with_context(|| format!("loading {}", config_dir.join(CONFIG_FILE).display()))?
        } else {
            warn!(config_dir = %config_dir.display(), "No {CONFIG_FILE}, using defaults");
            Value::Null
        };
        let core = CoreConfig::from_yaml(&config)?;

        let registries = Arc::new(Registries::new(config_dir));
        registries
            .load_all()
            .await
            .context("loading registries")?;
        info!(
            areas = registries.areas.len(),
            devices = registries.devices.len(),
            entities = registries.entities.len(),
            "Registries loaded"
        );

        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateStore::new(bus.clone()));
        let services = Arc::new(ServiceRegistry::new());

        Ok(Self {
            bus,
            states,
            services,
            registries,
            core,
            config,
        })
    }

    pub fn host(&self) -> Host {
        Host::new(
            self.states.clone(),
            self.bus.clone(),
            self.services.clone(),
            self.registries.clone(),
            self.core.clone(),
        )
    }

    pub async fn start_auto_areas(&self) -> Result<AutoAreas> {
        let config = AutoAreasConfig::from_yaml(&self.config)?;
        let auto_areas = AutoAreas::setup(&config, self.host()).await;
        for issue in auto_areas.issues() {
            warn!(kind = ?issue.kind, area = %issue.area, "{}", issue.message);
        }
        Ok(auto_areas)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    info!(config_dir = %config_dir.display(), "Starting auto areas");

    let hass = HomeAssistant::load(&config_dir).await?;
    let mut auto_areas = hass.start_auto_areas().await?;
    info!(areas = ?auto_areas.area_ids(), "Auto areas running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    auto_areas.unload_all().await;
    hass.registries
        .save_all()
        .await
        .context("saving registries")?;

    Ok(())
}
