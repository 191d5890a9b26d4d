//! YAML configuration loading
//!
//! Loads `configuration.yaml` with support for the custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR` - Environment variable substitution
//!
//! Integrations read their own top-level section with [`section`].

mod core_config;
mod error;
mod loader;
mod secrets;

pub use core_config::{CoreConfig, UnitSystem};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, YamlLoader};
pub use secrets::Secrets;

pub use serde_yaml::Value;

/// Name of the main configuration file inside the config directory
pub const CONFIG_FILE: &str = "configuration.yaml";

/// Deserialize the top-level `key` section of a loaded configuration.
///
/// Returns `Ok(None)` when the section is absent or empty.
pub fn section<T: serde::de::DeserializeOwned>(
    config: &Value,
    key: &str,
) -> ConfigResult<Option<T>> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_yaml::from_value(value.clone())
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            }),
    }
}
