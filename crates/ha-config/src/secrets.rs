//! Secrets loaded from secrets.yaml

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Values keep their YAML type so a secret can stand in for a number or
/// boolean as well as a string.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    secrets: HashMap<String, Value>,
}

impl Secrets {
    /// Load `secrets.yaml` from the config directory; a missing file yields
    /// an empty store.
    pub fn load(config_dir: &Path) -> ConfigResult<Self> {
        let path = config_dir.join("secrets.yaml");

        if !path.exists() {
            debug!(path = %path.display(), "No secrets.yaml, using empty secrets");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::read(&path, e))?;
        let secrets: HashMap<String, Value> =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::parse(&path, e))?;

        debug!(count = secrets.len(), "Loaded secrets");
        Ok(Self { secrets })
    }

    pub fn get(&self, key: &str) -> ConfigResult<&Value> {
        self.secrets
            .get(key)
            .ok_or_else(|| ConfigError::SecretNotFound {
                key: key.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_values_keep_their_type() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("secrets.yaml"),
            "threshold: 120\nsleeping: true\nscene: scene.night\n",
        )
        .unwrap();

        let secrets = Secrets::load(dir.path()).unwrap();
        assert_eq!(secrets.get("threshold").unwrap().as_u64(), Some(120));
        assert_eq!(secrets.get("sleeping").unwrap().as_bool(), Some(true));
        assert_eq!(secrets.get("scene").unwrap().as_str(), Some("scene.night"));
        assert_eq!(secrets.len(), 3);
        assert!(matches!(
            secrets.get("missing"),
            Err(ConfigError::SecretNotFound { .. })
        ));
    }

    #[test]
    fn test_no_secrets_file() {
        let dir = TempDir::new().unwrap();
        assert!(Secrets::load(dir.path()).unwrap().is_empty());
    }
}
