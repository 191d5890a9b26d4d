use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid YAML in {}: {source}", path.display())]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `!secret` names a key missing from `secrets.yaml`
    #[error("secret '{key}' is not defined")]
    SecretNotFound { key: String },

    #[error("{} is already being included", path.display())]
    CircularInclude { path: PathBuf },

    #[error("environment variable '{var}' is not set")]
    EnvVarNotFound { var: String },

    /// A tag argument or config section of the wrong shape
    #[error("bad value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn read(path: &Path, source: io::Error) -> Self {
        Self::ReadFile {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn parse(path: &Path, source: serde_yaml::Error) -> Self {
        Self::ParseYaml {
            path: path.to_path_buf(),
            source,
        }
    }
}
