//! Error types for the auto areas integration

use ha_config::ConfigError;
use ha_core::EntityIdError;
use thiserror::Error;

pub type AutoAreasResult<T> = Result<T, AutoAreasError>;

#[derive(Debug, Error)]
pub enum AutoAreasError {
    #[error("area '{0}' not found in the area registry")]
    AreaNotFound(String),

    #[error("area '{0}' is already managed")]
    AreaAlreadyManaged(String),

    /// An area name that yields no usable identifier fragment
    #[error("area '{0}' has no usable slug")]
    InvalidAreaName(String),

    #[error("invalid entity id: {0}")]
    EntityId(#[from] EntityIdError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
