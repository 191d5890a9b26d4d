use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity id must be '<domain>.<object_id>'")]
    InvalidFormat,

    #[error("domain cannot be empty")]
    EmptyDomain,

    #[error("object id cannot be empty")]
    EmptyObjectId,

    #[error("invalid domain '{0}'")]
    InvalidDomainChars(String),

    #[error("invalid object id '{0}'")]
    InvalidObjectIdChars(String),
}

/// `<domain>.<object_id>`, e.g. `binary_sensor.area_presence_kitchen`.
///
/// Both halves are lowercase ASCII letters, digits and underscores, and
/// neither starts or ends with an underscore. The domain additionally
/// cannot contain `__`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

fn is_slug(s: &str) -> bool {
    !s.starts_with('_')
        && !s.ends_with('_')
        && s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

impl EntityId {
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let (domain, object_id) = (domain.into(), object_id.into());
        match (domain.as_str(), object_id.as_str()) {
            ("", _) => Err(EntityIdError::EmptyDomain),
            (_, "") => Err(EntityIdError::EmptyObjectId),
            (d, _) if !is_slug(d) || d.contains("__") => {
                Err(EntityIdError::InvalidDomainChars(domain))
            }
            (_, o) if !is_slug(o) => Err(EntityIdError::InvalidObjectIdChars(object_id)),
            _ => Ok(Self { domain, object_id }),
        }
    }

    /// `domain.<prefix><slug>`, the shape of every synthesized area entity
    pub fn with_slug(
        domain: impl Into<String>,
        prefix: &str,
        slug: &str,
    ) -> Result<Self, EntityIdError> {
        Self::new(domain, format!("{prefix}{slug}"))
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

/// Display name to identifier fragment: `"Living Room"` -> `"living_room"`.
///
/// ASCII letters and digits are kept lowercased; every run of anything else
/// becomes one underscore, and leading or trailing underscores are dropped.
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => Self::new(domain, object_id),
            _ => Err(EntityIdError::InvalidFormat),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}
