use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Origin of a state write or service call.
///
/// Whatever an area engine does in response to a state change carries a
/// child of that state's context, so cause and effect can be linked in logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: None,
        }
    }

    pub fn child(&self) -> Self {
        Self {
            parent_id: Some(self.id.clone()),
            ..Self::new()
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
