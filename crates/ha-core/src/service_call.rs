use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attributes::ATTR_ENTITY_ID;
use crate::Context;

/// An invocation of a domain service such as `scene.turn_on`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub service_data: Value,
    pub context: Context,
}

impl ServiceCall {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// `domain.service`
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Targets from `entity_id`, given either as one string or a list
    pub fn entity_ids(&self) -> Vec<String> {
        let strings = |v: &Value| v.as_str().map(str::to_string);
        match self.service_data.get(ATTR_ENTITY_ID) {
            Some(Value::Array(targets)) => targets.iter().filter_map(strings).collect(),
            Some(target) => strings(target).into_iter().collect(),
            None => Vec::new(),
        }
    }
}
