//! Service registry with async handlers
//!
//! Services are the only way the area engines actuate anything:
//! `light.turn_on`, `scene.turn_on`, and the `switch.*` services backing the
//! integration's own switches.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use ha_core::{Context, ServiceCall};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub type ServiceResult = Result<(), ServiceError>;

type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;
type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("invalid service data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescription {
    pub domain: String,
    pub service: String,
    /// Human-readable name, e.g. "Turn on"
    pub name: Option<String>,
}

impl ServiceDescription {
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

type ServiceKey = (String, String);

fn key(domain: &str, service: &str) -> ServiceKey {
    (domain.to_string(), service.to_string())
}

pub struct ServiceRegistry {
    services: DashMap<ServiceKey, (ServiceDescription, ServiceHandler)>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register `domain.service`, replacing any previous handler
    pub fn register<F, Fut>(&self, domain: impl Into<String>, service: impl Into<String>, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        self.register_with_description(ServiceDescription::new(domain, service), handler);
    }

    #[instrument(skip(self, handler), fields(domain = %description.domain, service = %description.service))]
    pub fn register_with_description<F, Fut>(&self, description: ServiceDescription, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        debug!("Registering service");
        let handler: ServiceHandler = Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);
        self.services.insert(
            key(&description.domain, &description.service),
            (description, handler),
        );
    }

    /// Run the handler for `domain.service` to completion
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: Value,
        context: Context,
    ) -> ServiceResult {
        // Clone the handler out so no map guard is held across the await
        let Some(handler) = self
            .services
            .get(&key(domain, service))
            .map(|entry| Arc::clone(&entry.value().1))
        else {
            warn!("Service not found");
            return Err(ServiceError::NotFound {
                domain: domain.to_string(),
                service: service.to_string(),
            });
        };

        debug!("Calling service");
        handler(ServiceCall::new(domain, service, service_data, context)).await
    }

    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&key(domain, service))
    }

    /// Descriptions of every service in `domain`, sorted by service name
    pub fn domain_services(&self, domain: &str) -> Vec<ServiceDescription> {
        let mut found: Vec<ServiceDescription> = self
            .services
            .iter()
            .filter(|entry| entry.key().0 == domain)
            .map(|entry| entry.value().0.clone())
            .collect();
        found.sort_by(|a, b| a.service.cmp(&b.service));
        found
    }

    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        let removed = self.services.remove(&key(domain, service)).is_some();
        if removed {
            debug!(domain = %domain, service = %service, "Unregistered service");
        }
        removed
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedServiceRegistry = Arc<ServiceRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_register_and_call() {
        let registry = ServiceRegistry::new();
        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        registry.register("light", "turn_on", move |call: ServiceCall| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(call.entity_ids());
                Ok(())
            }
        });

        assert_ok!(
            registry
                .call(
                    "light",
                    "turn_on",
                    json!({"entity_id": ["light.desk", "light.ceiling"]}),
                    Context::new(),
                )
                .await
        );
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[vec!["light.desk".to_string(), "light.ceiling".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let registry = ServiceRegistry::new();
        let err = assert_err!(registry.call("scene", "turn_on", json!({}), Context::new()).await);
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let registry = ServiceRegistry::new();
        registry.register("switch", "toggle", |_call: ServiceCall| async {
            Err(ServiceError::InvalidData("missing entity_id".into()))
        });

        let err = assert_err!(registry.call("switch", "toggle", json!({}), Context::new()).await);
        assert!(matches!(err, ServiceError::InvalidData(_)));
    }

    #[test]
    fn test_unregister_and_domain_listing() {
        let registry = ServiceRegistry::new();
        registry.register("switch", "turn_on", |_call: ServiceCall| async { Ok(()) });
        registry.register_with_description(
            ServiceDescription::new("switch", "toggle").named("Toggle"),
            |_call: ServiceCall| async { Ok(()) },
        );
        registry.register("light", "turn_on", |_call: ServiceCall| async { Ok(()) });

        let switch_services = registry.domain_services("switch");
        assert_eq!(switch_services.len(), 2);
        assert_eq!(switch_services[0].name.as_deref(), Some("Toggle"));
        assert!(registry.unregister("switch", "toggle"));
        assert!(!registry.unregister("switch", "toggle"));
        assert!(!registry.has_service("switch", "toggle"));
        assert_eq!(registry.service_count(), 2);
    }
}
