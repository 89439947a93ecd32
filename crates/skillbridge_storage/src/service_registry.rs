#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use skillbridge_contracts::service::{ServiceBus, ServiceCall, ServiceCallError};
use tracing::debug;

use crate::StorageError;

pub type ServiceHandler = Arc<dyn Fn(&ServiceCall) -> Result<(), String> + Send + Sync>;

/// In-process service bus: handlers keyed by `(domain, service)`.
#[derive(Default)]
pub struct ServiceRegistry {
    handlers: RwLock<BTreeMap<(String, String), ServiceHandler>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services())
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    /// Registers `handler`, replacing any previous handler for the pair.
    pub fn register<F>(&self, domain: &str, service: &str, handler: F) -> Result<(), StorageError>
    where
        F: Fn(&ServiceCall) -> Result<(), String> + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .map_err(|_| StorageError::LockPoisoned {
                what: "service registry",
            })?
            .insert(key(domain, service), Arc::new(handler));
        Ok(())
    }

    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.handlers
            .read()
            .map(|h| h.contains_key(&key(domain, service)))
            .unwrap_or(false)
    }

    pub fn services(&self) -> Vec<String> {
        self.handlers
            .read()
            .map(|h| h.keys().map(|(d, s)| format!("{d}.{s}")).collect())
            .unwrap_or_default()
    }
}

impl ServiceBus for ServiceRegistry {
    fn call(&self, call: ServiceCall) -> Result<(), ServiceCallError> {
        // Clone the handler out so the lock is not held while it runs.
        let handler = self
            .handlers
            .read()
            .map_err(|_| ServiceCallError::Transport("service registry lock poisoned".to_string()))?
            .get(&key(&call.domain, &call.service))
            .cloned();
        let Some(handler) = handler else {
            return Err(ServiceCallError::ServiceNotFound {
                domain: call.domain,
                service: call.service,
            });
        };
        debug!(domain = %call.domain, service = %call.service, "calling service");
        handler(&call).map_err(|reason| ServiceCallError::HandlerFailed {
            domain: call.domain.clone(),
            service: call.service.clone(),
            reason,
        })
    }
}

fn key(domain: &str, service: &str) -> (String, String) {
    (domain.to_ascii_lowercase(), service.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn at_service_registry_01_lists_registered_services() {
        let registry = ServiceRegistry::new_in_memory();
        registry.register("Light", "Turn_On", |_| Ok(())).unwrap();
        assert!(registry.has_service("light", "turn_on"));
        assert_eq!(registry.services(), vec!["light.turn_on".to_string()]);
        assert!(format!("{registry:?}").contains("light.turn_on"));
    }

    #[test]
    fn at_service_registry_02_handler_error_is_wrapped() {
        let registry = ServiceRegistry::new_in_memory();
        registry
            .register("switch", "toggle", |_| Err("relay stuck".to_string()))
            .unwrap();
        let err = registry
            .call(ServiceCall {
                domain: "switch".to_string(),
                service: "toggle".to_string(),
                data: Map::new(),
            })
            .unwrap_err();
        assert_eq!(
            err,
            ServiceCallError::HandlerFailed {
                domain: "switch".to_string(),
                service: "toggle".to_string(),
                reason: "relay stuck".to_string(),
            }
        );
    }
}
