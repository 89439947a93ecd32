#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use serde_json::json;
use skillbridge_contracts::service::{ServiceBus, ServiceCall, ServiceCallError};
use skillbridge_storage::service_registry::ServiceRegistry;

fn call(domain: &str, service: &str) -> ServiceCall {
    ServiceCall {
        domain: domain.to_string(),
        service: service.to_string(),
        data: json!({"hello": 1}).as_object().cloned().unwrap(),
    }
}

#[test]
fn at_service_db_01_registered_handler_receives_call() {
    let registry = ServiceRegistry::new_in_memory();
    let seen: Arc<Mutex<Vec<ServiceCall>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    registry
        .register("test", "alexa", move |c| {
            sink.lock().unwrap().push(c.clone());
            Ok(())
        })
        .unwrap();

    registry.call(call("test", "alexa")).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].data["hello"], json!(1));
}

#[test]
fn at_service_db_02_unregistered_service_is_not_found() {
    let registry = ServiceRegistry::new_in_memory();
    assert_eq!(
        registry.call(call("light", "turn_on")),
        Err(ServiceCallError::ServiceNotFound {
            domain: "light".to_string(),
            service: "turn_on".to_string(),
        })
    );
}

#[test]
fn at_service_db_03_lookup_ignores_case() {
    let registry = ServiceRegistry::new_in_memory();
    registry.register("light", "turn_on", |_| Ok(())).unwrap();
    assert!(registry.call(call("Light", "TURN_ON")).is_ok());
}

#[test]
fn at_service_db_04_reregister_replaces_handler() {
    let registry = ServiceRegistry::new_in_memory();
    registry
        .register("switch", "toggle", |_| Err("old".to_string()))
        .unwrap();
    registry.register("switch", "toggle", |_| Ok(())).unwrap();
    assert!(registry.call(call("switch", "toggle")).is_ok());
    assert_eq!(registry.services().len(), 1);
}
