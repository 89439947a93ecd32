#![forbid(unsafe_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceCallError {
    #[error("service {domain}.{service} is not registered")]
    ServiceNotFound { domain: String, service: String },
    #[error("service {domain}.{service} failed: {reason}")]
    HandlerFailed {
        domain: String,
        service: String,
        reason: String,
    },
    #[error("service bus transport failed: {0}")]
    Transport(String),
}

/// Executes domain/service pairs. Fire-and-forget from the caller's view: the
/// result is only ever logged, never retried.
pub trait ServiceBus: Send + Sync {
    fn call(&self, call: ServiceCall) -> Result<(), ServiceCallError>;
}

impl<T: ServiceBus + ?Sized> ServiceBus for Arc<T> {
    fn call(&self, call: ServiceCall) -> Result<(), ServiceCallError> {
        (**self).call(call)
    }
}
