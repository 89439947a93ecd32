#![forbid(unsafe_code)]

pub mod config;
pub mod service_bus;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use skillbridge_contracts::state::{StateAccessor, StateSnapshot};
use skillbridge_engines::registry::{IntentRegistry, RegistryError};
use skillbridge_os::dispatcher::IntentDispatcher;
use skillbridge_os::response::SkillReply;
use skillbridge_os::skill::SkillRuntime;
use skillbridge_storage::service_registry::ServiceRegistry;
use skillbridge_storage::state_store::StateStore;
use tracing::{info, warn};

use crate::config::{AdapterConfig, ConfigError};
use crate::service_bus::{AdapterServiceBus, HttpServiceBus};

pub const API_PASSWORD_HEADER: &str = "x-ha-access";

pub type AdapterSkillRuntime = SkillRuntime<Arc<StateStore>, AdapterServiceBus>;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("intent registry rejected config: {0}")]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterErrorResponse {
    pub status: String,
    pub outcome: String,
    pub reason: String,
}

impl AdapterErrorResponse {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            outcome: "REJECTED".to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub intents: usize,
    pub services: Vec<String>,
    pub forwarding: bool,
}

/// Body of `POST /api/states/:entity_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateWriteRequest {
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Transport-neutral reply; `body: None` means an empty HTTP body.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterHttpReply {
    pub status: u16,
    pub body: Option<Value>,
}

impl AdapterHttpReply {
    fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body: Some(body),
        }
    }

    fn error(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            body: serde_json::to_value(AdapterErrorResponse::rejected(reason)).ok(),
        }
    }

    fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Self::ok(body),
            Err(err) => Self::error(500, format!("failed to encode response: {err}")),
        }
    }
}

/// Owns the skill runtime and its collaborators for the HTTP surface. All
/// handlers take `&self` and are safe to call from concurrent blocking tasks.
#[derive(Debug)]
pub struct AdapterRuntime {
    skill: AdapterSkillRuntime,
    states: Arc<StateStore>,
    services: Arc<ServiceRegistry>,
    password_digest: Option<[u8; 32]>,
    forwarding: bool,
}

impl AdapterRuntime {
    pub fn from_config(config: &AdapterConfig) -> Result<Self, AdapterError> {
        Self::from_config_with_services(config, Arc::new(ServiceRegistry::new_in_memory()))
    }

    /// Same as [`Self::from_config`] but calls go to `services` unless a
    /// forward URL is configured.
    pub fn from_config_with_services(
        config: &AdapterConfig,
        services: Arc<ServiceRegistry>,
    ) -> Result<Self, AdapterError> {
        config.validate()?;
        let registry = IntentRegistry::from_definitions(config.intents.clone())?;
        let states = Arc::new(StateStore::new_in_memory());
        let bus = match &config.service_bus.forward_url {
            Some(url) => AdapterServiceBus::Forwarding(HttpServiceBus::new(
                url,
                Duration::from_millis(config.service_bus.timeout_ms),
                config.service_bus.access_token.clone(),
            )),
            None => AdapterServiceBus::Local(services.clone()),
        };
        let forwarding = matches!(bus, AdapterServiceBus::Forwarding(_));
        info!(
            intents = registry.len(),
            forwarding, "skill runtime ready"
        );
        let dispatcher = IntentDispatcher::new(Arc::new(registry), states.clone(), bus);
        Ok(Self {
            skill: SkillRuntime::new(config.skill_runtime_config(), dispatcher),
            states,
            services,
            password_digest: config
                .http
                .api_password
                .as_deref()
                .map(password_digest),
            forwarding,
        })
    }

    pub fn skill(&self) -> &AdapterSkillRuntime {
        &self.skill
    }

    pub fn states(&self) -> &Arc<StateStore> {
        &self.states
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn health(&self) -> AdapterHealthResponse {
        AdapterHealthResponse {
            status: "ok".to_string(),
            outcome: "HEALTHY".to_string(),
            intents: self.skill.dispatcher().registry().len(),
            services: self.services.services(),
            forwarding: self.forwarding,
        }
    }

    /// `POST /api/alexa`.
    pub fn handle_alexa(&self, password: Option<&str>, body: &[u8]) -> AdapterHttpReply {
        if let Err(reply) = self.authorize(password) {
            return reply;
        }
        match self.skill.handle_json(body) {
            Ok(SkillReply::Envelope(envelope)) => AdapterHttpReply::json(&envelope),
            Ok(SkillReply::Empty) => AdapterHttpReply {
                status: 200,
                body: None,
            },
            Err(err) => {
                warn!(error = %err, "rejected skill request");
                AdapterHttpReply::error(400, err.to_string())
            }
        }
    }

    /// `GET /api/states/:entity_id`.
    pub fn read_state(&self, password: Option<&str>, entity_id: &str) -> AdapterHttpReply {
        if let Err(reply) = self.authorize(password) {
            return reply;
        }
        match self.states.get(entity_id) {
            Some(snapshot) => AdapterHttpReply::json(&snapshot),
            None => AdapterHttpReply::error(404, format!("entity '{entity_id}' not found")),
        }
    }

    /// `POST /api/states/:entity_id`.
    pub fn write_state(
        &self,
        password: Option<&str>,
        entity_id: &str,
        body: &[u8],
    ) -> AdapterHttpReply {
        if let Err(reply) = self.authorize(password) {
            return reply;
        }
        let request: StateWriteRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(err) => return AdapterHttpReply::error(400, format!("invalid state body: {err}")),
        };
        let snapshot = StateSnapshot {
            state: request.state,
            attributes: request.attributes,
        };
        match self
            .states
            .set(entity_id, snapshot.state.clone(), snapshot.attributes.clone())
        {
            Ok(()) => AdapterHttpReply::json(&snapshot),
            Err(err) => AdapterHttpReply::error(400, err.to_string()),
        }
    }

    fn authorize(&self, password: Option<&str>) -> Result<(), AdapterHttpReply> {
        let Some(expected) = &self.password_digest else {
            return Ok(());
        };
        match password {
            Some(given) if password_digest(given) == *expected => Ok(()),
            _ => {
                warn!("rejected request with invalid or missing {API_PASSWORD_HEADER}");
                Err(AdapterHttpReply::error(
                    401,
                    format!("invalid or missing {API_PASSWORD_HEADER}"),
                ))
            }
        }
    }
}

fn password_digest(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}
