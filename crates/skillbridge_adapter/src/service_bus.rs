#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use skillbridge_contracts::service::{ServiceBus, ServiceCall, ServiceCallError};
use skillbridge_storage::service_registry::ServiceRegistry;
use tracing::debug;

/// Forwards service calls as `POST {base}/api/services/{domain}/{service}`
/// with the call data as the JSON body. One attempt, bounded by the agent
/// timeout.
#[derive(Debug, Clone)]
pub struct HttpServiceBus {
    agent: ureq::Agent,
    base_url: String,
    access_token: Option<String>,
}

impl HttpServiceBus {
    pub fn new(base_url: &str, timeout: Duration, access_token: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    pub fn endpoint(&self, domain: &str, service: &str) -> String {
        format!("{}/api/services/{domain}/{service}", self.base_url)
    }
}

impl ServiceBus for HttpServiceBus {
    fn call(&self, call: ServiceCall) -> Result<(), ServiceCallError> {
        let url = self.endpoint(&call.domain, &call.service);
        let mut request = self.agent.post(&url);
        if let Some(token) = &self.access_token {
            request = request.set("x-ha-access", token);
        }
        debug!(%url, "forwarding service call");
        match request.send_json(Value::Object(call.data)) {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, response)) => Err(ServiceCallError::HandlerFailed {
                domain: call.domain,
                service: call.service,
                reason: format!("HTTP {code} {}", response.status_text()),
            }),
            Err(err) => Err(ServiceCallError::Transport(err.to_string())),
        }
    }
}

/// The bus the adapter hands to the dispatcher.
#[derive(Debug, Clone)]
pub enum AdapterServiceBus {
    Local(Arc<ServiceRegistry>),
    Forwarding(HttpServiceBus),
}

impl ServiceBus for AdapterServiceBus {
    fn call(&self, call: ServiceCall) -> Result<(), ServiceCallError> {
        match self {
            Self::Local(registry) => registry.call(call),
            Self::Forwarding(http) => http.call(call),
        }
    }
}
