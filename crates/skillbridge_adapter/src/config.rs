#![forbid(unsafe_code)]

//! Adapter configuration.
//!
//! Loaded from a TOML file, then overridden by `SKILLBRIDGE_*` environment
//! variables:
//!
//! - `SKILLBRIDGE_HTTP_BIND`: listen address (default `127.0.0.1:8080`)
//! - `SKILLBRIDGE_API_PASSWORD`: required value of the `x-ha-access` header
//! - `SKILLBRIDGE_SERVICE_FORWARD_URL`: forward service calls over HTTP
//! - `SKILLBRIDGE_SERVICE_ACCESS_TOKEN`: `x-ha-access` value sent when forwarding
//! - `SKILLBRIDGE_SERVICE_TIMEOUT_MS`: forward timeout, 100..=10000

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use skillbridge_contracts::intent::IntentDefinition;
use skillbridge_os::skill::{SkillRuntimeConfig, DEFAULT_LAUNCH_SPEECH};

pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_SERVICE_TIMEOUT_MS: u64 = 2_000;
const SERVICE_TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 100..=10_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {message}")]
    Parse { message: String },
    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub service_bus: ServiceBusConfig,
    #[serde(default = "default_launch_speech")]
    pub launch_speech: String,
    #[serde(default)]
    pub unknown_intent_speech: String,
    #[serde(default)]
    pub intents: BTreeMap<String, IntentDefinition>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            service_bus: ServiceBusConfig::default(),
            launch_speech: default_launch_speech(),
            unknown_intent_speech: String::new(),
            intents: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub api_password: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_password: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBusConfig {
    /// Base URL of a remote service endpoint; local handlers are used when unset.
    #[serde(default)]
    pub forward_url: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Credential presented to the forward URL; independent of `http.api_password`.
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Default for ServiceBusConfig {
    fn default() -> Self {
        Self {
            forward_url: None,
            timeout_ms: DEFAULT_SERVICE_TIMEOUT_MS,
            access_token: None,
        }
    }
}

fn default_launch_speech() -> String {
    DEFAULT_LAUNCH_SPEECH.to_string()
}

fn default_bind() -> String {
    DEFAULT_HTTP_BIND.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_SERVICE_TIMEOUT_MS
}

impl AdapterConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `SKILLBRIDGE_*` overrides read through `lookup`. An out-of-range
    /// timeout override is ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if let Some(bind) = non_empty("SKILLBRIDGE_HTTP_BIND") {
            self.http.bind = bind;
        }
        if let Some(password) = non_empty("SKILLBRIDGE_API_PASSWORD") {
            self.http.api_password = Some(password);
        }
        if let Some(url) = non_empty("SKILLBRIDGE_SERVICE_FORWARD_URL") {
            self.service_bus.forward_url = Some(url);
        }
        if let Some(token) = non_empty("SKILLBRIDGE_SERVICE_ACCESS_TOKEN") {
            self.service_bus.access_token = Some(token);
        }
        if let Some(timeout_ms) = non_empty("SKILLBRIDGE_SERVICE_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| SERVICE_TIMEOUT_RANGE_MS.contains(v))
        {
            self.service_bus.timeout_ms = timeout_ms;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if !SERVICE_TIMEOUT_RANGE_MS.contains(&self.service_bus.timeout_ms) {
            return Err(ConfigError::Invalid {
                field: "service_bus.timeout_ms",
                reason: format!(
                    "must be within {}..={}",
                    SERVICE_TIMEOUT_RANGE_MS.start(),
                    SERVICE_TIMEOUT_RANGE_MS.end()
                ),
            });
        }
        if let Some(url) = &self.service_bus.forward_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    field: "service_bus.forward_url",
                    reason: "must start with http:// or https://".to_string(),
                });
            }
        }
        if matches!(&self.service_bus.access_token, Some(t) if t.is_empty()) {
            return Err(ConfigError::Invalid {
                field: "service_bus.access_token",
                reason: "must not be empty when set".to_string(),
            });
        }
        if matches!(&self.http.api_password, Some(p) if p.is_empty()) {
            return Err(ConfigError::Invalid {
                field: "http.api_password",
                reason: "must not be empty when set".to_string(),
            });
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.http.bind.parse().map_err(|e| ConfigError::Invalid {
            field: "http.bind",
            reason: format!("{e}"),
        })
    }

    pub fn skill_runtime_config(&self) -> SkillRuntimeConfig {
        SkillRuntimeConfig {
            launch_speech: self.launch_speech.clone(),
            unknown_intent_speech: self.unknown_intent_speech.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillbridge_contracts::intent::{EntityIdSpec, SpeechType};

    const EXAMPLE: &str = include_str!("../config/skillbridge.toml");

    #[test]
    fn at_config_01_example_file_parses() {
        let config = AdapterConfig::parse(EXAMPLE).unwrap();
        assert_eq!(config.intents.len(), 3);
        let call = &config.intents["CallServiceIntent"];
        let action = call.action.as_ref().unwrap();
        assert_eq!(action.service, "test.alexa");
        assert_eq!(action.data["hello"], serde_json::json!(1));
        assert_eq!(
            action.entity_id,
            Some(EntityIdSpec::One("switch.test".to_string()))
        );
        assert_eq!(
            config.intents["GetZodiacHoroscopeIntent"].speech.speech_type,
            SpeechType::Plaintext
        );
    }

    #[test]
    fn at_config_02_defaults_apply_to_empty_file() {
        let config = AdapterConfig::parse("").unwrap();
        assert_eq!(config, AdapterConfig::default());
        assert_eq!(config.bind_addr().unwrap().port(), 8080);
        assert_eq!(config.launch_speech, DEFAULT_LAUNCH_SPEECH);
    }

    #[test]
    fn at_config_03_duplicate_intent_table_is_a_load_error() {
        let content = r#"
[intents.A.speech]
text = "one"

[intents.A.speech]
text = "two"
"#;
        assert!(matches!(
            AdapterConfig::parse(content),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn at_config_04_env_overrides_win_and_bad_timeout_is_ignored() {
        let mut config = AdapterConfig::default();
        let env: BTreeMap<&str, &str> = [
            ("SKILLBRIDGE_HTTP_BIND", "0.0.0.0:9000"),
            ("SKILLBRIDGE_API_PASSWORD", "test1234"),
            ("SKILLBRIDGE_SERVICE_TIMEOUT_MS", "999999"),
            ("SKILLBRIDGE_SERVICE_ACCESS_TOKEN", "svc-token"),
        ]
        .into_iter()
        .collect();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.http.bind, "0.0.0.0:9000");
        assert_eq!(config.http.api_password.as_deref(), Some("test1234"));
        assert_eq!(config.service_bus.timeout_ms, DEFAULT_SERVICE_TIMEOUT_MS);
        assert_eq!(config.service_bus.access_token.as_deref(), Some("svc-token"));
    }

    #[test]
    fn at_config_05_invalid_values_are_rejected() {
        assert!(matches!(
            AdapterConfig::parse("[http]\nbind = \"not-an-addr\""),
            Err(ConfigError::Invalid { field: "http.bind", .. })
        ));
        assert!(matches!(
            AdapterConfig::parse("[service_bus]\ntimeout_ms = 5"),
            Err(ConfigError::Invalid { field: "service_bus.timeout_ms", .. })
        ));
        assert!(matches!(
            AdapterConfig::parse("[service_bus]\nforward_url = \"ftp://x\""),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            AdapterConfig::parse("[service_bus]\naccess_token = \"\""),
            Err(ConfigError::Invalid { field: "service_bus.access_token", .. })
        ));
    }
}
