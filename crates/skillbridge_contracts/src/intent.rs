#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ContractViolation, Validate};

pub const INTENT_NAME_MAX_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntentName(String);

impl IntentName {
    pub fn new(name: impl Into<String>) -> Result<Self, ContractViolation> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "intent_name",
                reason: "must not be empty",
            });
        }
        if name.len() > INTENT_NAME_MAX_LEN {
            return Err(ContractViolation::InvalidValue {
                field: "intent_name",
                reason: "must be <= 128 chars",
            });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechType {
    #[default]
    Plaintext,
    Ssml,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechSpec {
    #[serde(rename = "type", default)]
    pub speech_type: SpeechType,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    #[default]
    Simple,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSpec {
    #[serde(rename = "type", default)]
    pub card_type: CardType,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityIdSpec {
    One(String),
    Many(Vec<String>),
}

impl EntityIdSpec {
    pub fn entries(&self) -> Vec<&str> {
        match self {
            Self::One(id) => vec![id.as_str()],
            Self::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// `domain.service`, e.g. `light.turn_on`.
    pub service: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityIdSpec>,
}

impl ActionSpec {
    pub fn service_ref(&self) -> Result<ServiceRef, ContractViolation> {
        ServiceRef::parse(&self.service)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceRef {
    pub domain: String,
    pub service: String,
}

impl ServiceRef {
    pub fn parse(raw: &str) -> Result<Self, ContractViolation> {
        let Some((domain, service)) = raw.trim().split_once('.') else {
            return Err(ContractViolation::InvalidValue {
                field: "action.service",
                reason: "must be formatted as domain.service",
            });
        };
        if domain.is_empty() || service.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "action.service",
                reason: "domain and service must not be empty",
            });
        }
        Ok(Self {
            domain: domain.to_ascii_lowercase(),
            service: service.to_ascii_lowercase(),
        })
    }
}

/// Static configuration of one intent, as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDefinition {
    pub speech: SpeechSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<CardSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionSpec>,
}

impl IntentDefinition {
    pub fn plaintext(text: impl Into<String>) -> Self {
        Self {
            speech: SpeechSpec {
                speech_type: SpeechType::Plaintext,
                text: text.into(),
            },
            card: None,
            action: None,
        }
    }

    pub fn with_action(mut self, action: ActionSpec) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_card(mut self, title: impl Into<String>, content: impl Into<String>) -> Self {
        self.card = Some(CardSpec {
            card_type: CardType::Simple,
            title: title.into(),
            content: content.into(),
        });
        self
    }
}

impl Validate for IntentDefinition {
    fn validate(&self) -> Result<(), ContractViolation> {
        if let Some(action) = &self.action {
            action.service_ref()?;
            if let Some(EntityIdSpec::Many(ids)) = &action.entity_id {
                if ids.len() > 256 {
                    return Err(ContractViolation::TooMany {
                        field: "action.entity_id",
                        max: 256,
                        got: ids.len(),
                    });
                }
            }
        }
        Ok(())
    }
}
