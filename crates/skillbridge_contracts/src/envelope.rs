#![forbid(unsafe_code)]

//! Voice-platform wire envelopes (Alexa custom skill JSON interface).
//!
//! Inbound envelopes are parsed leniently: only `request.type` is required so
//! that an unrecognized request type reaches the classifier instead of being
//! rejected by the JSON layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ContractViolation, Validate};

pub const RESPONSE_ENVELOPE_VERSION: &str = "1.0";

pub const REQUEST_TYPE_LAUNCH: &str = "LaunchRequest";
pub const REQUEST_TYPE_INTENT: &str = "IntentRequest";
pub const REQUEST_TYPE_SESSION_ENDED: &str = "SessionEndedRequest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Launch,
    Intent,
    SessionEnded,
}

impl RequestType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            REQUEST_TYPE_LAUNCH => Some(Self::Launch),
            REQUEST_TYPE_INTENT => Some(Self::Intent),
            REQUEST_TYPE_SESSION_ENDED => Some(Self::SessionEnded),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Launch => REQUEST_TYPE_LAUNCH,
            Self::Intent => REQUEST_TYPE_INTENT,
            Self::SessionEnded => REQUEST_TYPE_SESSION_ENDED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub session: Session,
    pub request: RequestBody,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub application: Application,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub user: User,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default)]
    pub application_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    #[serde(rename = "type")]
    pub request_type: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentInvocation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slots: BTreeMap<String, Slot>,
}

impl IntentInvocation {
    /// Slot name to value; slots without a value map to an empty string.
    pub fn slot_values(&self) -> BTreeMap<String, String> {
        self.slots
            .iter()
            .map(|(name, slot)| (name.clone(), slot.value.clone().unwrap_or_default()))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Validate for RequestEnvelope {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.request.request_type.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "request.type",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub version: String,
    pub response: ResponseBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_attributes: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_speech: Option<OutputSpeech>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<Card>,
    pub should_end_session: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputSpeech {
    PlainText { text: String },
    #[serde(rename = "SSML")]
    Ssml { ssml: String },
}

impl OutputSpeech {
    pub fn plain_text(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    /// Wraps the markup in `<speak>` unless the template already did.
    pub fn ssml(markup: &str) -> Self {
        let trimmed = markup.trim();
        let ssml = if trimmed.starts_with("<speak>") {
            trimmed.to_string()
        } else {
            format!("<speak>{trimmed}</speak>")
        };
        Self::Ssml { ssml }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Card {
    Simple { title: String, content: String },
}
