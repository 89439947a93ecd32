#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use skillbridge_contracts::envelope::{RequestEnvelope, RequestType};
use skillbridge_contracts::{ContractViolation, Validate};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("unsupported request type '{0}'")]
    UnsupportedRequestType(String),
    #[error("intent request is missing request.intent.name")]
    MissingIntentName,
    #[error("request envelope failed validation: {0}")]
    InvalidEnvelope(ContractViolation),
}

/// The handling path selected for one inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedRequest {
    Launch,
    Intent {
        name: String,
        slots: BTreeMap<String, String>,
    },
    SessionEnded {
        reason: Option<String>,
    },
}

impl ClassifiedRequest {
    pub fn request_type(&self) -> RequestType {
        match self {
            Self::Launch => RequestType::Launch,
            Self::Intent { .. } => RequestType::Intent,
            Self::SessionEnded { .. } => RequestType::SessionEnded,
        }
    }
}

/// Selects the path purely on `request.type`.
pub fn classify(envelope: &RequestEnvelope) -> Result<ClassifiedRequest, ClassifyError> {
    envelope.validate().map_err(ClassifyError::InvalidEnvelope)?;

    let raw_type = envelope.request.request_type.as_str();
    let Some(request_type) = RequestType::parse(raw_type) else {
        return Err(ClassifyError::UnsupportedRequestType(raw_type.to_string()));
    };

    match request_type {
        RequestType::Launch => Ok(ClassifiedRequest::Launch),
        RequestType::SessionEnded => Ok(ClassifiedRequest::SessionEnded {
            reason: envelope.request.reason.clone(),
        }),
        RequestType::Intent => {
            let Some(intent) = envelope.request.intent.as_ref() else {
                return Err(ClassifyError::MissingIntentName);
            };
            if intent.name.trim().is_empty() {
                return Err(ClassifyError::MissingIntentName);
            }
            Ok(ClassifiedRequest::Intent {
                name: intent.name.clone(),
                slots: intent.slot_values(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(request: serde_json::Value) -> RequestEnvelope {
        serde_json::from_value(json!({
            "version": "1.0",
            "session": {"new": true, "sessionId": "s-1"},
            "request": request
        }))
        .unwrap()
    }

    #[test]
    fn at_classify_01_launch_request() {
        let env = envelope(json!({"type": "LaunchRequest", "requestId": "r-1"}));
        assert_eq!(classify(&env).unwrap(), ClassifiedRequest::Launch);
    }

    #[test]
    fn at_classify_02_intent_request_without_slots_defaults_to_empty() {
        let env = envelope(json!({
            "type": "IntentRequest",
            "intent": {"name": "WhereAreWeIntent"}
        }));
        assert_eq!(
            classify(&env).unwrap(),
            ClassifiedRequest::Intent {
                name: "WhereAreWeIntent".to_string(),
                slots: BTreeMap::new(),
            }
        );
    }

    #[test]
    fn at_classify_03_intent_request_carries_slot_values() {
        let env = envelope(json!({
            "type": "IntentRequest",
            "intent": {
                "name": "GetZodiacHoroscopeIntent",
                "slots": {
                    "ZodiacSign": {"name": "ZodiacSign", "value": "virgo"},
                    "Period": {"name": "Period"}
                }
            }
        }));
        let ClassifiedRequest::Intent { slots, .. } = classify(&env).unwrap() else {
            panic!("expected intent");
        };
        assert_eq!(slots["ZodiacSign"], "virgo");
        assert_eq!(slots["Period"], "");
    }

    #[test]
    fn at_classify_04_intent_request_requires_name() {
        let env = envelope(json!({"type": "IntentRequest"}));
        assert_eq!(classify(&env), Err(ClassifyError::MissingIntentName));
        let env = envelope(json!({"type": "IntentRequest", "intent": {"name": ""}}));
        assert_eq!(classify(&env), Err(ClassifyError::MissingIntentName));
    }

    #[test]
    fn at_classify_05_session_ended_keeps_reason() {
        let env = envelope(json!({"type": "SessionEndedRequest", "reason": "USER_INITIATED"}));
        assert_eq!(
            classify(&env).unwrap(),
            ClassifiedRequest::SessionEnded {
                reason: Some("USER_INITIATED".to_string())
            }
        );
    }

    #[test]
    fn at_classify_06_unknown_type_is_unsupported() {
        let env = envelope(json!({"type": "Display.ElementSelected"}));
        assert_eq!(
            classify(&env),
            Err(ClassifyError::UnsupportedRequestType(
                "Display.ElementSelected".to_string()
            ))
        );
    }
}
