#![forbid(unsafe_code)]

use skillbridge_contracts::envelope::RequestEnvelope;
use skillbridge_contracts::service::ServiceBus;
use skillbridge_contracts::state::StateAccessor;
use tracing::debug;

use crate::classifier::{classify, ClassifiedRequest, ClassifyError};
use crate::dispatcher::{IntentDispatchError, IntentDispatcher};
use crate::response::{build, SkillReply, SpeechOutput};

pub const DEFAULT_LAUNCH_SPEECH: &str = "Hello, and welcome to the future. How may I help?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillRuntimeConfig {
    pub launch_speech: String,
    pub unknown_intent_speech: String,
}

impl SkillRuntimeConfig {
    pub fn mvp_v1() -> Self {
        Self {
            launch_speech: DEFAULT_LAUNCH_SPEECH.to_string(),
            unknown_intent_speech: String::new(),
        }
    }
}

impl Default for SkillRuntimeConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}

/// Envelope-shape failures; the only errors that reach the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkillError {
    #[error("malformed request envelope: {0}")]
    MalformedEnvelope(String),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
}

impl SkillError {
    pub fn is_unsupported_request_type(&self) -> bool {
        matches!(self, Self::Classify(ClassifyError::UnsupportedRequestType(_)))
    }
}

/// Classifier → dispatcher → response builder for one request at a time.
#[derive(Debug, Clone)]
pub struct SkillRuntime<S, B>
where
    S: StateAccessor,
    B: ServiceBus,
{
    config: SkillRuntimeConfig,
    dispatcher: IntentDispatcher<S, B>,
}

impl<S, B> SkillRuntime<S, B>
where
    S: StateAccessor,
    B: ServiceBus,
{
    pub fn new(config: SkillRuntimeConfig, dispatcher: IntentDispatcher<S, B>) -> Self {
        Self { config, dispatcher }
    }

    pub fn dispatcher(&self) -> &IntentDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn handle_json(&self, body: &[u8]) -> Result<SkillReply, SkillError> {
        let envelope: RequestEnvelope = serde_json::from_slice(body)
            .map_err(|e| SkillError::MalformedEnvelope(e.to_string()))?;
        self.handle(&envelope)
    }

    pub fn handle(&self, envelope: &RequestEnvelope) -> Result<SkillReply, SkillError> {
        let classified = classify(envelope)?;
        let request_type = classified.request_type();
        let attributes = &envelope.session.attributes;
        debug!(
            request_type = request_type.as_str(),
            request_id = envelope.request.request_id.as_str(),
            session_id = envelope.session.session_id.as_str(),
            "handling skill request"
        );

        let reply = match classified {
            ClassifiedRequest::Launch => build(
                request_type,
                Some(SpeechOutput::plain(self.config.launch_speech.clone())),
                None,
                attributes,
            ),
            ClassifiedRequest::SessionEnded { reason } => {
                debug!(reason = reason.as_deref().unwrap_or(""), "session ended");
                build(request_type, None, None, attributes)
            }
            ClassifiedRequest::Intent { name, slots } => {
                match self.dispatcher.handle(&name, &slots) {
                    Ok(outcome) => build(request_type, Some(outcome.speech), outcome.card, attributes),
                    Err(IntentDispatchError::UnknownIntent(_)) => build(
                        request_type,
                        Some(SpeechOutput::plain(self.config.unknown_intent_speech.clone())),
                        None,
                        attributes,
                    ),
                }
            }
        };
        Ok(reply)
    }
}
