#![forbid(unsafe_code)]

use serde_json::{Map, Value};
use skillbridge_contracts::envelope::{
    Card, OutputSpeech, RequestType, ResponseBody, ResponseEnvelope, RESPONSE_ENVELOPE_VERSION,
};
use skillbridge_contracts::intent::SpeechType;

/// What the transport sends back: a JSON envelope, or literally nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum SkillReply {
    Envelope(ResponseEnvelope),
    Empty,
}

impl SkillReply {
    pub fn envelope(&self) -> Option<&ResponseEnvelope> {
        match self {
            Self::Envelope(e) => Some(e),
            Self::Empty => None,
        }
    }

    /// Text of the spoken output, for either speech type.
    pub fn speech_text(&self) -> Option<&str> {
        match self.envelope()?.response.output_speech.as_ref()? {
            OutputSpeech::PlainText { text } => Some(text.as_str()),
            OutputSpeech::Ssml { ssml } => Some(ssml.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechOutput {
    pub speech_type: SpeechType,
    pub text: String,
}

impl SpeechOutput {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            speech_type: SpeechType::Plaintext,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardOutput {
    pub title: String,
    pub content: String,
}

/// Assembles the outbound envelope for a request type. The skill never ends
/// the session itself.
pub fn build(
    request_type: RequestType,
    speech: Option<SpeechOutput>,
    card: Option<CardOutput>,
    session_attributes: &Map<String, Value>,
) -> SkillReply {
    if request_type == RequestType::SessionEnded {
        return SkillReply::Empty;
    }
    let output_speech = speech.map(|s| match s.speech_type {
        SpeechType::Plaintext => OutputSpeech::plain_text(s.text),
        SpeechType::Ssml => OutputSpeech::ssml(&s.text),
    });
    let card = card.map(|c| Card::Simple {
        title: c.title,
        content: c.content,
    });
    SkillReply::Envelope(ResponseEnvelope {
        version: RESPONSE_ENVELOPE_VERSION.to_string(),
        response: ResponseBody {
            output_speech,
            card,
            should_end_session: false,
        },
        session_attributes: (!session_attributes.is_empty()).then(|| session_attributes.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn at_response_01_intent_reply_is_plaintext_and_keeps_session_open() {
        let reply = build(
            RequestType::Intent,
            Some(SpeechOutput::plain("")),
            None,
            &Map::new(),
        );
        let env = reply.envelope().unwrap();
        assert!(!env.response.should_end_session);
        assert_eq!(reply.speech_text(), Some(""));
        assert_eq!(
            serde_json::to_value(env).unwrap(),
            json!({
                "version": "1.0",
                "response": {
                    "outputSpeech": {"type": "PlainText", "text": ""},
                    "shouldEndSession": false
                }
            })
        );
    }

    #[test]
    fn at_response_02_session_ended_is_empty_body() {
        let reply = build(
            RequestType::SessionEnded,
            Some(SpeechOutput::plain("ignored")),
            None,
            &Map::new(),
        );
        assert_eq!(reply, SkillReply::Empty);
    }

    #[test]
    fn at_response_03_ssml_card_and_session_attributes() {
        let attrs = json!({"daily": true}).as_object().cloned().unwrap();
        let reply = build(
            RequestType::Launch,
            Some(SpeechOutput {
                speech_type: SpeechType::Ssml,
                text: "Hi".to_string(),
            }),
            Some(CardOutput {
                title: "Home".to_string(),
                content: "All quiet".to_string(),
            }),
            &attrs,
        );
        assert_eq!(
            serde_json::to_value(reply.envelope().unwrap()).unwrap(),
            json!({
                "version": "1.0",
                "response": {
                    "outputSpeech": {"type": "SSML", "ssml": "<speak>Hi</speak>"},
                    "card": {"type": "Simple", "title": "Home", "content": "All quiet"},
                    "shouldEndSession": false
                },
                "sessionAttributes": {"daily": true}
            })
        );
    }
}
