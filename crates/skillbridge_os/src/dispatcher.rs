#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use skillbridge_contracts::service::{ServiceBus, ServiceCall};
use skillbridge_contracts::state::StateAccessor;
use skillbridge_contracts::ReasonCodeId;
use skillbridge_engines::registry::{CompiledAction, CompiledIntent, IntentRegistry};
use skillbridge_engines::template::{TemplateContext, TemplateRenderError};
use tracing::{debug, info, warn};

use crate::response::{CardOutput, SpeechOutput};

pub mod reason_codes {
    use skillbridge_contracts::ReasonCodeId;

    // Intent dispatch reason-code namespace.
    pub const DISPATCH_OK_ACTION_FIRED: ReasonCodeId = ReasonCodeId(0x4944_0001);
    pub const DISPATCH_UNKNOWN_INTENT: ReasonCodeId = ReasonCodeId(0x4944_00F1);
    pub const DISPATCH_SPEECH_RENDER_FAILED: ReasonCodeId = ReasonCodeId(0x4944_00F2);
    pub const DISPATCH_CARD_RENDER_FAILED: ReasonCodeId = ReasonCodeId(0x4944_00F3);
    pub const DISPATCH_ACTION_RENDER_FAILED: ReasonCodeId = ReasonCodeId(0x4944_00F4);
    pub const DISPATCH_ACTION_CALL_FAILED: ReasonCodeId = ReasonCodeId(0x4944_00F5);
}

pub const ENTITY_ID_KEY: &str = "entity_id";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntentDispatchError {
    #[error("intent '{0}' is not registered")]
    UnknownIntent(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    NotConfigured,
    Dispatched { domain: String, service: String },
    Failed {
        reason_code: ReasonCodeId,
        detail: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntentDispatchOutcome {
    pub speech: SpeechOutput,
    pub card: Option<CardOutput>,
    pub action: ActionOutcome,
}

/// Resolves an intent, renders its speech and fires its action. Holds only
/// read-only shared handles, so one dispatcher serves concurrent requests.
#[derive(Debug, Clone)]
pub struct IntentDispatcher<S, B>
where
    S: StateAccessor,
    B: ServiceBus,
{
    registry: Arc<IntentRegistry>,
    states: S,
    bus: B,
}

impl<S, B> IntentDispatcher<S, B>
where
    S: StateAccessor,
    B: ServiceBus,
{
    pub fn new(registry: Arc<IntentRegistry>, states: S, bus: B) -> Self {
        Self {
            registry,
            states,
            bus,
        }
    }

    pub fn registry(&self) -> &IntentRegistry {
        &self.registry
    }

    pub fn handle(
        &self,
        intent_name: &str,
        slots: &BTreeMap<String, String>,
    ) -> Result<IntentDispatchOutcome, IntentDispatchError> {
        let Some(intent) = self.registry.lookup(intent_name) else {
            info!(
                intent = intent_name,
                reason_code = %reason_codes::DISPATCH_UNKNOWN_INTENT,
                "received unknown intent"
            );
            return Err(IntentDispatchError::UnknownIntent(intent_name.to_string()));
        };
        let ctx = TemplateContext::new(slots, &self.states);

        let text = match intent.speech.text.render(&ctx) {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    intent = intent_name,
                    reason_code = %reason_codes::DISPATCH_SPEECH_RENDER_FAILED,
                    error = %err,
                    "speech template failed to render; answering with empty speech"
                );
                String::new()
            }
        };
        let speech = SpeechOutput {
            speech_type: intent.speech.speech_type,
            text,
        };
        let card = render_card(intent, &ctx);

        let action = match &intent.action {
            None => ActionOutcome::NotConfigured,
            Some(action) => self.fire_action(intent_name, action, &ctx),
        };

        Ok(IntentDispatchOutcome {
            speech,
            card,
            action,
        })
    }

    fn fire_action(
        &self,
        intent_name: &str,
        action: &CompiledAction,
        ctx: &TemplateContext<'_>,
    ) -> ActionOutcome {
        let data = match render_action_data(action, ctx) {
            Ok(data) => data,
            Err(err) => {
                warn!(
                    intent = intent_name,
                    reason_code = %reason_codes::DISPATCH_ACTION_RENDER_FAILED,
                    error = %err,
                    "action template failed to render; service not called"
                );
                return ActionOutcome::Failed {
                    reason_code: reason_codes::DISPATCH_ACTION_RENDER_FAILED,
                    detail: err.to_string(),
                };
            }
        };
        let domain = action.service.domain.clone();
        let service = action.service.service.clone();
        let call = ServiceCall {
            domain: domain.clone(),
            service: service.clone(),
            data,
        };
        match self.bus.call(call) {
            Ok(()) => {
                debug!(
                    intent = intent_name,
                    domain = %domain,
                    service = %service,
                    reason_code = %reason_codes::DISPATCH_OK_ACTION_FIRED,
                    "service called"
                );
                ActionOutcome::Dispatched { domain, service }
            }
            Err(err) => {
                warn!(
                    intent = intent_name,
                    domain = %domain,
                    service = %service,
                    reason_code = %reason_codes::DISPATCH_ACTION_CALL_FAILED,
                    error = %err,
                    "service call failed"
                );
                ActionOutcome::Failed {
                    reason_code: reason_codes::DISPATCH_ACTION_CALL_FAILED,
                    detail: err.to_string(),
                }
            }
        }
    }
}

fn render_card(intent: &CompiledIntent, ctx: &TemplateContext<'_>) -> Option<CardOutput> {
    let card = intent.card.as_ref()?;
    let rendered = card
        .title
        .render(ctx)
        .and_then(|title| card.content.render(ctx).map(|content| (title, content)));
    match rendered {
        Ok((title, content)) => Some(CardOutput { title, content }),
        Err(err) => {
            warn!(
                intent = intent.name.as_str(),
                reason_code = %reason_codes::DISPATCH_CARD_RENDER_FAILED,
                error = %err,
                "card template failed to render; card omitted"
            );
            None
        }
    }
}

fn render_action_data(
    action: &CompiledAction,
    ctx: &TemplateContext<'_>,
) -> Result<Map<String, Value>, TemplateRenderError> {
    let mut data = Map::new();
    for (key, value) in &action.data {
        data.insert(key.clone(), value.render(ctx)?);
    }
    if !action.entity_ids.is_empty() {
        let mut ids = Vec::new();
        for template in &action.entity_ids {
            ids.extend(normalize_entity_ids(&template.render(ctx)?));
        }
        data.insert(
            ENTITY_ID_KEY.to_string(),
            Value::Array(ids.into_iter().map(Value::String).collect()),
        );
    }
    Ok(data)
}

/// Splits a comma-separated entity list into lowercase ids, dropping blanks.
pub fn normalize_entity_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim().to_ascii_lowercase())
        .filter(|part| !part.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skillbridge_contracts::intent::{ActionSpec, EntityIdSpec, IntentDefinition};
    use skillbridge_contracts::service::ServiceCallError;
    use skillbridge_contracts::state::StateSnapshot;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FixedStates(BTreeMap<String, String>);

    impl StateAccessor for FixedStates {
        fn get(&self, entity_id: &str) -> Option<StateSnapshot> {
            self.0.get(entity_id).map(StateSnapshot::new)
        }
    }

    #[derive(Default)]
    struct RecordingBus {
        calls: Mutex<Vec<ServiceCall>>,
        fail: bool,
    }

    impl ServiceBus for RecordingBus {
        fn call(&self, call: ServiceCall) -> Result<(), ServiceCallError> {
            self.calls.lock().unwrap().push(call.clone());
            if self.fail {
                return Err(ServiceCallError::HandlerFailed {
                    domain: call.domain,
                    service: call.service,
                    reason: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn registry() -> Arc<IntentRegistry> {
        Arc::new(
            IntentRegistry::from_definitions(vec![
                (
                    "GetZodiacHoroscopeIntent",
                    IntentDefinition::plaintext("You told us your sign is {{ ZodiacSign }}."),
                ),
                (
                    "CallServiceIntent",
                    IntentDefinition::plaintext("Service called").with_action(ActionSpec {
                        service: "test.alexa".to_string(),
                        data: json!({"hello": 1}).as_object().cloned().unwrap(),
                        entity_id: Some(EntityIdSpec::One("switch.test".to_string())),
                    }),
                ),
                (
                    "LightsIntent",
                    IntentDefinition::plaintext("Turning on {{ Room }}")
                        .with_card("Lights", "{{ Room }} is {{ states('light.' ~ Room) }}")
                        .with_action(ActionSpec {
                            service: "light.turn_on".to_string(),
                            data: json!({"entity_id": "ignored", "brightness": "{{ Level }}"})
                                .as_object()
                                .cloned()
                                .unwrap(),
                            entity_id: Some(EntityIdSpec::Many(vec![
                                "Light.{{ Room }}, light.hall".to_string(),
                                " ".to_string(),
                            ])),
                        }),
                ),
                (
                    "BrokenIntent",
                    IntentDefinition::plaintext("{% if %}oops{% endif %}"),
                ),
                (
                    "BrokenActionIntent",
                    IntentDefinition::plaintext("Dimming {{ Room }}").with_action(ActionSpec {
                        service: "light.turn_on".to_string(),
                        data: json!({"brightness": "{% if %}"}).as_object().cloned().unwrap(),
                        entity_id: Some(EntityIdSpec::One("light.{{ Room }}".to_string())),
                    }),
                ),
            ])
            .unwrap(),
        )
    }

    fn slots(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn at_dispatch_01_renders_slot_into_speech() {
        let d = IntentDispatcher::new(registry(), FixedStates::default(), RecordingBus::default());
        let out = d
            .handle("GetZodiacHoroscopeIntent", &slots(&[("ZodiacSign", "virgo")]))
            .unwrap();
        assert_eq!(out.speech.text, "You told us your sign is virgo.");
        assert_eq!(out.action, ActionOutcome::NotConfigured);
        let again = d
            .handle("GetZodiacHoroscopeIntent", &slots(&[("ZodiacSign", "virgo")]))
            .unwrap();
        assert_eq!(out, again);
    }

    #[test]
    fn at_dispatch_02_unknown_intent_is_reported() {
        let d = IntentDispatcher::new(registry(), FixedStates::default(), RecordingBus::default());
        assert_eq!(
            d.handle("NopeIntent", &BTreeMap::new()),
            Err(IntentDispatchError::UnknownIntent("NopeIntent".to_string()))
        );
    }

    #[test]
    fn at_dispatch_03_action_fires_once_with_entity_list() {
        let bus = Arc::new(RecordingBus::default());
        let d = IntentDispatcher::new(registry(), FixedStates::default(), bus.clone());
        let out = d.handle("CallServiceIntent", &BTreeMap::new()).unwrap();
        assert_eq!(out.speech.text, "Service called");
        assert_eq!(
            out.action,
            ActionOutcome::Dispatched {
                domain: "test".to_string(),
                service: "alexa".to_string()
            }
        );
        let calls = bus.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].domain, "test");
        assert_eq!(calls[0].service, "alexa");
        assert_eq!(calls[0].data["entity_id"], json!(["switch.test"]));
        assert_eq!(calls[0].data["hello"], json!(1));
    }

    #[test]
    fn at_dispatch_04_bus_failure_keeps_speech() {
        let bus = RecordingBus {
            fail: true,
            ..Default::default()
        };
        let d = IntentDispatcher::new(registry(), FixedStates::default(), bus);
        let out = d.handle("CallServiceIntent", &BTreeMap::new()).unwrap();
        assert_eq!(out.speech.text, "Service called");
        assert!(matches!(
            out.action,
            ActionOutcome::Failed { reason_code, .. }
                if reason_code == reason_codes::DISPATCH_ACTION_CALL_FAILED
        ));
    }

    #[test]
    fn at_dispatch_05_broken_speech_template_degrades_to_empty() {
        let d = IntentDispatcher::new(registry(), FixedStates::default(), RecordingBus::default());
        let out = d.handle("BrokenIntent", &BTreeMap::new()).unwrap();
        assert_eq!(out.speech.text, "");
    }

    #[test]
    fn at_dispatch_06_card_failure_is_omitted_and_entity_ids_normalized() {
        // `~` is not part of the expression language, so the card never renders.
        let bus = Arc::new(RecordingBus::default());
        let d = IntentDispatcher::new(registry(), FixedStates::default(), bus.clone());
        let out = d
            .handle("LightsIntent", &slots(&[("Room", "Kitchen"), ("Level", "80")]))
            .unwrap();
        assert_eq!(out.speech.text, "Turning on Kitchen");
        assert_eq!(out.card, None);
        let calls = bus.calls.lock().unwrap();
        assert_eq!(
            calls[0].data["entity_id"],
            json!(["light.kitchen", "light.hall"])
        );
        assert_eq!(calls[0].data["brightness"], json!("80"));
    }

    #[test]
    fn at_dispatch_07_normalize_entity_ids() {
        assert_eq!(
            normalize_entity_ids(" Switch.A ,switch.b,, "),
            vec!["switch.a".to_string(), "switch.b".to_string()]
        );
        assert!(normalize_entity_ids("").is_empty());
    }

    #[test]
    fn at_dispatch_08_broken_action_template_skips_call_and_keeps_speech() {
        let bus = Arc::new(RecordingBus::default());
        let d = IntentDispatcher::new(registry(), FixedStates::default(), bus.clone());
        let out = d
            .handle("BrokenActionIntent", &slots(&[("Room", "den")]))
            .unwrap();
        assert_eq!(out.speech.text, "Dimming den");
        assert!(bus.calls.lock().unwrap().is_empty());
        assert!(matches!(
            out.action,
            ActionOutcome::Failed { reason_code, .. }
                if reason_code == reason_codes::DISPATCH_ACTION_RENDER_FAILED
        ));
    }
}
