#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use skillbridge_contracts::intent::{IntentDefinition, IntentName, ServiceRef, SpeechType};
use skillbridge_contracts::{ContractViolation, Validate};
use tracing::warn;

use crate::template::{Template, TemplateContext, TemplateEngineConfig, TemplateRenderError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("intent '{0}' is configured more than once")]
    DuplicateIntent(String),
    #[error("intent '{intent}' is invalid: {violation}")]
    InvalidDefinition {
        intent: String,
        violation: ContractViolation,
    },
}

/// A template parsed at load time. A source that failed to parse is kept so
/// that the failure surfaces per request, where it degrades to a fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledTemplate {
    Ready(Template),
    Broken(TemplateRenderError),
}

impl CompiledTemplate {
    fn compile(intent: &str, field: &str, source: &str, config: &TemplateEngineConfig) -> Self {
        match Template::parse_with_config(source, config) {
            Ok(t) => Self::Ready(t),
            Err(error) => {
                warn!(
                    intent,
                    field,
                    reason_code = %error.reason_code(),
                    %error,
                    "template failed to parse; requests using it will fall back"
                );
                Self::Broken(error)
            }
        }
    }

    pub fn render(&self, ctx: &TemplateContext<'_>) -> Result<String, TemplateRenderError> {
        match self {
            Self::Ready(t) => t.render(ctx),
            Self::Broken(error) => Err(error.clone()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Action data with every string leaf pre-parsed; keys and non-string values
/// are carried through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum DataTemplate {
    Literal(Value),
    Text(CompiledTemplate),
    Array(Vec<DataTemplate>),
    Object(Vec<(String, DataTemplate)>),
}

impl DataTemplate {
    fn compile(intent: &str, value: &Value, config: &TemplateEngineConfig) -> Self {
        match value {
            Value::String(s) => Self::Text(CompiledTemplate::compile(intent, "action.data", s, config)),
            Value::Array(items) => Self::Array(
                items
                    .iter()
                    .map(|v| Self::compile(intent, v, config))
                    .collect(),
            ),
            Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::compile(intent, v, config)))
                    .collect(),
            ),
            other => Self::Literal(other.clone()),
        }
    }

    pub fn render(&self, ctx: &TemplateContext<'_>) -> Result<Value, TemplateRenderError> {
        Ok(match self {
            Self::Literal(v) => v.clone(),
            Self::Text(t) => Value::String(t.render(ctx)?),
            Self::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.render(ctx)?);
                }
                Value::Array(out)
            }
            Self::Object(fields) => {
                let mut out = Map::new();
                for (k, v) in fields {
                    out.insert(k.clone(), v.render(ctx)?);
                }
                Value::Object(out)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSpeech {
    pub speech_type: SpeechType,
    pub text: CompiledTemplate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCard {
    pub title: CompiledTemplate,
    pub content: CompiledTemplate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledAction {
    pub service: ServiceRef,
    pub data: Vec<(String, DataTemplate)>,
    pub entity_ids: Vec<CompiledTemplate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledIntent {
    pub name: IntentName,
    pub speech: CompiledSpeech,
    pub card: Option<CompiledCard>,
    pub action: Option<CompiledAction>,
}

impl CompiledIntent {
    fn compile(
        name: IntentName,
        def: &IntentDefinition,
        config: &TemplateEngineConfig,
    ) -> Result<Self, ContractViolation> {
        def.validate()?;
        let n = name.as_str();
        let speech = CompiledSpeech {
            speech_type: def.speech.speech_type,
            text: CompiledTemplate::compile(n, "speech.text", &def.speech.text, config),
        };
        let card = def.card.as_ref().map(|c| CompiledCard {
            title: CompiledTemplate::compile(n, "card.title", &c.title, config),
            content: CompiledTemplate::compile(n, "card.content", &c.content, config),
        });
        let action = match &def.action {
            None => None,
            Some(a) => Some(CompiledAction {
                service: a.service_ref()?,
                data: a
                    .data
                    .iter()
                    .map(|(k, v)| (k.clone(), DataTemplate::compile(n, v, config)))
                    .collect(),
                entity_ids: a
                    .entity_id
                    .as_ref()
                    .map(|spec| {
                        spec.entries()
                            .into_iter()
                            .map(|e| CompiledTemplate::compile(n, "action.entity_id", e, config))
                            .collect()
                    })
                    .unwrap_or_default(),
            }),
        };
        Ok(Self {
            name,
            speech,
            card,
            action,
        })
    }
}

/// Immutable intent name → compiled definition map, built once at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntentRegistry {
    intents: BTreeMap<String, CompiledIntent>,
}

impl IntentRegistry {
    pub fn from_definitions<I, N>(definitions: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (N, IntentDefinition)>,
        N: Into<String>,
    {
        Self::from_definitions_with_config(definitions, &TemplateEngineConfig::mvp_v1())
    }

    pub fn from_definitions_with_config<I, N>(
        definitions: I,
        config: &TemplateEngineConfig,
    ) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (N, IntentDefinition)>,
        N: Into<String>,
    {
        let mut intents = BTreeMap::new();
        for (name, def) in definitions {
            let name: String = name.into();
            if intents.contains_key(&name) {
                return Err(RegistryError::DuplicateIntent(name));
            }
            let invalid = |violation| RegistryError::InvalidDefinition {
                intent: name.clone(),
                violation,
            };
            let intent_name = IntentName::new(name.clone()).map_err(invalid)?;
            let compiled = CompiledIntent::compile(intent_name, &def, config).map_err(invalid)?;
            intents.insert(name, compiled);
        }
        Ok(Self { intents })
    }

    pub fn lookup(&self, name: &str) -> Option<&CompiledIntent> {
        self.intents.get(name)
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.intents.keys().map(String::as_str)
    }
}
