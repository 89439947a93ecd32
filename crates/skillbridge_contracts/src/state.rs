#![forbid(unsafe_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel rendered for entities the state accessor does not know.
pub const STATE_UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl StateSnapshot {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Read-only view over live entity states. Owned and synchronized by the
/// implementor; every call must reflect the state at call time.
pub trait StateAccessor: Send + Sync {
    fn get(&self, entity_id: &str) -> Option<StateSnapshot>;
}

impl<T: StateAccessor + ?Sized> StateAccessor for Arc<T> {
    fn get(&self, entity_id: &str) -> Option<StateSnapshot> {
        (**self).get(entity_id)
    }
}

impl<T: StateAccessor + ?Sized> StateAccessor for &T {
    fn get(&self, entity_id: &str) -> Option<StateSnapshot> {
        (**self).get(entity_id)
    }
}
