#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde_json::{Map, Value};
use skillbridge_contracts::state::{StateAccessor, StateSnapshot};
use tracing::debug;

use crate::StorageError;

/// Process-local entity state table. Entity ids are case-insensitive and
/// stored lowercase.
#[derive(Debug, Default)]
pub struct StateStore {
    rows: RwLock<BTreeMap<String, StateSnapshot>>,
}

impl StateStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    pub fn set(
        &self,
        entity_id: &str,
        state: impl Into<String>,
        attributes: Map<String, Value>,
    ) -> Result<(), StorageError> {
        let key = canonical_entity_id(entity_id)?;
        let snapshot = StateSnapshot {
            state: state.into(),
            attributes,
        };
        debug!(entity_id = %key, state = %snapshot.state, "state set");
        self.rows
            .write()
            .map_err(|_| StorageError::LockPoisoned { what: "state store" })?
            .insert(key, snapshot);
        Ok(())
    }

    pub fn remove(&self, entity_id: &str) -> Result<bool, StorageError> {
        let key = canonical_entity_id(entity_id)?;
        Ok(self
            .rows
            .write()
            .map_err(|_| StorageError::LockPoisoned { what: "state store" })?
            .remove(&key)
            .is_some())
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.rows
            .read()
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl StateAccessor for StateStore {
    fn get(&self, entity_id: &str) -> Option<StateSnapshot> {
        let key = entity_id.trim().to_ascii_lowercase();
        self.rows.read().ok()?.get(&key).cloned()
    }
}

fn canonical_entity_id(entity_id: &str) -> Result<String, StorageError> {
    let key = entity_id.trim().to_ascii_lowercase();
    match key.split_once('.') {
        Some((domain, object_id)) if !domain.is_empty() && !object_id.is_empty() => Ok(key),
        _ => Err(StorageError::InvalidEntityId(entity_id.to_string())),
    }
}
