#![forbid(unsafe_code)]

pub mod service_registry;
pub mod state_store;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("invalid entity id '{0}': expected domain.object_id")]
    InvalidEntityId(String),
    #[error("{what} lock poisoned")]
    LockPoisoned { what: &'static str },
}
