#![forbid(unsafe_code)]

pub mod common;
pub mod envelope;
pub mod intent;
pub mod service;
pub mod state;

pub use common::{ContractViolation, ReasonCodeId, Validate};
