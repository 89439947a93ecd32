#![forbid(unsafe_code)]

pub mod registry;
pub mod template;
