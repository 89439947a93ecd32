#![forbid(unsafe_code)]

pub mod classifier;
pub mod dispatcher;
pub mod response;
pub mod skill;
