//! CLI command definitions.

pub mod message;
pub mod thread;
