//! Port traits: the boundary between the engine and its inputs.

pub mod config_port;
pub mod data_port;
