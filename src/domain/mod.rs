//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod indicator_helpers;
pub mod feature;
pub mod feature_table;
pub mod pipeline;
pub mod rule;
pub mod rule_parser;
pub mod rule_eval;
pub mod signal;
pub mod risk;
pub mod classifier;
pub mod ring_buffer;
pub mod strategy;
pub mod presets;
pub mod engine;
pub mod config_validation;
pub mod error;
