//! sigtrader: strategy evaluation engine.
//!
//! Turns an OHLCV candle series into derived feature columns, boolean
//! entry/exit flags and per-trade risk parameters. Hexagonal layout: domain
//! logic in [`domain`], port traits in [`ports`], concrete implementations in
//! [`adapters`], and the operator CLI in [`cli`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
