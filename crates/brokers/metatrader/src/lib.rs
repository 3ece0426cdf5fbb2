//! MetaTrader terminal adapter.
//!
//! Reaches the terminal through a bridge process (MQL5 EA or a sidecar around
//! the vendor client library) speaking length-prefixed JSON over TCP.

pub mod client;
pub mod protocol;

pub use client::{MetaTraderBridge, MetaTraderConfig};
