//! Terminal adapters shared across the workspace.

pub mod simulated;

pub use simulated::{SimulatedTerminal, SimulatedTerminalConfig};
