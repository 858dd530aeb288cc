//! CLI commands for the up/down parity arbitrage engine.

pub mod discover;
pub mod monitor;

pub use discover::{run_discover, DiscoverArgs};
pub use monitor::{run_monitor, MonitorArgs};
