//! Up/Down parity arbitrage on Polymarket 15-minute markets.
//!
//! This crate provides:
//! - Gamma discovery of each window's Up/Down market pair
//! - A market-channel feed that keeps top-of-book snapshots in a keyed store
//! - Per-symbol monitors that detect parity mismatches and place both legs
//!   concurrently, classifying the joint outcome
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use updown_arb_core::AppConfig;
//! use updown_arb_polymarket::arbitrage::{
//!     InMemorySnapshotStore, MonitorDeps, MonitorSupervisor, PaperOrderPlacer, QuietWindow,
//!     SnapshotKeys,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default();
//!     let deps = MonitorDeps::new(
//!         Arc::new(InMemorySnapshotStore::new()),
//!         Arc::new(PaperOrderPlacer::default()),
//!         SnapshotKeys::default(),
//!         QuietWindow::from_config(&config.quiet_window),
//!     );
//!
//!     MonitorSupervisor::new(config.monitor_configs(), deps).run().await;
//!     Ok(())
//! }
//! ```

pub mod arbitrage;
pub mod gamma;
pub mod models;
pub mod websocket;

pub use gamma::GammaClient;
pub use models::{GammaEvent, GammaMarket, UpDownMarket};
pub use websocket::{FeedState, TickerFeed, TopOfBook, WebSocketConfig, WebSocketError};
