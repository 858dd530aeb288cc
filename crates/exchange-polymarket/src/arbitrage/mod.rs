//! Parity arbitrage between the UP and DOWN contracts of a symbol.
//!
//! The two contracts of a 15-minute Up/Down market settle to exactly 1.0
//! combined. If both asks sum below `1 - edge`, buying one of each locks in a
//! profit; if both bids sum above `1 + edge`, selling one of each does.
//!
//! For example, with UP asked at 0.48 and DOWN asked at 0.50:
//! - Pair cost: 0.98
//! - Guaranteed payout: 1.00
//! - Edge: 0.02 per share pair
//!
//! # Modules
//!
//! - [`types`]: snapshots, store keys and opportunities
//! - [`snapshot_store`]: keyed store written by the feed and read by monitors
//! - [`staleness`]: freshness gate in front of the store
//! - [`detector`]: parity evaluation
//! - [`execution`]: order placement contract
//! - [`paper_executor`] / [`gateway_executor`]: placement implementations
//! - [`dual_leg_executor`]: concurrent two-leg execution and outcome classification
//! - [`quiet_window`]: settlement-boundary suppression
//! - [`monitor`]: per-symbol polling loop
//! - [`supervisor`]: one monitor task per symbol
//!
//! # Risk Considerations
//!
//! - **Execution risk**: one leg may fill while the other fails (hedge required)
//! - **Timeouts**: a leg that times out may still have executed remotely
//! - **Timing**: top of book may move before both legs land

pub mod detector;
pub mod dual_leg_executor;
pub mod execution;
pub mod gateway_executor;
pub mod monitor;
pub mod paper_executor;
pub mod quiet_window;
pub mod snapshot_store;
pub mod staleness;
pub mod supervisor;
pub mod types;

pub use detector::{ParityEvaluator, DEFAULT_EDGE_THRESHOLD};
pub use dual_leg_executor::{
    DualLegExecutor, ExecutionReport, JointExecutionOutcome, LegExecutionResult, LegFault, LegKey,
};
pub use execution::{ExecutionError, LegOrder, OrderPlacer, PlaceOrderResponse, Side};
pub use gateway_executor::GatewayOrderPlacer;
pub use monitor::{
    MonitorDeps, MonitorError, MonitorState, MonitorStats, MonitorStatsSnapshot, SymbolMonitor,
    TickOutcome,
};
pub use paper_executor::{PaperOrderPlacer, PaperOrderRecord, PaperPlacerConfig};
pub use quiet_window::QuietWindow;
pub use snapshot_store::{InMemorySnapshotStore, SnapshotStore, StoreError};
pub use staleness::{GateRead, StalenessGate};
pub use supervisor::MonitorSupervisor;
pub use types::{ArbitrageOpportunity, MarketSide, SnapshotKeys, TickerSnapshot};
