//! Per-symbol polling loop.
//!
//! A [`SymbolMonitor`] composes the staleness gate, the parity evaluator and
//! the dual-leg executor for one symbol. Each tick is strictly sequential: a
//! tick that finds an opportunity awaits the execution before the next tick
//! can start, so at most one arbitrage is in flight per symbol.
//!
//! # States
//!
//! - `WaitingWindow`: inside the quiet window, nothing is read or traded
//! - `Polling`: normal tick
//! - `Executing`: both legs in flight
//!
//! # Delay policy
//!
//! Fixed: every tick sleeps `poll_interval_ms` whether or not data was
//! present, quiet ticks sleep `quiet_poll_ms`, and a faulted tick sleeps
//! `recovery_delay_ms`. Faults and panics inside a tick are caught at the
//! loop boundary and never leave the monitor.

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, trace};

use updown_arb_core::{FillDirection, MonitorConfig, NetPositionGauge};

use super::detector::ParityEvaluator;
use super::dual_leg_executor::{DualLegExecutor, ExecutionReport, JointExecutionOutcome};
use super::execution::OrderPlacer;
use super::quiet_window::QuietWindow;
use super::snapshot_store::{SnapshotStore, StoreError};
use super::staleness::{GateRead, StalenessGate};
use super::types::{MarketSide, SnapshotKeys, TickerSnapshot};

// =============================================================================
// Errors
// =============================================================================

/// Faults inside one tick. Caught at the loop boundary.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Snapshot read failed: {0}")]
    Store(#[from] StoreError),

    /// The tick panicked.
    #[error("Tick panicked: {0}")]
    Panicked(String),
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    WaitingWindow,
    Polling,
    Executing,
}

impl MonitorState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MonitorState::WaitingWindow => "waiting_window",
            MonitorState::Polling => "polling",
            MonitorState::Executing => "executing",
        }
    }

    const fn to_u8(self) -> u8 {
        match self {
            MonitorState::WaitingWindow => 0,
            MonitorState::Polling => 1,
            MonitorState::Executing => 2,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            0 => MonitorState::WaitingWindow,
            2 => MonitorState::Executing,
            _ => MonitorState::Polling,
        }
    }
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one tick did.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Inside the quiet window.
    Quiet,
    /// At least one side had no live snapshot.
    MissingData,
    /// Both sides live, no mismatch over the threshold.
    NoOpportunity,
    /// An opportunity was executed.
    Executed(Box<ExecutionReport>),
}

// =============================================================================
// Stats
// =============================================================================

/// Counters published by one monitor. Shared by `Arc` with the supervisor.
#[derive(Debug)]
pub struct MonitorStats {
    symbol: String,
    state: AtomicU8,
    ticks: AtomicU64,
    quiet_ticks: AtomicU64,
    missing_data_ticks: AtomicU64,
    opportunities: AtomicU64,
    both_ok: AtomicU64,
    buy_ok_sell_fail: AtomicU64,
    sell_ok_buy_fail: AtomicU64,
    both_failed: AtomicU64,
    loop_faults: AtomicU64,
    last_live_ms: AtomicI64,
    positions: Mutex<NetPositionGauge>,
}

/// Point-in-time copy of [`MonitorStats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorStatsSnapshot {
    pub symbol: String,
    pub state: MonitorState,
    pub ticks: u64,
    pub quiet_ticks: u64,
    pub missing_data_ticks: u64,
    pub opportunities: u64,
    pub both_ok: u64,
    pub buy_ok_sell_fail: u64,
    pub sell_ok_buy_fail: u64,
    pub both_failed: u64,
    pub loop_faults: u64,
    /// Older capture time of the last pair that was live on both sides.
    pub last_live_ms: Option<i64>,
    pub net_positions: BTreeMap<String, Decimal>,
}

impl MonitorStatsSnapshot {
    #[must_use]
    pub const fn hedges_required(&self) -> u64 {
        self.buy_ok_sell_fail + self.sell_ok_buy_fail
    }
}

impl MonitorStats {
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            state: AtomicU8::new(MonitorState::Polling.to_u8()),
            ticks: AtomicU64::new(0),
            quiet_ticks: AtomicU64::new(0),
            missing_data_ticks: AtomicU64::new(0),
            opportunities: AtomicU64::new(0),
            both_ok: AtomicU64::new(0),
            buy_ok_sell_fail: AtomicU64::new(0),
            sell_ok_buy_fail: AtomicU64::new(0),
            both_failed: AtomicU64::new(0),
            loop_faults: AtomicU64::new(0),
            last_live_ms: AtomicI64::new(0),
            positions: Mutex::new(NetPositionGauge::new()),
        }
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[must_use]
    pub fn state(&self) -> MonitorState {
        MonitorState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: MonitorState) {
        self.state.store(state.to_u8(), Ordering::Relaxed);
    }

    fn record_outcome(&self, outcome: JointExecutionOutcome) {
        let counter = match outcome {
            JointExecutionOutcome::BothOk => &self.both_ok,
            JointExecutionOutcome::BuyOkSellFail => &self.buy_ok_sell_fail,
            JointExecutionOutcome::SellOkBuyFail => &self.sell_ok_buy_fail,
            JointExecutionOutcome::BothFailed => &self.both_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fault(&self) {
        self.loop_faults.fetch_add(1, Ordering::Relaxed);
    }

    /// Net shares per `{SYMBOL}_{up|down}` instrument.
    #[must_use]
    pub fn net_positions(&self) -> BTreeMap<String, Decimal> {
        self.positions.lock().all_positions().clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> MonitorStatsSnapshot {
        let last_live = self.last_live_ms.load(Ordering::Relaxed);
        MonitorStatsSnapshot {
            symbol: self.symbol.clone(),
            state: self.state(),
            ticks: self.ticks.load(Ordering::Relaxed),
            quiet_ticks: self.quiet_ticks.load(Ordering::Relaxed),
            missing_data_ticks: self.missing_data_ticks.load(Ordering::Relaxed),
            opportunities: self.opportunities.load(Ordering::Relaxed),
            both_ok: self.both_ok.load(Ordering::Relaxed),
            buy_ok_sell_fail: self.buy_ok_sell_fail.load(Ordering::Relaxed),
            sell_ok_buy_fail: self.sell_ok_buy_fail.load(Ordering::Relaxed),
            both_failed: self.both_failed.load(Ordering::Relaxed),
            loop_faults: self.loop_faults.load(Ordering::Relaxed),
            last_live_ms: (last_live > 0).then_some(last_live),
            net_positions: self.net_positions(),
        }
    }
}

// =============================================================================
// Collaborators
// =============================================================================

/// Process-scoped collaborators handed to every monitor.
#[derive(Clone)]
pub struct MonitorDeps {
    pub store: Arc<dyn SnapshotStore>,
    pub placer: Arc<dyn OrderPlacer>,
    pub keys: SnapshotKeys,
    pub quiet_window: QuietWindow,
}

impl MonitorDeps {
    #[must_use]
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        placer: Arc<dyn OrderPlacer>,
        keys: SnapshotKeys,
        quiet_window: QuietWindow,
    ) -> Self {
        Self {
            store,
            placer,
            keys,
            quiet_window,
        }
    }
}

impl std::fmt::Debug for MonitorDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorDeps")
            .field("placer", &self.placer.name())
            .field("keys", &self.keys)
            .field("quiet_window", &self.quiet_window)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Symbol Monitor
// =============================================================================

/// Polling loop for one symbol.
pub struct SymbolMonitor {
    config: MonitorConfig,
    gate: StalenessGate,
    evaluator: ParityEvaluator,
    executor: DualLegExecutor,
    quiet_window: QuietWindow,
    state: MonitorState,
    /// Last live snapshot per side. Diagnostics only, never traded on.
    last_good: HashMap<MarketSide, TickerSnapshot>,
    gauge: NetPositionGauge,
    stats: Arc<MonitorStats>,
    should_stop: Arc<AtomicBool>,
}

impl SymbolMonitor {
    #[must_use]
    pub fn new(config: MonitorConfig, deps: &MonitorDeps) -> Self {
        let gate = StalenessGate::new(Arc::clone(&deps.store), deps.keys.clone(), config.freshness_ms);
        let executor = DualLegExecutor::new(Arc::clone(&deps.placer), config.leg_timeout());
        let stats = Arc::new(MonitorStats::new(config.symbol.clone()));

        Self {
            evaluator: ParityEvaluator::new(config.edge_threshold),
            gate,
            executor,
            quiet_window: deps.quiet_window,
            state: MonitorState::Polling,
            last_good: HashMap::new(),
            gauge: NetPositionGauge::new(),
            stats,
            should_stop: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Publishes counters into an existing stats handle.
    ///
    /// The gauge is seeded from the handle so a restarted monitor keeps the
    /// net position of its predecessor.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<MonitorStats>) -> Self {
        self.gauge = stats.positions.lock().clone();
        self.stats = stats;
        self
    }

    #[must_use]
    pub fn with_stop_handle(mut self, should_stop: Arc<AtomicBool>) -> Self {
        self.should_stop = should_stop;
        self
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> MonitorState {
        self.state
    }

    #[must_use]
    pub fn stats(&self) -> Arc<MonitorStats> {
        Arc::clone(&self.stats)
    }

    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.should_stop)
    }

    #[must_use]
    pub const fn gauge(&self) -> &NetPositionGauge {
        &self.gauge
    }

    #[must_use]
    pub fn last_known_good(&self, side: MarketSide) -> Option<&TickerSnapshot> {
        self.last_good.get(&side)
    }

    fn transition(&mut self, next: MonitorState) {
        if self.state != next {
            debug!(symbol = %self.config.symbol, from = %self.state, to = %next, "Monitor state");
        }
        self.state = next;
        self.stats.set_state(next);
    }

    /// Runs one tick against the wall clock.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot store fails or holds garbage.
    pub async fn tick(&mut self) -> Result<TickOutcome, MonitorError> {
        self.tick_at(Utc::now()).await
    }

    /// Runs one tick against an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot store fails or holds garbage.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> Result<TickOutcome, MonitorError> {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);

        if self.quiet_window.is_quiet(now) {
            self.transition(MonitorState::WaitingWindow);
            self.stats.quiet_ticks.fetch_add(1, Ordering::Relaxed);
            return Ok(TickOutcome::Quiet);
        }
        self.transition(MonitorState::Polling);

        let now_ms = now.timestamp_millis();
        let up = self.read_side(MarketSide::Up, now_ms)?;
        let down = self.read_side(MarketSide::Down, now_ms)?;

        let (Some(up), Some(down)) = (up, down) else {
            self.stats.missing_data_ticks.fetch_add(1, Ordering::Relaxed);
            return Ok(TickOutcome::MissingData);
        };
        self.stats
            .last_live_ms
            .store(up.captured_at_ms.min(down.captured_at_ms), Ordering::Relaxed);

        let Some(opportunity) = self.evaluator.evaluate_at(&up, &down, now) else {
            return Ok(TickOutcome::NoOpportunity);
        };

        self.transition(MonitorState::Executing);
        self.stats.opportunities.fetch_add(1, Ordering::Relaxed);

        let report = self.executor.execute(&opportunity).await;
        self.apply_fills(&report);
        self.stats.record_outcome(report.outcome);

        self.transition(MonitorState::Polling);
        Ok(TickOutcome::Executed(Box::new(report)))
    }

    fn read_side(
        &mut self,
        side: MarketSide,
        now_ms: i64,
    ) -> Result<Option<TickerSnapshot>, StoreError> {
        match self.gate.inspect_at(&self.config.symbol, side, now_ms)? {
            GateRead::Fresh(snapshot) => {
                self.last_good.insert(side, snapshot.clone());
                Ok(Some(snapshot))
            }
            GateRead::Stale { age_ms } => {
                trace!(symbol = %self.config.symbol, side = %side, age_ms, "Skipping stale side");
                Ok(None)
            }
            GateRead::Missing => Ok(None),
        }
    }

    fn apply_fills(&mut self, report: &ExecutionReport) {
        for leg in report.filled_legs() {
            let instrument = format!("{}_{}", self.config.symbol, leg.leg.market_side());
            let direction = FillDirection::from(leg.order.side);
            let net = self.gauge.record_fill(&instrument, direction, leg.order.size);
            debug!(instrument = %instrument, net = %net, "Net position");
        }
        *self.stats.positions.lock() = self.gauge.clone();
    }

    /// Runs ticks until the stop handle is set.
    pub async fn run(mut self) {
        info!(
            symbol = %self.config.symbol,
            edge_threshold = %self.config.edge_threshold,
            poll_interval_ms = self.config.poll_interval_ms,
            freshness_ms = self.config.freshness_ms,
            leg_timeout_ms = self.config.leg_timeout_ms,
            "Symbol monitor started"
        );

        while !self.should_stop.load(Ordering::SeqCst) {
            let result = AssertUnwindSafe(self.tick())
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(MonitorError::Panicked(panic_message(panic.as_ref()))));

            let delay = match result {
                Ok(TickOutcome::Quiet) => self.config.quiet_poll(),
                Ok(_) => self.config.poll_interval(),
                Err(e) => {
                    self.stats.record_fault();
                    self.transition(MonitorState::Polling);
                    error!(
                        symbol = %self.config.symbol,
                        error = %e,
                        retry_in_ms = self.config.recovery_delay_ms,
                        "Monitor tick failed"
                    );
                    self.config.recovery_delay()
                }
            };

            tokio::time::sleep(delay).await;
        }

        info!(symbol = %self.config.symbol, "Symbol monitor stopped");
    }
}

impl std::fmt::Debug for SymbolMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolMonitor")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
