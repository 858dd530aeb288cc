//! Concurrent two-leg execution for parity arbitrage.
//!
//! Both legs of an [`ArbitrageOpportunity`] are submitted at the same time and
//! awaited together, each bounded by the same leg timeout.
//!
//! # Execution Flow
//!
//! 1. Build the buy leg (UP contract) and sell leg (DOWN contract), both in
//!    the opportunity's direction
//! 2. Spawn one task per leg and join them, each wrapped in a timeout
//! 3. Convert every answer, error, panic or timeout into a [`LegExecutionResult`]
//! 4. Classify the pair into a [`JointExecutionOutcome`] and log it
//!
//! # Timeouts
//!
//! A leg that misses the deadline is classified as failed, but its task is left
//! running: the order may still reach the venue. The log record keeps
//! `remote_state = "unknown"` for that leg. Nothing here retries or unwinds a
//! leg; a one-sided outcome is only flagged as hedge-required.

use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

use super::execution::{ExecutionError, LegOrder, OrderPlacer, PlaceOrderResponse};
use super::types::{ArbitrageOpportunity, MarketSide};

// =============================================================================
// Leg Results
// =============================================================================

/// Which half of the pair a leg is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegKey {
    /// The UP-contract order priced at `buy_leg_price`.
    Buy,
    /// The DOWN-contract order priced at `sell_leg_price`.
    Sell,
}

impl LegKey {
    /// Contract the leg trades.
    #[must_use]
    pub const fn market_side(&self) -> MarketSide {
        match self {
            LegKey::Buy => MarketSide::Up,
            LegKey::Sell => MarketSide::Down,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            LegKey::Buy => "buy",
            LegKey::Sell => "sell",
        }
    }
}

impl fmt::Display for LegKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a leg counts as failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LegFault {
    /// The placement capability answered with a non-zero code.
    #[error("rejected with code {code}: {}", .message.as_deref().unwrap_or("no message"))]
    Rejected { code: i64, message: Option<String> },

    /// The placement capability raised.
    #[error("placement error: {0}")]
    Placement(String),

    /// No answer within the leg timeout. The remote state is unknown.
    #[error("no answer after {after_ms}ms")]
    TimedOut { after_ms: u64 },

    /// The leg task panicked or was cancelled.
    #[error("leg task aborted: {0}")]
    Aborted(String),
}

impl LegFault {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, LegFault::TimedOut { .. })
    }
}

/// Outcome of placing one leg. `error` is present iff `ok` is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegExecutionResult {
    pub leg: LegKey,
    pub ok: bool,
    pub error: Option<LegFault>,
    /// The order that was submitted.
    pub order: LegOrder,
    /// Local wall time spent waiting for this leg.
    pub latency_ms: u64,
}

impl LegExecutionResult {
    #[must_use]
    pub fn succeeded(leg: LegKey, order: LegOrder, latency_ms: u64) -> Self {
        Self {
            leg,
            ok: true,
            error: None,
            order,
            latency_ms,
        }
    }

    #[must_use]
    pub fn failed(leg: LegKey, order: LegOrder, fault: LegFault, latency_ms: u64) -> Self {
        Self {
            leg,
            ok: false,
            error: Some(fault),
            order,
            latency_ms,
        }
    }

    /// Remote state is unknown when the leg timed out.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.error.as_ref().is_some_and(LegFault::is_timeout)
    }
}

// =============================================================================
// Joint Outcome
// =============================================================================

/// Four mutually exclusive classifications of a dual-leg attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointExecutionOutcome {
    BothOk,
    BuyOkSellFail,
    SellOkBuyFail,
    BothFailed,
}

impl JointExecutionOutcome {
    #[must_use]
    pub const fn classify(buy_ok: bool, sell_ok: bool) -> Self {
        match (buy_ok, sell_ok) {
            (true, true) => JointExecutionOutcome::BothOk,
            (true, false) => JointExecutionOutcome::BuyOkSellFail,
            (false, true) => JointExecutionOutcome::SellOkBuyFail,
            (false, false) => JointExecutionOutcome::BothFailed,
        }
    }

    /// One leg filled and the other did not, leaving directional exposure.
    #[must_use]
    pub const fn is_hedge_required(&self) -> bool {
        matches!(
            self,
            JointExecutionOutcome::BuyOkSellFail | JointExecutionOutcome::SellOkBuyFail
        )
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, JointExecutionOutcome::BothOk)
    }

    /// Label carried in the `outcome` log field.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            JointExecutionOutcome::BothOk => "BOTH LEGS OK",
            JointExecutionOutcome::BuyOkSellFail => "BUY OK/SELL FAIL",
            JointExecutionOutcome::SellOkBuyFail => "SELL OK/BUY FAIL",
            JointExecutionOutcome::BothFailed => "BOTH LEGS FAILED",
        }
    }
}

impl fmt::Display for JointExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything known about one execution attempt.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub opportunity: ArbitrageOpportunity,
    pub buy: LegExecutionResult,
    pub sell: LegExecutionResult,
    pub outcome: JointExecutionOutcome,
    pub elapsed_ms: u64,
}

impl ExecutionReport {
    /// Legs that were accepted, in buy/sell order.
    pub fn filled_legs(&self) -> impl Iterator<Item = &LegExecutionResult> {
        [&self.buy, &self.sell].into_iter().filter(|leg| leg.ok)
    }

    /// Shares left unpaired: one leg's size when hedge-required, else zero.
    #[must_use]
    pub fn imbalance(&self) -> Decimal {
        if self.outcome.is_hedge_required() {
            self.opportunity.size
        } else {
            Decimal::ZERO
        }
    }
}

// =============================================================================
// Dual Leg Executor
// =============================================================================

/// Fires both legs of an opportunity concurrently with a bounded wait.
#[derive(Clone)]
pub struct DualLegExecutor {
    placer: Arc<dyn OrderPlacer>,
    leg_timeout: Duration,
}

impl DualLegExecutor {
    #[must_use]
    pub fn new(placer: Arc<dyn OrderPlacer>, leg_timeout: Duration) -> Self {
        Self {
            placer,
            leg_timeout,
        }
    }

    #[must_use]
    pub const fn leg_timeout(&self) -> Duration {
        self.leg_timeout
    }

    /// Builds the two leg orders for an opportunity.
    #[must_use]
    pub fn build_legs(opp: &ArbitrageOpportunity) -> (LegOrder, LegOrder) {
        let buy = LegOrder::new(
            opp.up_token_id.clone(),
            opp.direction,
            opp.size,
            opp.buy_leg_price,
        );
        let sell = LegOrder::new(
            opp.down_token_id.clone(),
            opp.direction,
            opp.size,
            opp.sell_leg_price,
        );
        (buy, sell)
    }

    /// Places both legs and classifies the joint outcome. Never fails: every
    /// fault is folded into the report.
    pub async fn execute(&self, opp: &ArbitrageOpportunity) -> ExecutionReport {
        let (buy_order, sell_order) = Self::build_legs(opp);
        let started = Instant::now();

        info!(
            symbol = %opp.symbol,
            direction = %opp.direction,
            edge = %opp.edge,
            size = %opp.size,
            pair_price = %opp.pair_price(),
            expected_profit = %opp.expected_profit(),
            buy_leg_price = %opp.buy_leg_price,
            sell_leg_price = %opp.sell_leg_price,
            placer = self.placer.name(),
            "ARB detected, firing both legs"
        );

        let (buy, sell) = tokio::join!(
            self.run_leg(LegKey::Buy, buy_order),
            self.run_leg(LegKey::Sell, sell_order),
        );

        let outcome = JointExecutionOutcome::classify(buy.ok, sell.ok);
        let report = ExecutionReport {
            opportunity: opp.clone(),
            buy,
            sell,
            outcome,
            elapsed_ms: elapsed_ms(started),
        };

        log_report(&report);
        report
    }

    async fn run_leg(&self, leg: LegKey, order: LegOrder) -> LegExecutionResult {
        let placer = Arc::clone(&self.placer);
        let submitted = order.clone();
        let started = Instant::now();

        // Dropping the handle on timeout detaches the task; the remote call is
        // allowed to finish on its own.
        let handle = tokio::spawn(async move { placer.place_order(submitted).await });
        let joined = tokio::time::timeout(self.leg_timeout, handle).await;
        let latency_ms = elapsed_ms(started);

        match joined {
            Ok(Ok(answer)) => classify_answer(leg, order, answer, latency_ms),
            Ok(Err(join_err)) => {
                LegExecutionResult::failed(leg, order, LegFault::Aborted(join_err.to_string()), latency_ms)
            }
            Err(_) => {
                let after_ms = u64::try_from(self.leg_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(
                    leg = %leg,
                    market = %order.market,
                    after_ms,
                    remote_state = "unknown",
                    "Leg timed out, remote order may still execute"
                );
                LegExecutionResult::failed(leg, order, LegFault::TimedOut { after_ms }, latency_ms)
            }
        }
    }
}

impl fmt::Debug for DualLegExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualLegExecutor")
            .field("placer", &self.placer.name())
            .field("leg_timeout", &self.leg_timeout)
            .finish()
    }
}

fn classify_answer(
    leg: LegKey,
    order: LegOrder,
    answer: Result<PlaceOrderResponse, ExecutionError>,
    latency_ms: u64,
) -> LegExecutionResult {
    match answer {
        Ok(response) if response.is_ok() => LegExecutionResult::succeeded(leg, order, latency_ms),
        Ok(response) => LegExecutionResult::failed(
            leg,
            order,
            LegFault::Rejected {
                code: response.code,
                message: response.message,
            },
            latency_ms,
        ),
        Err(e) => LegExecutionResult::failed(leg, order, LegFault::Placement(e.to_string()), latency_ms),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn fault_text(result: &LegExecutionResult) -> String {
    result
        .error
        .as_ref()
        .map_or_else(String::new, ToString::to_string)
}

fn log_report(report: &ExecutionReport) {
    let opp = &report.opportunity;
    match report.outcome {
        JointExecutionOutcome::BothOk => info!(
            symbol = %opp.symbol,
            direction = %opp.direction,
            edge = %opp.edge,
            size = %opp.size,
            outcome = report.outcome.label(),
            elapsed_ms = report.elapsed_ms,
            "BOTH LEGS OK"
        ),
        JointExecutionOutcome::BuyOkSellFail | JointExecutionOutcome::SellOkBuyFail => {
            let (filled, failed) = if report.buy.ok {
                (&report.buy, &report.sell)
            } else {
                (&report.sell, &report.buy)
            };
            let remote_state = if failed.is_ambiguous() { "unknown" } else { "failed" };
            error!(
                symbol = %opp.symbol,
                direction = %opp.direction,
                edge = %opp.edge,
                size = %opp.size,
                outcome = report.outcome.label(),
                hedge_required = true,
                failed_leg = %failed.leg,
                failed_market = %failed.order.market,
                open_market = %filled.order.market,
                open_notional = %filled.order.notional_value(),
                error = %fault_text(failed),
                remote_state,
                "{} HEDGE REQUIRED",
                report.outcome.label()
            );
        }
        JointExecutionOutcome::BothFailed => error!(
            symbol = %opp.symbol,
            direction = %opp.direction,
            edge = %opp.edge,
            size = %opp.size,
            outcome = report.outcome.label(),
            buy_error = %fault_text(&report.buy),
            sell_error = %fault_text(&report.sell),
            "BOTH LEGS FAILED"
        ),
    }
}
