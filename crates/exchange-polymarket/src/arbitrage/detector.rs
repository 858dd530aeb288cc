//! Parity mismatch detection for paired UP/DOWN markets.
//!
//! The two contracts of a symbol settle to exactly 1.0 combined. When both
//! asks sum to less than `1 - edge`, buying one of each locks in a profit; when
//! both bids sum to more than `1 + edge`, selling one of each does.
//!
//! # Ordering
//!
//! The buy check always runs first. If it produces an opportunity the sell
//! check is skipped for that tick, so at most one opportunity is acted on
//! against the same top of book. A buy mismatch with zero displayed size does
//! not count as a hit, and the sell check still runs.
//!
//! # Example
//!
//! ```ignore
//! use updown_arb_polymarket::arbitrage::ParityEvaluator;
//! use rust_decimal_macros::dec;
//!
//! let evaluator = ParityEvaluator::new(dec!(0.002));
//! if let Some(opp) = evaluator.evaluate(&up, &down) {
//!     println!("{} {} edge={}", opp.symbol, opp.direction, opp.edge);
//! }
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::execution::Side;
use super::types::{ArbitrageOpportunity, TickerSnapshot};

/// Default buffer over parity covering fees and slippage.
pub const DEFAULT_EDGE_THRESHOLD: Decimal = dec!(0.002);

/// Stateless evaluator comparing a fresh UP/DOWN pair against parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParityEvaluator {
    /// Minimum mismatch, exclusive, before a pair is worth trading.
    pub edge_threshold: Decimal,
}

impl Default for ParityEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_EDGE_THRESHOLD)
    }
}

impl ParityEvaluator {
    #[must_use]
    pub const fn new(edge_threshold: Decimal) -> Self {
        Self { edge_threshold }
    }

    /// Mismatch available by buying both asks.
    #[must_use]
    pub fn buy_mismatch(up: &TickerSnapshot, down: &TickerSnapshot) -> Decimal {
        Decimal::ONE - (up.best_ask + down.best_ask)
    }

    /// Mismatch available by selling both bids.
    #[must_use]
    pub fn sell_mismatch(up: &TickerSnapshot, down: &TickerSnapshot) -> Decimal {
        (up.best_bid + down.best_bid) - Decimal::ONE
    }

    /// Evaluates a pair, stamping any opportunity with the current time.
    #[must_use]
    pub fn evaluate(&self, up: &TickerSnapshot, down: &TickerSnapshot) -> Option<ArbitrageOpportunity> {
        self.evaluate_at(up, down, Utc::now())
    }

    /// Evaluates a pair. Buy check first, first match wins.
    #[must_use]
    pub fn evaluate_at(
        &self,
        up: &TickerSnapshot,
        down: &TickerSnapshot,
        detected_at: DateTime<Utc>,
    ) -> Option<ArbitrageOpportunity> {
        let miss_buy = Self::buy_mismatch(up, down);
        if miss_buy > self.edge_threshold {
            let size = up.ask_size.min(down.ask_size);
            if size > Decimal::ZERO {
                return Some(Self::opportunity(
                    up,
                    down,
                    Side::Buy,
                    size,
                    (up.best_ask, down.best_ask),
                    miss_buy,
                    detected_at,
                ));
            }
        }

        let miss_sell = Self::sell_mismatch(up, down);
        if miss_sell > self.edge_threshold {
            let size = up.bid_size.min(down.bid_size);
            if size > Decimal::ZERO {
                return Some(Self::opportunity(
                    up,
                    down,
                    Side::Sell,
                    size,
                    (up.best_bid, down.best_bid),
                    miss_sell,
                    detected_at,
                ));
            }
        }

        None
    }

    fn opportunity(
        up: &TickerSnapshot,
        down: &TickerSnapshot,
        direction: Side,
        size: Decimal,
        (buy_leg_price, sell_leg_price): (Decimal, Decimal),
        edge: Decimal,
        detected_at: DateTime<Utc>,
    ) -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            symbol: up.symbol.clone(),
            direction,
            size,
            buy_leg_price,
            sell_leg_price,
            edge,
            up_token_id: up.token_id.clone(),
            down_token_id: down.token_id.clone(),
            detected_at,
        }
    }
}
