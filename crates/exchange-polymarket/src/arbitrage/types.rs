//! Data types for up/down parity arbitrage.
//!
//! This module provides the strongly typed records that flow through the engine:
//! - [`MarketSide`]: which of the two complementary contracts a snapshot describes
//! - [`TickerSnapshot`]: top-of-book state for one side of one symbol
//! - [`ArbitrageOpportunity`]: a detected parity mismatch, ready for execution
//!
//! Snapshots arrive as loosely shaped JSON written by the upstream feed. The
//! [`TickerSnapshot::from_json`] decoder maps that into the typed record and
//! reports a missing field as absence rather than as a zero value.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::execution::Side;

// =============================================================================
// Market Side
// =============================================================================

/// One of the two complementary outcome contracts of a symbol's market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSide {
    /// Pays out if the underlying closes the window higher.
    Up,
    /// Pays out if the underlying closes the window lower.
    Down,
}

impl MarketSide {
    /// Lower-case tag used in snapshot keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MarketSide::Up => "up",
            MarketSide::Down => "down",
        }
    }

    /// Maps an exchange outcome label ("Up", "Down", "Yes", "No") to a side.
    #[must_use]
    pub fn from_outcome(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "up" | "yes" => Some(MarketSide::Up),
            "down" | "no" => Some(MarketSide::Down),
            _ => None,
        }
    }
}

impl fmt::Display for MarketSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Snapshot Keys
// =============================================================================

/// Builds store keys of the form `{SYMBOL}_{side}_{interval}_{venue}_ticker`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotKeys {
    interval: String,
    venue: String,
}

impl SnapshotKeys {
    #[must_use]
    pub fn new(interval: impl Into<String>, venue: impl Into<String>) -> Self {
        Self {
            interval: interval.into(),
            venue: venue.into(),
        }
    }

    #[must_use]
    pub fn key(&self, symbol: &str, side: MarketSide) -> String {
        format!(
            "{}_{}_{}_{}_ticker",
            symbol.to_uppercase(),
            side,
            self.interval,
            self.venue
        )
    }
}

impl Default for SnapshotKeys {
    fn default() -> Self {
        Self::new("15m", "polymarket")
    }
}

// =============================================================================
// Ticker Snapshot
// =============================================================================

/// Latest known top-of-book state for one side of one symbol.
///
/// Produced by the upstream feed and only ever read here. `best_bid <= best_ask`
/// is expected but not checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub side: MarketSide,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub bid_size: Decimal,
    pub ask_size: Decimal,
    /// Exchange token identifier used when placing an order on this side.
    pub token_id: String,
    /// Capture time in epoch milliseconds.
    pub captured_at_ms: i64,
}

/// Wire shape of a stored snapshot. Every field is optional so that a partial
/// payload can be told apart from a zero-valued one.
#[derive(Debug, Default, Deserialize, Serialize)]
struct RawTicker {
    #[serde(rename = "bestBid", default, skip_serializing_if = "Option::is_none")]
    best_bid: Option<Decimal>,
    #[serde(rename = "bestAsk", default, skip_serializing_if = "Option::is_none")]
    best_ask: Option<Decimal>,
    #[serde(
        rename = "bidSz",
        alias = "bidSize",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    bid_size: Option<Decimal>,
    #[serde(
        rename = "askSz",
        alias = "askSize",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    ask_size: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ts: Option<serde_json::Value>,
    #[serde(
        rename = "token_id",
        alias = "tokenId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    token_id: Option<String>,
}

/// Accepts an epoch-millisecond timestamp encoded as an integer, float, or string.
fn epoch_ms(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| Decimal::from_str(s.trim()).ok().and_then(|d| d.trunc().to_i64())),
        _ => None,
    }
}

impl TickerSnapshot {
    /// Decodes a stored snapshot payload.
    ///
    /// Returns `Ok(None)` when the payload is valid JSON but lacks any field the
    /// engine needs (prices, sizes, timestamp, token id). Returns `Err` only
    /// when the payload is not a JSON object at all.
    pub fn from_json(
        symbol: &str,
        side: MarketSide,
        payload: &str,
    ) -> Result<Option<Self>, serde_json::Error> {
        let raw: RawTicker = serde_json::from_str(payload)?;

        let captured_at_ms = match raw.ts.as_ref().and_then(epoch_ms) {
            Some(ts) => ts,
            None => return Ok(None),
        };

        let (Some(best_bid), Some(best_ask), Some(bid_size), Some(ask_size), Some(token_id)) = (
            raw.best_bid,
            raw.best_ask,
            raw.bid_size,
            raw.ask_size,
            raw.token_id,
        ) else {
            return Ok(None);
        };

        if token_id.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self {
            symbol: symbol.to_string(),
            side,
            best_bid,
            best_ask,
            bid_size,
            ask_size,
            token_id,
            captured_at_ms,
        }))
    }

    /// Encodes the snapshot in the store's wire format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let raw = RawTicker {
            best_bid: Some(self.best_bid),
            best_ask: Some(self.best_ask),
            bid_size: Some(self.bid_size),
            ask_size: Some(self.ask_size),
            ts: Some(serde_json::Value::from(self.captured_at_ms)),
            token_id: Some(self.token_id.clone()),
        };
        serde_json::to_string(&raw)
    }

    /// Milliseconds elapsed between capture and `now_ms` (negative if captured in the future).
    #[must_use]
    pub const fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.captured_at_ms
    }
}

// =============================================================================
// Arbitrage Opportunity
// =============================================================================

/// A parity mismatch large enough to act on.
///
/// Both legs trade in `direction`. The buy leg is the UP contract priced at
/// `buy_leg_price`; the sell leg is the DOWN contract priced at `sell_leg_price`.
/// Lives only for the tick that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArbitrageOpportunity {
    pub symbol: String,
    pub direction: Side,
    /// Shares per leg: the smaller of the two legs' displayed sizes.
    pub size: Decimal,
    pub buy_leg_price: Decimal,
    pub sell_leg_price: Decimal,
    /// Distance from parity, strictly above the configured threshold.
    pub edge: Decimal,
    pub up_token_id: String,
    pub down_token_id: String,
    pub detected_at: DateTime<Utc>,
}

impl ArbitrageOpportunity {
    /// Combined price of both legs.
    #[must_use]
    pub fn pair_price(&self) -> Decimal {
        self.buy_leg_price + self.sell_leg_price
    }

    /// Profit locked in at settlement if both legs fill, before fees.
    #[must_use]
    pub fn expected_profit(&self) -> Decimal {
        self.edge * self.size
    }
}

// =============================================================================
// Tests
// =============================================================================
