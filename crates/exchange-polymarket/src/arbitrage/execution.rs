//! Order placement contract for dual-leg arbitrage.
//!
//! The engine never signs or routes orders itself. It hands each leg to an
//! [`OrderPlacer`], a remote capability that answers with a numeric result
//! code (`0` = accepted) or fails outright.
//!
//! # Example
//!
//! ```ignore
//! use updown_arb_polymarket::arbitrage::execution::*;
//! use rust_decimal_macros::dec;
//!
//! async fn place(placer: &dyn OrderPlacer) -> Result<(), ExecutionError> {
//!     let order = LegOrder::new("token-up", Side::Buy, dec!(80), dec!(0.48));
//!     let response = placer.place_order(order).await?;
//!     println!("accepted: {}", response.is_ok());
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use updown_arb_core::FillDirection;

// =============================================================================
// Order Types
// =============================================================================

/// Side of an order (buy/sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy shares.
    Buy,
    /// Sell shares.
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl From<Side> for FillDirection {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => FillDirection::Buy,
            Side::Sell => FillDirection::Sell,
        }
    }
}

/// One leg of an arbitrage, as handed to the placement capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegOrder {
    /// Exchange market/token identifier for this leg.
    pub market: String,
    pub side: Side,
    /// Number of shares.
    pub size: Decimal,
    /// Limit price in [0, 1].
    pub price: Decimal,
}

impl LegOrder {
    #[must_use]
    pub fn new(market: impl Into<String>, side: Side, size: Decimal, price: Decimal) -> Self {
        Self {
            market: market.into(),
            side,
            size,
            price,
        }
    }

    /// Notional value if fully filled.
    #[must_use]
    pub fn notional_value(&self) -> Decimal {
        self.price * self.size
    }
}

/// Answer from the placement capability. `code == 0` means the leg was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderResponse {
    pub code: i64,
    #[serde(default, alias = "msg", alias = "error")]
    pub message: Option<String>,
}

impl PlaceOrderResponse {
    /// Accepted response.
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            code: 0,
            message: None,
        }
    }

    /// Non-zero response with an explanation.
    #[must_use]
    pub fn rejected(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.code == 0
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failures raised by an [`OrderPlacer`].
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Transport-level failure reaching the placement service.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The placement service answered with a non-success HTTP status.
    #[error("Placement service returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },

    /// The response could not be understood.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Any other fault raised while placing the order.
    #[error("Placement failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for ExecutionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ExecutionError::InvalidResponse(err.to_string())
        } else {
            ExecutionError::Http(err.to_string())
        }
    }
}

// =============================================================================
// Placement Trait
// =============================================================================

/// Remote capability that submits a single leg.
///
/// Implementations must tolerate two concurrent calls without sharing mutable
/// state between them; the dual-leg executor fires both legs at once.
#[async_trait]
pub trait OrderPlacer: Send + Sync {
    /// Submits one leg.
    ///
    /// # Errors
    ///
    /// Returns an error if the order could not be submitted or the answer
    /// could not be read. A readable non-zero code is `Ok` with that code.
    async fn place_order(&self, order: LegOrder) -> Result<PlaceOrderResponse, ExecutionError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}
