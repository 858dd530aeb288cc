//! Paper order placement.
//!
//! [`PaperOrderPlacer`] stands in for the signing gateway: it answers every
//! leg locally, optionally after a simulated latency, and keeps a history of
//! what it was asked to do. Acceptance can be made probabilistic for soak
//! runs that should exercise the hedge-required paths.
//!
//! # Example
//!
//! ```ignore
//! use updown_arb_polymarket::arbitrage::paper_executor::{PaperOrderPlacer, PaperPlacerConfig};
//!
//! let placer = PaperOrderPlacer::new(PaperPlacerConfig::always_accept());
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use super::execution::{ExecutionError, LegOrder, OrderPlacer, PlaceOrderResponse};

/// Result code returned for simulated rejections.
pub const PAPER_REJECT_CODE: i64 = 1;

const DEFAULT_HISTORY_LIMIT: usize = 1000;

// =============================================================================
// Configuration
// =============================================================================

/// Simulation settings for [`PaperOrderPlacer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperPlacerConfig {
    /// Probability that a leg is accepted (0.0 to 1.0).
    /// Default: 1.0
    pub accept_rate: f64,

    /// Simulated round-trip latency in milliseconds.
    /// Default: 0
    pub simulate_latency_ms: u64,

    /// Optional seed for reproducible acceptance draws.
    pub random_seed: Option<u64>,

    /// Most recent legs kept in history; older records are dropped.
    /// Default: 1000
    pub history_limit: usize,
}

impl Default for PaperPlacerConfig {
    fn default() -> Self {
        Self {
            accept_rate: 1.0,
            simulate_latency_ms: 0,
            random_seed: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl PaperPlacerConfig {
    /// Accepts every leg.
    #[must_use]
    pub fn always_accept() -> Self {
        Self::default()
    }

    /// Rejects every leg.
    #[must_use]
    pub fn never_accept() -> Self {
        Self {
            accept_rate: 0.0,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_latency_ms(mut self, ms: u64) -> Self {
        self.simulate_latency_ms = ms;
        self
    }

    /// Sets the acceptance rate, clamped to [0, 1].
    #[must_use]
    pub fn with_accept_rate(mut self, rate: f64) -> Self {
        self.accept_rate = rate.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}

// =============================================================================
// Order History
// =============================================================================

/// One leg as seen by the paper placer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperOrderRecord {
    pub id: Uuid,
    pub order: LegOrder,
    pub accepted: bool,
    pub submitted_at: DateTime<Utc>,
}

// =============================================================================
// Placer
// =============================================================================

/// Local placer that never touches a venue.
pub struct PaperOrderPlacer {
    config: PaperPlacerConfig,
    rng: Mutex<StdRng>,
    history: RwLock<VecDeque<PaperOrderRecord>>,
    submitted: AtomicUsize,
}

impl PaperOrderPlacer {
    #[must_use]
    pub fn new(config: PaperPlacerConfig) -> Self {
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            rng: Mutex::new(rng),
            history: RwLock::new(VecDeque::new()),
            submitted: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PaperPlacerConfig {
        &self.config
    }

    /// The most recent legs, oldest first, at most `history_limit` of them.
    #[must_use]
    pub fn history(&self) -> Vec<PaperOrderRecord> {
        self.history.read().iter().cloned().collect()
    }

    /// Legs submitted since creation, including ones no longer in history.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.submitted.load(Ordering::Relaxed)
    }

    fn record(&self, record: PaperOrderRecord) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        let limit = self.config.history_limit;
        if limit == 0 {
            return;
        }
        let mut history = self.history.write();
        while history.len() >= limit {
            history.pop_front();
        }
        history.push_back(record);
    }

    fn draw_acceptance(&self) -> bool {
        if self.config.accept_rate >= 1.0 {
            return true;
        }
        if self.config.accept_rate <= 0.0 {
            return false;
        }
        self.rng.lock().gen::<f64>() < self.config.accept_rate
    }
}

impl Default for PaperOrderPlacer {
    fn default() -> Self {
        Self::new(PaperPlacerConfig::default())
    }
}

#[async_trait]
impl OrderPlacer for PaperOrderPlacer {
    async fn place_order(&self, order: LegOrder) -> Result<PlaceOrderResponse, ExecutionError> {
        if self.config.simulate_latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.simulate_latency_ms)).await;
        }

        let accepted = self.draw_acceptance();
        tracing::debug!(
            market = %order.market,
            side = %order.side,
            size = %order.size,
            price = %order.price,
            accepted,
            "Paper leg"
        );

        self.record(PaperOrderRecord {
            id: Uuid::new_v4(),
            order,
            accepted,
            submitted_at: Utc::now(),
        });

        if accepted {
            Ok(PlaceOrderResponse::accepted())
        } else {
            Ok(PlaceOrderResponse::rejected(
                PAPER_REJECT_CODE,
                "simulated rejection",
            ))
        }
    }

    fn name(&self) -> &str {
        "paper"
    }
}
