//! Freshness gate in front of the snapshot store.
//!
//! A snapshot is only handed to the evaluator while
//! `now_ms - captured_at_ms <= freshness_ms`. Missing, partial and stale
//! snapshots all read as absent; none of them is an error.

use chrono::Utc;
use std::sync::Arc;
use tracing::trace;

use super::snapshot_store::{SnapshotStore, StoreError};
use super::types::{MarketSide, SnapshotKeys, TickerSnapshot};

/// Result of one gated read, keeping the reason for absence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateRead {
    Fresh(TickerSnapshot),
    /// Nothing stored, or a payload missing a required field.
    Missing,
    /// Stored and complete, but older than the freshness window.
    Stale { age_ms: i64 },
}

impl GateRead {
    #[must_use]
    pub fn into_snapshot(self) -> Option<TickerSnapshot> {
        match self {
            GateRead::Fresh(snapshot) => Some(snapshot),
            GateRead::Missing | GateRead::Stale { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_fresh(&self) -> bool {
        matches!(self, GateRead::Fresh(_))
    }
}

/// Wraps snapshot reads with a freshness threshold.
#[derive(Clone)]
pub struct StalenessGate {
    store: Arc<dyn SnapshotStore>,
    keys: SnapshotKeys,
    freshness_ms: i64,
}

impl StalenessGate {
    #[must_use]
    pub fn new(store: Arc<dyn SnapshotStore>, keys: SnapshotKeys, freshness_ms: u64) -> Self {
        Self {
            store,
            keys,
            freshness_ms: i64::try_from(freshness_ms).unwrap_or(i64::MAX),
        }
    }

    #[must_use]
    pub const fn freshness_ms(&self) -> i64 {
        self.freshness_ms
    }

    /// Reads the live snapshot for `symbol`/`side` against the wall clock.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store fails or holds a non-JSON payload.
    pub fn read(&self, symbol: &str, side: MarketSide) -> Result<Option<TickerSnapshot>, StoreError> {
        Ok(self.inspect(symbol, side)?.into_snapshot())
    }

    /// Same as [`read`](Self::read), keeping the reason for absence.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store fails or holds a non-JSON payload.
    pub fn inspect(&self, symbol: &str, side: MarketSide) -> Result<GateRead, StoreError> {
        self.inspect_at(symbol, side, Utc::now().timestamp_millis())
    }

    /// Gated read against an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store fails or holds a non-JSON payload.
    pub fn inspect_at(
        &self,
        symbol: &str,
        side: MarketSide,
        now_ms: i64,
    ) -> Result<GateRead, StoreError> {
        let key = self.keys.key(symbol, side);

        let Some(payload) = self.store.get(&key)? else {
            trace!(key = %key, "No snapshot published");
            return Ok(GateRead::Missing);
        };

        let snapshot = TickerSnapshot::from_json(symbol, side, &payload)
            .map_err(|source| StoreError::Malformed {
                key: key.clone(),
                source,
            })?;

        let Some(snapshot) = snapshot else {
            trace!(key = %key, "Snapshot missing required fields");
            return Ok(GateRead::Missing);
        };

        let age_ms = snapshot.age_ms(now_ms);
        if age_ms > self.freshness_ms {
            trace!(key = %key, age_ms, freshness_ms = self.freshness_ms, "Snapshot stale");
            return Ok(GateRead::Stale { age_ms });
        }

        Ok(GateRead::Fresh(snapshot))
    }
}

impl std::fmt::Debug for StalenessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StalenessGate")
            .field("keys", &self.keys)
            .field("freshness_ms", &self.freshness_ms)
            .finish_non_exhaustive()
    }
}
