//! Keyed store of serialized ticker snapshots.
//!
//! The monitors only ever read from the store. An upstream publisher (the
//! [`TickerFeed`](crate::websocket::TickerFeed) in this crate, or any external
//! process behind another [`SnapshotStore`] implementation) writes into it.

use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

use super::types::TickerSnapshot;

/// Errors raised while reading snapshots.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("Snapshot store unavailable: {0}")]
    Unavailable(String),

    /// A stored value is not a JSON snapshot.
    #[error("Malformed snapshot at {key}: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Read access to the latest serialized snapshot per key.
pub trait SnapshotStore: Send + Sync {
    /// Returns the raw payload stored under `key`, or `None` if nothing has been
    /// published yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// Process-local snapshot store, shared by `Arc` between the feed and monitors.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the payload under `key`.
    pub fn put(&self, key: impl Into<String>, payload: impl Into<String>) {
        self.entries.write().insert(key.into(), payload.into());
    }

    /// Serializes and stores a typed snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be serialized.
    pub fn put_snapshot(&self, key: &str, snapshot: &TickerSnapshot) -> Result<(), serde_json::Error> {
        let payload = snapshot.to_json()?;
        self.put(key, payload);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.write().remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::types::MarketSide;
    use rust_decimal_macros::dec;

    #[test]
    fn test_missing_key_is_none() {
        let store = InMemorySnapshotStore::new();
        assert!(store.get("BTC_up_15m_polymarket_ticker").unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_overwrites_and_remove() {
        let store = InMemorySnapshotStore::new();
        store.put("k", "one");
        store.put("k", "two");

        assert_eq!(store.get("k").unwrap().as_deref(), Some("two"));
        assert_eq!(store.len(), 1);

        assert_eq!(store.remove("k").as_deref(), Some("two"));
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn test_put_snapshot_writes_wire_format() {
        let store = InMemorySnapshotStore::new();
        let snap = TickerSnapshot {
            symbol: "BTC".to_string(),
            side: MarketSide::Up,
            best_bid: dec!(0.47),
            best_ask: dec!(0.48),
            bid_size: dec!(10),
            ask_size: dec!(100),
            token_id: "tok-up".to_string(),
            captured_at_ms: 1_000,
        };

        store.put_snapshot("BTC_up_15m_polymarket_ticker", &snap).unwrap();

        let raw = store.get("BTC_up_15m_polymarket_ticker").unwrap().unwrap();
        assert!(raw.contains("\"bestAsk\""));
        assert!(raw.contains("tok-up"));
    }
}
