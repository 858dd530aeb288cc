//! Market-channel feed that keeps top-of-book snapshots current in the store.
//!
//! The feed resolves the current window's Up/Down markets through Gamma,
//! subscribes to their tokens on the CLOB market channel, and writes one
//! [`TickerSnapshot`] per token under the key the monitors read. At every
//! 15-minute rollover it resolves the next window's markets and resubscribes.
//!
//! # WebSocket Message Format
//!
//! ## Subscription
//! ```json
//! { "assets_ids": ["token_id_1", "token_id_2"], "type": "market" }
//! ```
//!
//! ## Book Event
//! ```json
//! {
//!   "event_type": "book",
//!   "asset_id": "...",
//!   "bids": [{"price": ".48", "size": "30"}],
//!   "asks": [{"price": ".52", "size": "25"}],
//!   "timestamp": "123456789000"
//! }
//! ```
//!
//! ## Price Change Event
//! ```json
//! {
//!   "event_type": "price_change",
//!   "timestamp": "...",
//!   "price_changes": [
//!     {"asset_id": "...", "price": ".50", "size": "10", "side": "BUY",
//!      "best_bid": ".50", "best_ask": ".52"}
//!   ]
//! }
//! ```

use crate::arbitrage::snapshot_store::InMemorySnapshotStore;
use crate::arbitrage::types::{MarketSide, SnapshotKeys, TickerSnapshot};
use crate::gamma::GammaClient;
use crate::models::UpDownMarket;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use updown_arb_core::FeedConfig;

/// Default WebSocket URL for the CLOB market channel.
pub const WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

/// How often an open connection checks the stop flag.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Configuration for the market-channel connection.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub url: String,
    pub initial_reconnect_delay: Duration,
    /// Cap for exponential backoff.
    pub max_reconnect_delay: Duration,
    /// Interval between keep-alive `PING` texts.
    pub ping_interval: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: WS_URL.to_string(),
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            ping_interval: Duration::from_secs(10),
        }
    }
}

impl From<&FeedConfig> for WebSocketConfig {
    fn from(feed: &FeedConfig) -> Self {
        Self {
            url: feed.ws_url.clone(),
            initial_reconnect_delay: Duration::from_millis(feed.initial_reconnect_delay_ms),
            max_reconnect_delay: Duration::from_millis(feed.max_reconnect_delay_ms),
            ping_interval: Duration::from_secs(feed.ping_interval_secs.max(1)),
        }
    }
}

/// Errors from the feed connection.
#[derive(Debug, Error)]
pub enum WebSocketError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct SubscriptionMessage<'a> {
    assets_ids: &'a [String],
    #[serde(rename = "type")]
    msg_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct PriceLevel {
    price: String,
    size: String,
}

#[derive(Debug, Deserialize)]
struct BookMessage {
    asset_id: String,
    #[serde(default)]
    bids: Vec<PriceLevel>,
    #[serde(default)]
    asks: Vec<PriceLevel>,
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PriceChangeMessage {
    #[serde(default)]
    price_changes: Vec<PriceChange>,
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PriceChange {
    asset_id: String,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    side: Option<String>,
    #[serde(default)]
    best_bid: Option<String>,
    #[serde(default)]
    best_ask: Option<String>,
    #[serde(default)]
    bid_size: Option<String>,
    #[serde(default)]
    ask_size: Option<String>,
}

// ============================================================================
// Feed State
// ============================================================================

/// Best prices and sizes for one token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopOfBook {
    pub best_bid: Decimal,
    pub bid_size: Decimal,
    pub best_ask: Decimal,
    pub ask_size: Decimal,
}

#[derive(Debug, Clone)]
struct TrackedToken {
    symbol: String,
    side: MarketSide,
    top: TopOfBook,
}

/// Tokens subscribed for the current window and their last known tops.
#[derive(Debug, Clone, Default)]
pub struct FeedState {
    tokens: HashMap<String, TrackedToken>,
}

impl FeedState {
    #[must_use]
    pub fn new(markets: &[UpDownMarket]) -> Self {
        let mut tokens = HashMap::new();
        for market in markets {
            for side in [MarketSide::Up, MarketSide::Down] {
                tokens.insert(
                    market.token_id(side).to_string(),
                    TrackedToken {
                        symbol: market.symbol.clone(),
                        side,
                        top: TopOfBook::default(),
                    },
                );
            }
        }
        Self { tokens }
    }

    /// Subscribed token ids, sorted.
    #[must_use]
    pub fn token_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tokens.keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[must_use]
    pub fn top_of_book(&self, token_id: &str) -> Option<TopOfBook> {
        self.tokens.get(token_id).map(|t| t.top)
    }

    /// Applies one text frame and returns a snapshot per token it touched.
    ///
    /// Frames may hold a single event object or an array of them. Events for
    /// unknown tokens and unknown event types are skipped. `received_at_ms`
    /// stands in for the capture time when the event carries no timestamp.
    pub fn apply(
        &mut self,
        text: &str,
        received_at_ms: i64,
    ) -> Result<Vec<TickerSnapshot>, WebSocketError> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("PONG") {
            return Ok(Vec::new());
        }

        let value: serde_json::Value = serde_json::from_str(trimmed)?;
        let events = match value {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };

        let mut out = Vec::new();
        for event in events {
            let event_type = event
                .get("event_type")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            match event_type.as_str() {
                "book" => {
                    let book: BookMessage = serde_json::from_value(event)?;
                    out.extend(self.apply_book(&book, received_at_ms));
                }
                "price_change" => {
                    let change: PriceChangeMessage = serde_json::from_value(event)?;
                    out.extend(self.apply_price_change(&change, received_at_ms));
                }
                other => debug!(event_type = other, "Ignoring market event"),
            }
        }
        Ok(out)
    }

    fn apply_book(&mut self, book: &BookMessage, received_at_ms: i64) -> Option<TickerSnapshot> {
        let token = self.tokens.get_mut(&book.asset_id)?;

        let (best_bid, bid_size) = best_level(&book.bids, |candidate, best| candidate > best);
        let (best_ask, ask_size) = best_level(&book.asks, |candidate, best| candidate < best);
        token.top = TopOfBook {
            best_bid,
            bid_size,
            best_ask,
            ask_size,
        };

        let captured_at_ms = message_ts(book.timestamp.as_ref()).unwrap_or(received_at_ms);
        Some(snapshot(&book.asset_id, token, captured_at_ms))
    }

    fn apply_price_change(
        &mut self,
        message: &PriceChangeMessage,
        received_at_ms: i64,
    ) -> Vec<TickerSnapshot> {
        let captured_at_ms = message_ts(message.timestamp.as_ref()).unwrap_or(received_at_ms);
        let mut out = Vec::new();

        for change in &message.price_changes {
            let Some(token) = self.tokens.get_mut(&change.asset_id) else {
                continue;
            };
            let prev = token.top;

            let best_bid = positive(change.best_bid.as_deref()).unwrap_or(prev.best_bid);
            let best_ask = positive(change.best_ask.as_deref()).unwrap_or(prev.best_ask);

            // A level update at the new best price carries that level's size.
            let level_price = positive(change.price.as_deref());
            let level_size = positive(change.size.as_deref());
            let level_side = change.side.as_deref().map(str::to_uppercase);
            let level_size_at = |side: &str, best: Decimal| match (&level_side, level_price) {
                (Some(s), Some(p)) if s == side && p == best => level_size,
                _ => None,
            };

            let bid_size = positive(change.bid_size.as_deref())
                .or_else(|| level_size_at("BUY", best_bid))
                .unwrap_or(prev.bid_size);
            let ask_size = positive(change.ask_size.as_deref())
                .or_else(|| level_size_at("SELL", best_ask))
                .unwrap_or(prev.ask_size);

            token.top = TopOfBook {
                best_bid,
                bid_size,
                best_ask,
                ask_size,
            };
            out.push(snapshot(&change.asset_id, token, captured_at_ms));
        }
        out
    }
}

fn snapshot(token_id: &str, token: &TrackedToken, captured_at_ms: i64) -> TickerSnapshot {
    TickerSnapshot {
        symbol: token.symbol.clone(),
        side: token.side,
        best_bid: token.top.best_bid,
        best_ask: token.top.best_ask,
        bid_size: token.top.bid_size,
        ask_size: token.top.ask_size,
        token_id: token_id.to_string(),
        captured_at_ms,
    }
}

/// Picks the best level among those with positive price and size.
/// Returns zeros when no level qualifies.
fn best_level(
    levels: &[PriceLevel],
    better: impl Fn(Decimal, Decimal) -> bool,
) -> (Decimal, Decimal) {
    let mut best: Option<(Decimal, Decimal)> = None;
    for level in levels {
        let price = parse_decimal(&level.price);
        let size = parse_decimal(&level.size);
        if price <= Decimal::ZERO || size <= Decimal::ZERO {
            continue;
        }
        match best {
            Some((p, _)) if !better(price, p) => {}
            _ => best = Some((price, size)),
        }
    }
    best.unwrap_or((Decimal::ZERO, Decimal::ZERO))
}

fn positive(raw: Option<&str>) -> Option<Decimal> {
    raw.map(parse_decimal).filter(|d| *d > Decimal::ZERO)
}

fn message_ts(value: Option<&serde_json::Value>) -> Option<i64> {
    match value? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Parse a decimal, accepting the exchange's `.48` form.
fn parse_decimal(s: &str) -> Decimal {
    let s = s.trim();
    let normalized = if s.starts_with('.') {
        format!("0{s}")
    } else {
        s.to_string()
    };
    Decimal::from_str(&normalized).unwrap_or(Decimal::ZERO)
}

// ============================================================================
// Ticker Feed
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamExit {
    Rollover,
    Stopped,
}

/// Streams top of book for the configured symbols into the snapshot store.
pub struct TickerFeed {
    config: WebSocketConfig,
    gamma: GammaClient,
    symbols: Vec<String>,
    store: Arc<InMemorySnapshotStore>,
    keys: SnapshotKeys,
    should_stop: Arc<AtomicBool>,
}

impl TickerFeed {
    #[must_use]
    pub fn new(
        config: WebSocketConfig,
        gamma: GammaClient,
        symbols: Vec<String>,
        store: Arc<InMemorySnapshotStore>,
        keys: SnapshotKeys,
    ) -> Self {
        Self {
            config,
            gamma,
            symbols,
            store,
            keys,
            should_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_stop_handle(mut self, stop: Arc<AtomicBool>) -> Self {
        self.should_stop = stop;
        self
    }

    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.should_stop)
    }

    fn stopped(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }

    /// Runs until the stop handle is set, rediscovering markets each window.
    pub async fn run(self) {
        let mut reconnect_delay = self.config.initial_reconnect_delay;

        while !self.stopped() {
            let markets = self.gamma.find_markets(&self.symbols, Utc::now()).await;
            let Some(window_end) = markets.iter().map(UpDownMarket::window_end).min() else {
                warn!(delay = ?reconnect_delay, "No markets resolved, retrying");
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(self.config.max_reconnect_delay);
                continue;
            };
            if markets.len() < self.symbols.len() {
                warn!(
                    resolved = markets.len(),
                    wanted = self.symbols.len(),
                    "Some symbols have no market this window"
                );
            }

            let remaining = (window_end - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            let deadline = Instant::now() + remaining;
            let mut state = FeedState::new(&markets);

            loop {
                info!(url = %self.config.url, tokens = state.token_ids().len(), "Connecting to market channel");
                match self.stream_until(&mut state, deadline).await {
                    Ok(StreamExit::Stopped) => {
                        info!("Ticker feed stopped");
                        return;
                    }
                    Ok(StreamExit::Rollover) => {
                        info!("Market window rolled over, rediscovering markets");
                        reconnect_delay = self.config.initial_reconnect_delay;
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Market channel connection failed");
                        let left = deadline.saturating_duration_since(Instant::now());
                        if left.is_zero() {
                            break;
                        }
                        info!(delay = ?reconnect_delay, "Waiting before reconnect");
                        sleep(reconnect_delay.min(left)).await;
                        reconnect_delay = (reconnect_delay * 2).min(self.config.max_reconnect_delay);
                        if self.stopped() {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Streams one connection until `deadline`, the stop flag, or an error.
    async fn stream_until(
        &self,
        state: &mut FeedState,
        deadline: Instant,
    ) -> Result<StreamExit, WebSocketError> {
        let (ws_stream, _response) = connect_async(&self.config.url)
            .await
            .map_err(|e| WebSocketError::ConnectionFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        let token_ids = state.token_ids();
        let sub_msg = SubscriptionMessage {
            assets_ids: &token_ids,
            msg_type: "market",
        };
        let sub_json = serde_json::to_string(&sub_msg)?;
        debug!(message = %sub_json, "Sending subscription message");
        write.send(Message::Text(sub_json)).await?;

        let mut ping_interval = tokio::time::interval(self.config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stop_check = tokio::time::interval(STOP_CHECK_INTERVAL);
        let rollover = tokio::time::sleep_until(deadline);
        tokio::pin!(rollover);

        loop {
            tokio::select! {
                _ = &mut rollover => {
                    let _ = write.close().await;
                    return Ok(StreamExit::Rollover);
                }

                _ = stop_check.tick() => {
                    if self.stopped() {
                        let _ = write.close().await;
                        return Ok(StreamExit::Stopped);
                    }
                }

                _ = ping_interval.tick() => {
                    if let Err(e) = write.send(Message::Text("PING".to_string())).await {
                        warn!(error = %e, "Failed to send ping");
                        return Err(WebSocketError::WebSocket(e));
                    }
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(state, &text),
                        Some(Ok(Message::Binary(data))) => {
                            if let Ok(text) = String::from_utf8(data) {
                                self.handle_text(state, &text);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            info!(frame = ?frame, "Received close frame");
                            return Err(WebSocketError::ConnectionFailed(
                                frame.map(|f| f.reason.to_string()).unwrap_or_else(|| "Connection closed".to_string())
                            ));
                        }
                        Some(Err(e)) => return Err(WebSocketError::WebSocket(e)),
                        None => {
                            return Err(WebSocketError::ConnectionFailed("Stream ended".to_string()));
                        }
                    }
                }
            }
        }
    }

    fn handle_text(&self, state: &mut FeedState, text: &str) {
        let snapshots = match state.apply(text, Utc::now().timestamp_millis()) {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!(error = %e, "Failed to process market message");
                return;
            }
        };

        for snap in snapshots {
            let key = self.keys.key(&snap.symbol, snap.side);
            if let Err(e) = self.store.put_snapshot(&key, &snap) {
                warn!(key = %key, error = %e, "Failed to store snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::snapshot_store::SnapshotStore;
    use chrono::DateTime;
    use rust_decimal_macros::dec;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn btc_market() -> UpDownMarket {
        UpDownMarket {
            symbol: "BTC".to_string(),
            slug: "btc-updown-15m-0".to_string(),
            condition_id: "0xbtc".to_string(),
            up_token_id: "tok-up".to_string(),
            down_token_id: "tok-down".to_string(),
            window_start: DateTime::from_timestamp(0, 0).unwrap(),
        }
    }

    // ==================== Parsing Tests ====================

    #[test]
    fn test_parse_decimal_formats() {
        assert_eq!(parse_decimal("0.48"), dec!(0.48));
        assert_eq!(parse_decimal(".48"), dec!(0.48));
        assert_eq!(parse_decimal(" 100 "), dec!(100));
        assert_eq!(parse_decimal("invalid"), Decimal::ZERO);
    }

    #[test]
    fn test_config_from_feed_config() {
        let feed = FeedConfig {
            ws_url: "ws://localhost:9999".to_string(),
            initial_reconnect_delay_ms: 250,
            max_reconnect_delay_ms: 4000,
            ping_interval_secs: 0,
            ..FeedConfig::default()
        };
        let config = WebSocketConfig::from(&feed);
        assert_eq!(config.url, "ws://localhost:9999");
        assert_eq!(config.initial_reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.max_reconnect_delay, Duration::from_millis(4000));
        assert_eq!(config.ping_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_subscription_message_serialization() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let json = serde_json::to_string(&SubscriptionMessage {
            assets_ids: &ids,
            msg_type: "market",
        })
        .unwrap();
        assert_eq!(json, r#"{"assets_ids":["a","b"],"type":"market"}"#);
    }

    // ==================== Feed State Tests ====================

    #[test]
    fn test_book_picks_best_levels() {
        let mut state = FeedState::new(&[btc_market()]);
        let msg = r#"{"event_type":"book","asset_id":"tok-up",
            "bids":[{"price":".46","size":"50"},{"price":".47","size":"120"},{"price":".49","size":"0"}],
            "asks":[{"price":".50","size":"30"},{"price":".48","size":"100"},{"price":"0","size":"9"}],
            "timestamp":"1700000000000"}"#;

        let snaps = state.apply(msg, 1).unwrap();
        assert_eq!(snaps.len(), 1);
        let snap = &snaps[0];
        assert_eq!(snap.symbol, "BTC");
        assert_eq!(snap.side, MarketSide::Up);
        assert_eq!(snap.best_bid, dec!(0.47));
        assert_eq!(snap.bid_size, dec!(120));
        assert_eq!(snap.best_ask, dec!(0.48));
        assert_eq!(snap.ask_size, dec!(100));
        assert_eq!(snap.token_id, "tok-up");
        assert_eq!(snap.captured_at_ms, 1_700_000_000_000);
    }

    #[test]
    fn test_book_with_empty_side_is_zero() {
        let mut state = FeedState::new(&[btc_market()]);
        let msg = r#"{"event_type":"book","asset_id":"tok-down","bids":[],
            "asks":[{"price":".52","size":"10"}]}"#;

        let snaps = state.apply(msg, 42).unwrap();
        assert_eq!(snaps[0].best_bid, Decimal::ZERO);
        assert_eq!(snaps[0].bid_size, Decimal::ZERO);
        assert_eq!(snaps[0].best_ask, dec!(0.52));
        // No timestamp on the event: receive time is used.
        assert_eq!(snaps[0].captured_at_ms, 42);
    }

    #[test]
    fn test_price_change_carries_forward() {
        let mut state = FeedState::new(&[btc_market()]);
        state
            .apply(
                r#"{"event_type":"book","asset_id":"tok-up",
                "bids":[{"price":".47","size":"120"}],"asks":[{"price":".48","size":"100"}]}"#,
                1,
            )
            .unwrap();

        // New best ask at a level this change updates; bid untouched.
        let msg = r#"{"event_type":"price_change","timestamp":"1700000000500","price_changes":[
            {"asset_id":"tok-up","price":".49","size":"70","side":"SELL","best_bid":"0","best_ask":".49"}]}"#;
        let snaps = state.apply(msg, 2).unwrap();

        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].best_bid, dec!(0.47));
        assert_eq!(snaps[0].bid_size, dec!(120));
        assert_eq!(snaps[0].best_ask, dec!(0.49));
        assert_eq!(snaps[0].ask_size, dec!(70));
        assert_eq!(snaps[0].captured_at_ms, 1_700_000_000_500);

        // Change away from the best level keeps the previous sizes.
        let msg = r#"{"event_type":"price_change","price_changes":[
            {"asset_id":"tok-up","price":".40","size":"5","side":"BUY","best_bid":".47","best_ask":".49"}]}"#;
        let snaps = state.apply(msg, 3).unwrap();
        assert_eq!(snaps[0].bid_size, dec!(120));
        assert_eq!(snaps[0].ask_size, dec!(70));
        assert_eq!(
            state.top_of_book("tok-up").unwrap().best_ask,
            dec!(0.49)
        );
    }

    #[test]
    fn test_explicit_sizes_win() {
        let mut state = FeedState::new(&[btc_market()]);
        let msg = r#"{"event_type":"price_change","price_changes":[
            {"asset_id":"tok-down","best_bid":".50","bid_size":"11","best_ask":".51","ask_size":"12"}]}"#;
        let snaps = state.apply(msg, 5).unwrap();
        assert_eq!(snaps[0].side, MarketSide::Down);
        assert_eq!(snaps[0].bid_size, dec!(11));
        assert_eq!(snaps[0].ask_size, dec!(12));
    }

    #[test]
    fn test_array_frames_and_unknown_tokens() {
        let mut state = FeedState::new(&[btc_market()]);
        let msg = r#"[
            {"event_type":"book","asset_id":"tok-up","bids":[],"asks":[]},
            {"event_type":"book","asset_id":"someone-else","bids":[],"asks":[]},
            {"event_type":"last_trade_price","asset_id":"tok-up"}
        ]"#;
        let snaps = state.apply(msg, 1).unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].token_id, "tok-up");
    }

    #[test]
    fn test_pong_and_garbage() {
        let mut state = FeedState::new(&[btc_market()]);
        assert!(state.apply("PONG", 1).unwrap().is_empty());
        assert!(matches!(
            state.apply("not json", 1),
            Err(WebSocketError::Parse(_))
        ));
    }

    #[test]
    fn test_token_ids_sorted() {
        let state = FeedState::new(&[btc_market()]);
        assert_eq!(state.token_ids(), vec!["tok-down", "tok-up"]);
        assert!(!state.is_empty());
        assert!(FeedState::default().is_empty());
    }

    // ==================== Mock Server Tests ====================

    /// Accepts one connection, reports the subscription text, sends `frames`
    /// and then holds the connection open.
    struct MockWebSocketServer {
        addr: SocketAddr,
        subscription: Option<oneshot::Receiver<String>>,
    }

    impl MockWebSocketServer {
        async fn start(frames: Vec<String>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (sub_tx, sub_rx) = oneshot::channel();

            tokio::spawn(async move {
                if let Ok((stream, _)) = listener.accept().await {
                    let ws_stream = tokio_tungstenite::accept_async(stream).await.unwrap();
                    let (mut write, mut read) = ws_stream.split();

                    if let Some(Ok(Message::Text(sub))) = read.next().await {
                        let _ = sub_tx.send(sub);
                        for frame in frames {
                            let _ = write.send(Message::Text(frame)).await;
                        }
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            });

            Self {
                addr,
                subscription: Some(sub_rx),
            }
        }

        fn url(&self) -> String {
            format!("ws://{}", self.addr)
        }
    }

    fn feed_for(url: String, store: Arc<InMemorySnapshotStore>) -> TickerFeed {
        let config = WebSocketConfig {
            url,
            ..WebSocketConfig::default()
        };
        TickerFeed::new(
            config,
            GammaClient::new(),
            vec!["BTC".to_string()],
            store,
            SnapshotKeys::default(),
        )
    }

    #[tokio::test]
    async fn test_stream_writes_snapshots_until_rollover() {
        let frames = vec![
            r#"{"event_type":"book","asset_id":"tok-up","bids":[{"price":".47","size":"120"}],
                "asks":[{"price":".48","size":"100"}],"timestamp":"1700000000000"}"#
                .to_string(),
            r#"{"event_type":"book","asset_id":"tok-down","bids":[{"price":".49","size":"60"}],
                "asks":[{"price":".50","size":"80"}],"timestamp":"1700000000001"}"#
                .to_string(),
        ];
        let mut server = MockWebSocketServer::start(frames).await;
        let store = Arc::new(InMemorySnapshotStore::new());
        let feed = feed_for(server.url(), Arc::clone(&store));
        let mut state = FeedState::new(&[btc_market()]);

        let deadline = Instant::now() + Duration::from_millis(500);
        let exit = feed.stream_until(&mut state, deadline).await.unwrap();
        assert_eq!(exit, StreamExit::Rollover);

        let sub = server.subscription.take().unwrap().await.unwrap();
        assert!(sub.contains("tok-up"));
        assert!(sub.contains("tok-down"));
        assert!(sub.contains(r#""type":"market""#));

        let keys = SnapshotKeys::default();
        let up = store.get(&keys.key("BTC", MarketSide::Up)).unwrap().unwrap();
        let up = TickerSnapshot::from_json("BTC", MarketSide::Up, &up)
            .unwrap()
            .unwrap();
        assert_eq!(up.best_ask, dec!(0.48));
        assert_eq!(up.ask_size, dec!(100));

        let down = store.get(&keys.key("BTC", MarketSide::Down)).unwrap().unwrap();
        let down = TickerSnapshot::from_json("BTC", MarketSide::Down, &down)
            .unwrap()
            .unwrap();
        assert_eq!(down.best_bid, dec!(0.49));
        assert_eq!(down.token_id, "tok-down");
        assert_eq!(down.captured_at_ms, 1_700_000_000_001);
    }

    #[tokio::test]
    async fn test_stream_honors_stop_flag() {
        let server = MockWebSocketServer::start(vec![]).await;
        let store = Arc::new(InMemorySnapshotStore::new());
        let feed = feed_for(server.url(), store);
        feed.stop_handle().store(true, Ordering::SeqCst);
        let mut state = FeedState::new(&[btc_market()]);

        let deadline = Instant::now() + Duration::from_secs(30);
        let exit = tokio::time::timeout(
            Duration::from_secs(5),
            feed.stream_until(&mut state, deadline),
        )
        .await
        .expect("stream did not stop")
        .unwrap();
        assert_eq!(exit, StreamExit::Stopped);
    }

    #[tokio::test]
    async fn test_stream_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let feed = feed_for(format!("ws://{addr}"), Arc::new(InMemorySnapshotStore::new()));
        let mut state = FeedState::new(&[btc_market()]);
        let err = feed
            .stream_until(&mut state, Instant::now() + Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, WebSocketError::ConnectionFailed(_)));
    }
}
