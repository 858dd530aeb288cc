//! Integration tests for the parity arbitrage pipeline.
//!
//! These tests drive the full path a live process takes:
//! - feed messages folded into top-of-book snapshots and written to the store
//! - the freshness gate and parity evaluation reading them back
//! - concurrent two-leg placement and joint outcome classification
//! - net position bookkeeping per contract

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use updown_arb_core::{MonitorConfig, MonitorDefaults};
use updown_arb_polymarket::arbitrage::{
    ExecutionError, InMemorySnapshotStore, JointExecutionOutcome, LegFault, LegOrder,
    MarketSide, MonitorDeps, OrderPlacer, PaperOrderPlacer, PlaceOrderResponse, QuietWindow, Side,
    SnapshotKeys, SymbolMonitor, TickOutcome, TickerSnapshot,
};
use updown_arb_polymarket::{FeedState, UpDownMarket};

// =============================================================================
// Helper Functions
// =============================================================================

/// Seven minutes into a window, well clear of the settlement boundary.
fn mid_window() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 31, 12, 7, 0).unwrap()
}

#[allow(clippy::too_many_arguments)]
fn snapshot(
    symbol: &str,
    side: MarketSide,
    bid: Decimal,
    bid_size: Decimal,
    ask: Decimal,
    ask_size: Decimal,
    captured_at_ms: i64,
) -> TickerSnapshot {
    TickerSnapshot {
        symbol: symbol.to_string(),
        side,
        best_bid: bid,
        best_ask: ask,
        bid_size,
        ask_size,
        token_id: format!("{}-{}", symbol.to_lowercase(), side),
        captured_at_ms,
    }
}

fn seed(store: &InMemorySnapshotStore, snap: &TickerSnapshot) {
    let key = SnapshotKeys::default().key(&snap.symbol, snap.side);
    store.put_snapshot(&key, snap).unwrap();
}

fn monitor_for(
    symbol: &str,
    store: Arc<InMemorySnapshotStore>,
    placer: Arc<dyn OrderPlacer>,
) -> SymbolMonitor {
    let deps = MonitorDeps::new(store, placer, SnapshotKeys::default(), QuietWindow::default());
    SymbolMonitor::new(
        MonitorConfig::from_defaults(symbol, &MonitorDefaults::default()),
        &deps,
    )
}

/// Rejects the UP leg by raising, accepts everything else.
struct UpLegRaises;

#[async_trait]
impl OrderPlacer for UpLegRaises {
    async fn place_order(&self, order: LegOrder) -> Result<PlaceOrderResponse, ExecutionError> {
        if order.market.ends_with("-up") {
            Err(ExecutionError::Http("connection reset".to_string()))
        } else {
            Ok(PlaceOrderResponse::accepted())
        }
    }

    fn name(&self) -> &str {
        "up-leg-raises"
    }
}

// =============================================================================
// Detection And Execution
// =============================================================================

#[tokio::test]
async fn test_buy_parity_executes_both_legs() {
    let now = mid_window();
    let ts = now.timestamp_millis() - 100;
    let store = Arc::new(InMemorySnapshotStore::new());
    seed(&store, &snapshot("BTC", MarketSide::Up, dec!(0.46), dec!(10), dec!(0.48), dec!(100), ts));
    seed(&store, &snapshot("BTC", MarketSide::Down, dec!(0.49), dec!(10), dec!(0.50), dec!(80), ts));

    let placer = Arc::new(PaperOrderPlacer::default());
    let mut monitor = monitor_for("BTC", store, placer.clone());

    let TickOutcome::Executed(report) = monitor.tick_at(now).await.unwrap() else {
        panic!("expected an execution");
    };

    assert_eq!(report.opportunity.direction, Side::Buy);
    assert_eq!(report.opportunity.size, dec!(80));
    assert_eq!(report.opportunity.edge, dec!(0.02));
    assert_eq!(report.outcome, JointExecutionOutcome::BothOk);
    assert_eq!(report.imbalance(), Decimal::ZERO);

    let history = placer.history();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|r| r.accepted && r.order.side == Side::Buy));

    assert_eq!(monitor.gauge().net("BTC_up"), dec!(80));
    assert_eq!(monitor.gauge().net("BTC_down"), dec!(80));
    assert_eq!(monitor.stats().snapshot().both_ok, 1);
}

#[tokio::test]
async fn test_sell_parity_executes_both_legs() {
    let now = mid_window();
    let ts = now.timestamp_millis() - 50;
    let store = Arc::new(InMemorySnapshotStore::new());
    seed(&store, &snapshot("ETH", MarketSide::Up, dec!(0.52), dec!(50), dec!(0.60), dec!(5), ts));
    seed(&store, &snapshot("ETH", MarketSide::Down, dec!(0.51), dec!(60), dec!(0.59), dec!(5), ts));

    let placer = Arc::new(PaperOrderPlacer::default());
    let mut monitor = monitor_for("ETH", store, placer.clone());

    let TickOutcome::Executed(report) = monitor.tick_at(now).await.unwrap() else {
        panic!("expected an execution");
    };

    assert_eq!(report.opportunity.direction, Side::Sell);
    assert_eq!(report.opportunity.size, dec!(50));
    assert_eq!(report.opportunity.buy_leg_price, dec!(0.52));
    assert_eq!(report.opportunity.sell_leg_price, dec!(0.51));
    assert_eq!(report.outcome, JointExecutionOutcome::BothOk);

    assert_eq!(monitor.gauge().net("ETH_up"), dec!(-50));
    assert_eq!(monitor.gauge().net("ETH_down"), dec!(-50));
}

#[tokio::test]
async fn test_stale_side_blocks_evaluation() {
    let now = mid_window();
    let store = Arc::new(InMemorySnapshotStore::new());
    let fresh = now.timestamp_millis() - 100;
    let stale = now.timestamp_millis() - 2000;
    seed(&store, &snapshot("BTC", MarketSide::Up, dec!(0.46), dec!(10), dec!(0.48), dec!(100), fresh));
    seed(&store, &snapshot("BTC", MarketSide::Down, dec!(0.49), dec!(10), dec!(0.50), dec!(80), stale));

    let placer = Arc::new(PaperOrderPlacer::default());
    let mut monitor = monitor_for("BTC", store, placer.clone());

    let outcome = monitor.tick_at(now).await.unwrap();
    assert!(matches!(outcome, TickOutcome::MissingData));
    assert_eq!(placer.order_count(), 0);
    assert!(monitor.last_known_good(MarketSide::Up).is_some());
    assert!(monitor.last_known_good(MarketSide::Down).is_none());
}

#[tokio::test]
async fn test_raised_buy_leg_requires_hedge() {
    let now = mid_window();
    let ts = now.timestamp_millis() - 100;
    let store = Arc::new(InMemorySnapshotStore::new());
    seed(&store, &snapshot("SOL", MarketSide::Up, dec!(0.46), dec!(10), dec!(0.48), dec!(100), ts));
    seed(&store, &snapshot("SOL", MarketSide::Down, dec!(0.49), dec!(10), dec!(0.50), dec!(80), ts));

    let mut monitor = monitor_for("SOL", store, Arc::new(UpLegRaises));

    let TickOutcome::Executed(report) = monitor.tick_at(now).await.unwrap() else {
        panic!("expected an execution");
    };

    assert_eq!(report.outcome, JointExecutionOutcome::SellOkBuyFail);
    assert!(report.outcome.is_hedge_required());
    assert!(matches!(report.buy.error, Some(LegFault::Placement(_))));
    assert!(report.sell.ok);
    assert_eq!(report.imbalance(), dec!(80));

    assert!(monitor.gauge().net("SOL_up").is_zero());
    assert_eq!(monitor.gauge().net("SOL_down"), dec!(80));
    assert_eq!(monitor.stats().snapshot().hedges_required(), 1);
}

#[tokio::test]
async fn test_quiet_window_skips_reads() {
    let near_boundary = Utc.with_ymd_and_hms(2026, 1, 31, 12, 14, 30).unwrap();
    let store = Arc::new(InMemorySnapshotStore::new());
    // Garbage would fail the tick if the store were read.
    store.put(SnapshotKeys::default().key("BTC", MarketSide::Up), "garbage");

    let mut monitor = monitor_for("BTC", store, Arc::new(PaperOrderPlacer::default()));
    let outcome = monitor.tick_at(near_boundary).await.unwrap();
    assert!(matches!(outcome, TickOutcome::Quiet));
}

// =============================================================================
// Feed To Execution
// =============================================================================

#[tokio::test]
async fn test_feed_messages_drive_an_execution() {
    let now = mid_window();
    let market = UpDownMarket {
        symbol: "XRP".to_string(),
        slug: "xrp-updown-15m-0".to_string(),
        condition_id: "0xxrp".to_string(),
        up_token_id: "xrp-up".to_string(),
        down_token_id: "xrp-down".to_string(),
        window_start: Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap(),
    };
    let mut feed = FeedState::new(&[market]);
    let ts = now.timestamp_millis() - 20;
    let frame = format!(
        r#"[
        {{"event_type":"book","asset_id":"xrp-up","timestamp":"{ts}",
          "bids":[{{"price":".45","size":"40"}}],"asks":[{{"price":".47","size":"30"}}]}},
        {{"event_type":"book","asset_id":"xrp-down","timestamp":"{ts}",
          "bids":[{{"price":".48","size":"40"}}],"asks":[{{"price":".50","size":"25"}}]}}
        ]"#
    );

    let store = Arc::new(InMemorySnapshotStore::new());
    for snap in feed.apply(&frame, ts).unwrap() {
        seed(&store, &snap);
    }
    assert_eq!(store.len(), 2);

    let placer = Arc::new(PaperOrderPlacer::default());
    let mut monitor = monitor_for("XRP", store, placer.clone());

    let TickOutcome::Executed(report) = monitor.tick_at(now).await.unwrap() else {
        panic!("expected an execution");
    };

    assert_eq!(report.opportunity.direction, Side::Buy);
    assert_eq!(report.opportunity.size, dec!(25));
    assert_eq!(report.opportunity.edge, dec!(0.03));
    assert_eq!(report.opportunity.up_token_id, "xrp-up");
    assert_eq!(report.opportunity.down_token_id, "xrp-down");

    let markets: Vec<String> = placer.history().into_iter().map(|r| r.order.market).collect();
    assert!(markets.contains(&"xrp-up".to_string()));
    assert!(markets.contains(&"xrp-down".to_string()));
}
