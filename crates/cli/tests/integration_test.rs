use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use updown_arb_core::{ConfigLoader, ExecutionMode};
use updown_arb_polymarket::arbitrage::{
    InMemorySnapshotStore, MonitorDeps, MonitorSupervisor, PaperOrderPlacer, QuietWindow,
    SnapshotKeys,
};

fn sample_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/Config.toml")
}

#[test]
fn test_sample_config_loads() {
    let config = ConfigLoader::load_file_only(sample_config_path()).expect("sample config");

    assert_eq!(config.execution.mode, ExecutionMode::Paper);
    assert!(config.quiet_window.enabled);
    assert!((config.execution.paper_accept_rate - 1.0).abs() < f64::EPSILON);
    assert_eq!(config.execution.paper_seed, None);
    assert_eq!(config.execution.paper_history_limit, 1000);

    let monitors = config.monitor_configs();
    let symbols: Vec<_> = monitors.iter().map(|m| m.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["BTC", "ETH", "SOL", "XRP"]);

    let xrp = monitors.iter().find(|m| m.symbol == "XRP").unwrap();
    assert_eq!(xrp.edge_threshold.to_string(), "0.004");
    let btc = monitors.iter().find(|m| m.symbol == "BTC").unwrap();
    assert_eq!(btc.edge_threshold.to_string(), "0.002");
}

#[tokio::test]
async fn test_supervisor_runs_sample_config_without_feed() {
    let config = ConfigLoader::load_file_only(sample_config_path()).expect("sample config");
    let deps = MonitorDeps::new(
        Arc::new(InMemorySnapshotStore::new()),
        Arc::new(PaperOrderPlacer::default()),
        SnapshotKeys::new(config.interval.clone(), config.venue.clone()),
        QuietWindow::from_config(&config.quiet_window),
    );

    let supervisor = MonitorSupervisor::new(config.monitor_configs(), deps);
    let stats = supervisor.stats();
    let stop = supervisor.stop_handle();
    let handle = tokio::spawn(supervisor.run());

    tokio::time::sleep(Duration::from_millis(300)).await;
    stop.store(true, Ordering::SeqCst);
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("supervisor did not stop")
        .unwrap();

    for s in stats.iter().map(|s| s.snapshot()) {
        assert!(s.ticks >= 1, "{} never ticked", s.symbol);
        assert_eq!(s.opportunities, 0);
        assert_eq!(s.loop_faults, 0);
    }
}
