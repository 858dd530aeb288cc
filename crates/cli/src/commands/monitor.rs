//! CLI command that runs the ticker feed and one parity monitor per symbol.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use updown_arb_core::{AppConfig, ConfigLoader, ExecutionMode, DEFAULT_CONFIG_PATH};
use updown_arb_polymarket::arbitrage::{
    GatewayOrderPlacer, InMemorySnapshotStore, MonitorDeps, MonitorSupervisor, OrderPlacer,
    PaperOrderPlacer, PaperPlacerConfig, QuietWindow, SnapshotKeys,
};
use updown_arb_polymarket::{GammaClient, TickerFeed, WebSocketConfig};

/// How long the feed gets to close its connection after the monitors stop.
const FEED_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Arguments for the monitor command.
#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Config file path.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Symbols to monitor, comma separated (overrides the config file).
    #[arg(long, value_delimiter = ',')]
    pub symbols: Option<Vec<String>>,

    /// Place legs with the paper placer regardless of the configured mode.
    #[arg(long)]
    pub paper: bool,

    /// Do not start the market feed; monitors read whatever the store holds.
    #[arg(long)]
    pub no_feed: bool,

    /// Optional log file path (logs to file instead of stderr).
    #[arg(long)]
    pub log_file: Option<String>,
}

fn load_config(args: &MonitorArgs) -> Result<AppConfig> {
    let mut config = ConfigLoader::load_from(&args.config)?;
    if let Some(symbols) = &args.symbols {
        config.symbols.clone_from(symbols);
    }
    if args.paper {
        config.execution.mode = ExecutionMode::Paper;
    }
    config.validate()?;
    Ok(config)
}

fn build_placer(config: &AppConfig) -> Result<Arc<dyn OrderPlacer>> {
    let exec = &config.execution;
    match exec.mode {
        ExecutionMode::Paper => {
            let mut paper = PaperPlacerConfig::default()
                .with_latency_ms(exec.paper_latency_ms)
                .with_accept_rate(exec.paper_accept_rate)
                .with_history_limit(exec.paper_history_limit);
            if let Some(seed) = exec.paper_seed {
                paper = paper.with_seed(seed);
            }
            Ok(Arc::new(PaperOrderPlacer::new(paper)))
        }
        ExecutionMode::Gateway => {
            let placer = GatewayOrderPlacer::new(
                exec.gateway_url.clone(),
                Duration::from_millis(exec.request_timeout_ms),
            )
            .context("failed to build gateway client")?;
            Ok(Arc::new(placer))
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
    }
}

/// Runs the monitors until interrupted.
pub async fn run_monitor(args: MonitorArgs) -> Result<()> {
    let config = load_config(&args)?;
    let monitors = config.monitor_configs();

    info!("=== Up/Down Parity Arbitrage ===");
    info!(
        symbols = ?monitors.iter().map(|m| m.symbol.as_str()).collect::<Vec<_>>(),
        mode = ?config.execution.mode,
        feed = config.feed.enabled && !args.no_feed,
        quiet_window = config.quiet_window.enabled,
        "Starting monitors"
    );

    let store = Arc::new(InMemorySnapshotStore::new());
    let keys = SnapshotKeys::new(config.interval.clone(), config.venue.clone());
    let deps = MonitorDeps::new(
        store.clone(),
        build_placer(&config)?,
        keys.clone(),
        QuietWindow::from_config(&config.quiet_window),
    );

    let supervisor = MonitorSupervisor::new(monitors.clone(), deps)
        .with_status_interval(Duration::from_secs(config.status_interval_secs));
    let stop = supervisor.stop_handle();
    let stats = supervisor.stats();

    let feed_handle = if config.feed.enabled && !args.no_feed {
        let gamma = GammaClient::new().with_base_url(config.feed.gamma_url.clone());
        let symbols = monitors.iter().map(|m| m.symbol.clone()).collect();
        let feed = TickerFeed::new(
            WebSocketConfig::from(&config.feed),
            gamma,
            symbols,
            store,
            keys,
        )
        .with_stop_handle(stop.clone());
        Some(tokio::spawn(feed.run()))
    } else {
        None
    };

    let stop_on_signal = stop.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        stop_on_signal.store(true, Ordering::SeqCst);
    });

    supervisor.run().await;

    if let Some(mut handle) = feed_handle {
        if tokio::time::timeout(FEED_SHUTDOWN_GRACE, &mut handle).await.is_err() {
            warn!("Feed did not stop within grace period, aborting");
            handle.abort();
        }
    }

    info!("=== Session Summary ===");
    for s in stats.iter().map(|s| s.snapshot()) {
        info!(
            symbol = %s.symbol,
            ticks = s.ticks,
            opportunities = s.opportunities,
            both_ok = s.both_ok,
            hedges_required = s.hedges_required(),
            both_failed = s.both_failed,
            loop_faults = s.loop_faults,
            net_position = ?s.net_positions,
            "Monitor summary"
        );
    }

    Ok(())
}
