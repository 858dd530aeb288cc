//! One task per symbol, kept alive for the life of the process.
//!
//! The supervisor spawns a [`SymbolMonitor`] per [`MonitorConfig`], logs a
//! status line per symbol on a fixed interval, and respawns any monitor task
//! that exits while the process is still running. Monitors share nothing but
//! the read-only snapshot store and the placement capability.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use updown_arb_core::MonitorConfig;

use super::monitor::{MonitorDeps, MonitorStats, SymbolMonitor};

/// How often finished tasks and the stop flag are checked.
const WATCHDOG_INTERVAL: Duration = Duration::from_millis(500);

/// Grace period for monitors to finish their current tick on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct MonitorUnit {
    config: MonitorConfig,
    stats: Arc<MonitorStats>,
    handle: JoinHandle<()>,
    restarts: u32,
}

/// Starts and watches one monitor per configured symbol.
pub struct MonitorSupervisor {
    configs: Vec<MonitorConfig>,
    deps: MonitorDeps,
    stats: Vec<Arc<MonitorStats>>,
    status_interval: Duration,
    should_stop: Arc<AtomicBool>,
}

impl MonitorSupervisor {
    /// Later configs for a symbol that is already present are dropped, so a
    /// symbol never runs two monitors.
    #[must_use]
    pub fn new(configs: Vec<MonitorConfig>, deps: MonitorDeps) -> Self {
        let mut seen = HashSet::new();
        let configs: Vec<MonitorConfig> = configs
            .into_iter()
            .filter(|c| {
                let fresh = seen.insert(c.symbol.clone());
                if !fresh {
                    warn!(symbol = %c.symbol, "Duplicate monitor config ignored");
                }
                fresh
            })
            .collect();
        let stats = configs
            .iter()
            .map(|c| Arc::new(MonitorStats::new(c.symbol.clone())))
            .collect();

        Self {
            configs,
            deps,
            stats,
            status_interval: Duration::from_secs(30),
            should_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval.max(Duration::from_millis(100));
        self
    }

    /// Flag that stops every monitor and then the supervisor itself.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.should_stop)
    }

    /// Stats handles in config order. Valid before, during and after `run`.
    #[must_use]
    pub fn stats(&self) -> Vec<Arc<MonitorStats>> {
        self.stats.clone()
    }

    fn spawn_monitor(&self, config: &MonitorConfig, stats: &Arc<MonitorStats>) -> JoinHandle<()> {
        let monitor = SymbolMonitor::new(config.clone(), &self.deps)
            .with_stats(Arc::clone(stats))
            .with_stop_handle(Arc::clone(&self.should_stop));
        tokio::spawn(monitor.run())
    }

    /// Runs until the stop handle is set.
    pub async fn run(self) {
        let mut units: Vec<MonitorUnit> = self
            .configs
            .iter()
            .zip(self.stats.iter())
            .map(|(config, stats)| MonitorUnit {
                config: config.clone(),
                stats: Arc::clone(stats),
                handle: self.spawn_monitor(config, stats),
                restarts: 0,
            })
            .collect();

        info!(
            monitors = units.len(),
            placer = self.deps.placer.name(),
            "Monitor supervisor started"
        );

        let mut status = tokio::time::interval(self.status_interval);
        status.tick().await;
        let mut watchdog = tokio::time::interval(WATCHDOG_INTERVAL);

        loop {
            tokio::select! {
                _ = status.tick() => log_status(&units),
                _ = watchdog.tick() => {
                    if self.should_stop.load(Ordering::SeqCst) {
                        break;
                    }
                    self.respawn_finished(&mut units).await;
                }
            }
        }

        info!("Stopping monitors");
        for unit in units {
            let symbol = unit.config.symbol.clone();
            if tokio::time::timeout(SHUTDOWN_GRACE, unit.handle).await.is_err() {
                warn!(symbol = %symbol, "Monitor did not stop within grace period");
            }
        }
        info!("Monitor supervisor stopped");
    }

    async fn respawn_finished(&self, units: &mut [MonitorUnit]) {
        for unit in units.iter_mut() {
            if !unit.handle.is_finished() {
                continue;
            }
            if self.should_stop.load(Ordering::SeqCst) {
                return;
            }

            let reason = match (&mut unit.handle).await {
                Ok(()) => "exited".to_string(),
                Err(e) => e.to_string(),
            };
            unit.restarts += 1;
            error!(
                symbol = %unit.config.symbol,
                reason = %reason,
                restarts = unit.restarts,
                "Monitor task ended unexpectedly, restarting"
            );
            unit.handle = self.spawn_monitor(&unit.config, &unit.stats);
        }
    }
}

fn log_status(units: &[MonitorUnit]) {
    for unit in units {
        let s = unit.stats.snapshot();
        info!(
            symbol = %s.symbol,
            state = %s.state,
            ticks = s.ticks,
            quiet = s.quiet_ticks,
            missing_data = s.missing_data_ticks,
            opportunities = s.opportunities,
            both_ok = s.both_ok,
            buy_ok_sell_fail = s.buy_ok_sell_fail,
            sell_ok_buy_fail = s.sell_ok_buy_fail,
            both_failed = s.both_failed,
            loop_faults = s.loop_faults,
            restarts = unit.restarts,
            net_position = ?s.net_positions,
            "Monitor status"
        );
    }
}
