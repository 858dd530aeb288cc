use anyhow::{bail, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Symbols to monitor, one independent loop each (e.g. "BTC").
    pub symbols: Vec<String>,
    /// Market interval tag used in snapshot keys.
    pub interval: String,
    /// Venue tag used in snapshot keys.
    pub venue: String,
    pub monitor: MonitorDefaults,
    /// Per-symbol overrides keyed by upper-case symbol.
    pub overrides: HashMap<String, MonitorOverride>,
    pub quiet_window: QuietWindowConfig,
    pub execution: ExecutionConfig,
    pub feed: FeedConfig,
    /// How often the supervisor logs a status line per symbol.
    pub status_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorDefaults {
    pub edge_threshold: Decimal,
    pub poll_interval_ms: u64,
    pub freshness_ms: u64,
    pub leg_timeout_ms: u64,
    pub recovery_delay_ms: u64,
    pub quiet_poll_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorOverride {
    pub edge_threshold: Option<Decimal>,
    pub poll_interval_ms: Option<u64>,
    pub freshness_ms: Option<u64>,
    pub leg_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuietWindowConfig {
    pub enabled: bool,
    pub period_secs: u64,
    pub before_boundary_secs: u64,
    pub after_boundary_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Paper,
    Gateway,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    pub gateway_url: String,
    pub request_timeout_ms: u64,
    pub paper_latency_ms: u64,
    /// Probability that the paper placer accepts a leg, in [0, 1].
    pub paper_accept_rate: f64,
    /// Seed for reproducible paper acceptance draws.
    pub paper_seed: Option<u64>,
    /// Number of paper legs kept in memory; older ones are dropped.
    pub paper_history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub enabled: bool,
    pub ws_url: String,
    pub gamma_url: String,
    pub ping_interval_secs: u64,
    pub initial_reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
}

/// Fully resolved settings for one symbol's monitor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub symbol: String,
    pub edge_threshold: Decimal,
    pub poll_interval_ms: u64,
    pub freshness_ms: u64,
    pub leg_timeout_ms: u64,
    pub recovery_delay_ms: u64,
    pub quiet_poll_ms: u64,
}

impl MonitorConfig {
    /// Builds a config for `symbol` from the global defaults.
    #[must_use]
    pub fn from_defaults(symbol: impl Into<String>, defaults: &MonitorDefaults) -> Self {
        Self {
            symbol: symbol.into(),
            edge_threshold: defaults.edge_threshold,
            poll_interval_ms: defaults.poll_interval_ms,
            freshness_ms: defaults.freshness_ms,
            leg_timeout_ms: defaults.leg_timeout_ms,
            recovery_delay_ms: defaults.recovery_delay_ms,
            quiet_poll_ms: defaults.quiet_poll_ms,
        }
    }

    #[must_use]
    pub fn with_override(mut self, over: &MonitorOverride) -> Self {
        if let Some(edge) = over.edge_threshold {
            self.edge_threshold = edge;
        }
        if let Some(ms) = over.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        if let Some(ms) = over.freshness_ms {
            self.freshness_ms = ms;
        }
        if let Some(ms) = over.leg_timeout_ms {
            self.leg_timeout_ms = ms;
        }
        self
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn leg_timeout(&self) -> Duration {
        Duration::from_millis(self.leg_timeout_ms)
    }

    #[must_use]
    pub const fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }

    #[must_use]
    pub const fn quiet_poll(&self) -> Duration {
        Duration::from_millis(self.quiet_poll_ms)
    }
}

impl AppConfig {
    /// Resolves one [`MonitorConfig`] per configured symbol.
    ///
    /// Symbols are upper-cased; overrides are matched case-insensitively.
    #[must_use]
    pub fn monitor_configs(&self) -> Vec<MonitorConfig> {
        self.symbols
            .iter()
            .map(|raw| {
                let symbol = raw.trim().to_uppercase();
                let base = MonitorConfig::from_defaults(symbol.clone(), &self.monitor);
                match self
                    .overrides
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(&symbol))
                {
                    Some((_, over)) => base.with_override(over),
                    None => base,
                }
            })
            .collect()
    }

    /// Rejects configurations the monitors cannot run with.
    ///
    /// Each symbol may appear once after upper-casing, so a symbol never gets
    /// two monitors.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.symbols.iter().all(|s| s.trim().is_empty()) {
            bail!("at least one symbol must be configured");
        }
        let mut seen = HashSet::new();
        for cfg in self.monitor_configs() {
            if cfg.symbol.is_empty() {
                bail!("empty symbol in symbol list");
            }
            if !seen.insert(cfg.symbol.clone()) {
                bail!("symbol {} is listed more than once", cfg.symbol);
            }
            if cfg.edge_threshold < Decimal::ZERO || cfg.edge_threshold >= Decimal::ONE {
                bail!(
                    "{}: edge_threshold {} must be in [0, 1)",
                    cfg.symbol,
                    cfg.edge_threshold
                );
            }
            if cfg.poll_interval_ms == 0 || cfg.freshness_ms == 0 || cfg.leg_timeout_ms == 0 {
                bail!(
                    "{}: poll_interval_ms, freshness_ms and leg_timeout_ms must be positive",
                    cfg.symbol
                );
            }
        }
        if self.quiet_window.enabled {
            let qw = &self.quiet_window;
            if qw.period_secs == 0 {
                bail!("quiet_window.period_secs must be positive");
            }
            let covered = qw
                .before_boundary_secs
                .checked_add(qw.after_boundary_secs)
                .unwrap_or(u64::MAX);
            if covered >= qw.period_secs {
                bail!("quiet window covers the whole period; trading would never run");
            }
        }
        if self.execution.mode == ExecutionMode::Gateway && self.execution.gateway_url.is_empty() {
            bail!("execution.gateway_url is required in gateway mode");
        }
        if !(0.0..=1.0).contains(&self.execution.paper_accept_rate) {
            bail!(
                "execution.paper_accept_rate {} must be in [0, 1]",
                self.execution.paper_accept_rate
            );
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbols: ["BTC", "ETH", "SOL", "XRP"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            interval: "15m".to_string(),
            venue: "polymarket".to_string(),
            monitor: MonitorDefaults::default(),
            overrides: HashMap::new(),
            quiet_window: QuietWindowConfig::default(),
            execution: ExecutionConfig::default(),
            feed: FeedConfig::default(),
            status_interval_secs: 30,
        }
    }
}

impl Default for MonitorDefaults {
    fn default() -> Self {
        Self {
            edge_threshold: dec!(0.002),
            poll_interval_ms: 50,
            freshness_ms: 500,
            leg_timeout_ms: 2000,
            recovery_delay_ms: 1000,
            quiet_poll_ms: 1000,
        }
    }
}

impl Default for QuietWindowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_secs: 900,
            before_boundary_secs: 60,
            after_boundary_secs: 60,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Paper,
            gateway_url: "http://127.0.0.1:8787".to_string(),
            request_timeout_ms: 1500,
            paper_latency_ms: 0,
            paper_accept_rate: 1.0,
            paper_seed: None,
            paper_history_limit: 1000,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ws_url: "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string(),
            gamma_url: "https://gamma-api.polymarket.com".to_string(),
            ping_interval_secs: 10,
            initial_reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 60_000,
        }
    }
}
