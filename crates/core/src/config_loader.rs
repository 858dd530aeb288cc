use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";

/// Environment variable prefix; nested keys use `__` (e.g. `UPDOWN_ARB_MONITOR__EDGE_THRESHOLD`).
pub const ENV_PREFIX: &str = "UPDOWN_ARB_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from [`DEFAULT_CONFIG_PATH`] merged with environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be parsed or fails validation.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration by layering defaults, a TOML file, and environment variables.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be parsed or fails validation.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        let config: AppConfig = Self::figment(path)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the file only, ignoring the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be parsed or fails validation.
    pub fn load_file_only(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        let config: AppConfig = Self::figment(path)
            .extract()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::file(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ConfigLoader::load_file_only("does/not/exist.toml").unwrap();
        assert_eq!(config.symbols.len(), 4);
        assert_eq!(config.monitor.freshness_ms, 500);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let file = write_config(
            r#"
symbols = ["BTC", "SOL"]
status_interval_secs = 5

[monitor]
edge_threshold = 0.004
poll_interval_ms = 20

[overrides.SOL]
leg_timeout_ms = 1500

[quiet_window]
before_boundary_secs = 90
"#,
        );

        let config = ConfigLoader::load_file_only(file.path()).unwrap();
        assert_eq!(config.symbols, vec!["BTC".to_string(), "SOL".to_string()]);
        assert_eq!(config.status_interval_secs, 5);
        assert_eq!(config.monitor.edge_threshold, dec!(0.004));
        assert_eq!(config.monitor.poll_interval_ms, 20);
        // Untouched keys in a partially specified table keep their defaults.
        assert_eq!(config.monitor.freshness_ms, 500);
        assert_eq!(config.quiet_window.before_boundary_secs, 90);
        assert_eq!(config.quiet_window.after_boundary_secs, 60);

        let monitors = config.monitor_configs();
        assert_eq!(monitors[1].symbol, "SOL");
        assert_eq!(monitors[1].leg_timeout_ms, 1500);
        assert_eq!(monitors[0].leg_timeout_ms, 2000);
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let file = write_config("symbols = []\n");
        assert!(ConfigLoader::load_file_only(file.path()).is_err());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let file = write_config("symbols = [\"BTC\"\n[monitor\n");
        assert!(ConfigLoader::load_file_only(file.path()).is_err());
    }
}
