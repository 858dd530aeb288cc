pub mod config;
pub mod config_loader;
pub mod position;

pub use config::{
    AppConfig, ExecutionConfig, ExecutionMode, FeedConfig, MonitorConfig, MonitorDefaults,
    MonitorOverride, QuietWindowConfig,
};
pub use config_loader::{ConfigLoader, DEFAULT_CONFIG_PATH, ENV_PREFIX};
pub use position::{FillDirection, NetPositionGauge};
