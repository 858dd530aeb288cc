//! Trading suppression around settlement boundaries.
//!
//! Boundaries fall on multiples of `period_secs` since the Unix epoch (every
//! 15 minutes by default). Trading is suppressed for `before_secs` before and
//! `after_secs` after each boundary.

use chrono::{DateTime, Utc};

use updown_arb_core::QuietWindowConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietWindow {
    enabled: bool,
    period_secs: i64,
    before_secs: i64,
    after_secs: i64,
}

impl QuietWindow {
    #[must_use]
    pub fn new(period_secs: u64, before_secs: u64, after_secs: u64) -> Self {
        let clamp = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
        Self {
            enabled: true,
            period_secs: clamp(period_secs).max(1),
            before_secs: clamp(before_secs),
            after_secs: clamp(after_secs),
        }
    }

    /// A window that never suppresses trading.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(900, 0, 0)
        }
    }

    #[must_use]
    pub fn from_config(config: &QuietWindowConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        Self::new(
            config.period_secs,
            config.before_boundary_secs,
            config.after_boundary_secs,
        )
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Seconds elapsed since the most recent boundary.
    #[must_use]
    pub const fn offset_in_period(&self, unix_secs: i64) -> i64 {
        unix_secs.rem_euclid(self.period_secs)
    }

    #[must_use]
    pub const fn is_quiet_at(&self, unix_secs: i64) -> bool {
        if !self.enabled {
            return false;
        }
        let offset = self.offset_in_period(unix_secs);
        offset < self.after_secs || offset >= self.period_secs - self.before_secs
    }

    #[must_use]
    pub fn is_quiet(&self, now: DateTime<Utc>) -> bool {
        self.is_quiet_at(now.timestamp())
    }
}

impl Default for QuietWindow {
    fn default() -> Self {
        Self::from_config(&QuietWindowConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, h, m, s).unwrap()
    }

    #[test]
    fn test_default_suppresses_minute_around_boundary() {
        let window = QuietWindow::default();

        // Last minute before the :15 boundary.
        assert!(window.is_quiet(at(10, 14, 0)));
        assert!(window.is_quiet(at(10, 14, 59)));
        // First minute after.
        assert!(window.is_quiet(at(10, 15, 0)));
        assert!(window.is_quiet(at(10, 15, 59)));
        assert!(window.is_quiet(at(11, 0, 30)));
    }

    #[test]
    fn test_default_open_mid_period() {
        let window = QuietWindow::default();

        assert!(!window.is_quiet(at(10, 13, 59)));
        assert!(!window.is_quiet(at(10, 16, 0)));
        assert!(!window.is_quiet(at(10, 22, 30)));
        assert!(!window.is_quiet(at(10, 43, 59)));
        assert!(window.is_quiet(at(10, 44, 0)));
    }

    #[test]
    fn test_asymmetric_window() {
        let window = QuietWindow::new(900, 120, 0);

        assert!(window.is_quiet(at(10, 13, 0)));
        assert!(!window.is_quiet(at(10, 15, 0)));
        assert!(!window.is_quiet(at(10, 12, 59)));
    }

    #[test]
    fn test_disabled_never_quiet() {
        let window = QuietWindow::from_config(&QuietWindowConfig {
            enabled: false,
            ..QuietWindowConfig::default()
        });

        assert!(!window.is_enabled());
        assert!(!window.is_quiet(at(10, 15, 0)));
    }

    #[test]
    fn test_offset_handles_pre_epoch() {
        let window = QuietWindow::new(900, 60, 60);
        assert_eq!(window.offset_in_period(-1), 899);
        assert!(window.is_quiet_at(-1));
    }
}
