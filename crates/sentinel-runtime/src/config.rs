//! Monitor configuration

use std::time::Duration;

use sentinel_core::DEFAULT_DEVTOOLS_THRESHOLD_PX;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Storage key of the local counter mirror
pub const DEFAULT_MIRROR_KEY: &str = "fraud_detection_data";

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Quiet period before a counter-only save is sent
    pub debounce_ms: u64,
    /// DevTools poll period
    pub devtools_poll_ms: u64,
    /// Chrome excess treated as an open devtools panel
    pub devtools_threshold_px: i32,
    /// Minimum time the reflection modal stays up
    pub reflection_cooldown_secs: u64,
    /// Key of the local counter mirror
    pub mirror_key: String,
    /// Ask the text generator for reflections
    pub reflection_enabled: bool,
}

impl MonitorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML, filling missing keys with defaults
    ///
    /// # Errors
    /// - `ConfigError::Parse` on malformed TOML
    /// - `ConfigError::Invalid` on zero periods or a negative threshold
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the timers cannot run with
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the offending key
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::Invalid("debounce_ms must be positive".into()));
        }
        if self.devtools_poll_ms == 0 {
            return Err(ConfigError::Invalid("devtools_poll_ms must be positive".into()));
        }
        if self.devtools_threshold_px < 0 {
            return Err(ConfigError::Invalid(
                "devtools_threshold_px must not be negative".into(),
            ));
        }
        if self.mirror_key.is_empty() {
            return Err(ConfigError::Invalid("mirror_key must not be empty".into()));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_devtools_poll_ms(mut self, ms: u64) -> Self {
        self.devtools_poll_ms = ms;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_reflection_cooldown_secs(mut self, secs: u64) -> Self {
        self.reflection_cooldown_secs = secs;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_reflections(mut self, enabled: bool) -> Self {
        self.reflection_enabled = enabled;
        self
    }

    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[inline]
    #[must_use]
    pub fn devtools_poll(&self) -> Duration {
        Duration::from_millis(self.devtools_poll_ms)
    }

    #[inline]
    #[must_use]
    pub fn reflection_cooldown(&self) -> Duration {
        Duration::from_secs(self.reflection_cooldown_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            devtools_poll_ms: 500,
            devtools_threshold_px: DEFAULT_DEVTOOLS_THRESHOLD_PX,
            reflection_cooldown_secs: 30,
            mirror_key: DEFAULT_MIRROR_KEY.to_string(),
            reflection_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MonitorConfig::new();
        assert_eq!(config.debounce(), Duration::from_secs(1));
        assert_eq!(config.devtools_poll(), Duration::from_millis(500));
        assert_eq!(config.devtools_threshold_px, 160);
        assert_eq!(config.reflection_cooldown(), Duration::from_secs(30));
        assert_eq!(config.mirror_key, "fraud_detection_data");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = MonitorConfig::from_toml_str("debounce_ms = 250\n").unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.devtools_poll_ms, 500);
        assert!(config.reflection_enabled);
    }

    #[test]
    fn rejects_zero_periods() {
        assert!(matches!(
            MonitorConfig::from_toml_str("devtools_poll_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            MonitorConfig::from_toml_str("debounce_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
