//! Engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Alert engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEngineConfig {
    /// How far ahead events get a schedule
    #[serde(with = "duration_millis")]
    pub lookahead: Duration,

    /// Age after which a schedule is deleted whatever its state
    #[serde(with = "duration_millis")]
    pub retention: Duration,

    /// Missed-alert sweep period (also runs once at start)
    #[serde(with = "duration_millis")]
    pub reconcile_interval: Duration,

    /// Retention sweep period
    #[serde(with = "duration_millis")]
    pub collect_interval: Duration,

    /// Locale passed to voice announcements
    pub voice_locale: String,

    /// How long shutdown waits for background loops
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for AlertEngineConfig {
    fn default() -> Self {
        Self {
            lookahead: 7 * DAY,
            retention: 7 * DAY,
            reconcile_interval: Duration::from_secs(5 * 60),
            collect_interval: Duration::from_secs(60 * 60),
            voice_locale: "en-US".to_string(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl AlertEngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lookahead horizon
    pub fn with_lookahead(mut self, lookahead: Duration) -> Self {
        self.lookahead = lookahead;
        self
    }

    /// Set the retention window
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the reconciliation period
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval.max(MIN_SWEEP_INTERVAL);
        self
    }

    /// Set the retention sweep period
    pub fn with_collect_interval(mut self, interval: Duration) -> Self {
        self.collect_interval = interval;
        self
    }

    pub fn with_voice_locale(mut self, locale: impl Into<String>) -> Self {
        self.voice_locale = locale.into();
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Reconciliation period actually used
    ///
    /// Fields are public and deserializable, so the floor is applied here too.
    pub fn effective_reconcile_interval(&self) -> Duration {
        self.reconcile_interval.max(MIN_SWEEP_INTERVAL)
    }

    /// Retention sweep period actually used
    pub fn effective_collect_interval(&self) -> Duration {
        self.collect_interval.max(self.effective_reconcile_interval())
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AlertEngineConfig::default();
        assert_eq!(config.lookahead, 7 * DAY);
        assert_eq!(config.retention, 7 * DAY);
        assert_eq!(config.reconcile_interval, Duration::from_secs(300));
        assert_eq!(config.voice_locale, "en-US");
    }

    #[test]
    fn test_config_builder() {
        let config = AlertEngineConfig::new()
            .with_lookahead(2 * DAY)
            .with_reconcile_interval(Duration::from_secs(60))
            .with_collect_interval(Duration::from_secs(10))
            .with_voice_locale("de-DE");

        assert_eq!(config.lookahead, 2 * DAY);
        assert_eq!(config.voice_locale, "de-DE");
        // Collection never runs more often than reconciliation
        assert_eq!(config.effective_collect_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_intervals_from_json_are_floored() {
        let json = r#"{
            "lookahead": 604800000,
            "retention": 604800000,
            "reconcile_interval": 0,
            "collect_interval": 0,
            "voice_locale": "en-US",
            "shutdown_timeout": 5000
        }"#;
        let config: AlertEngineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.reconcile_interval, Duration::ZERO);
        assert_eq!(config.effective_reconcile_interval(), Duration::from_secs(1));
        assert_eq!(config.effective_collect_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let json = serde_json::to_value(AlertEngineConfig::default()).unwrap();
        assert_eq!(json["reconcile_interval"], 300_000);

        let parsed: AlertEngineConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, AlertEngineConfig::default());
    }
}
