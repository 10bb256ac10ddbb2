//! Daemon configuration from the environment

use std::path::PathBuf;
use std::time::Duration;

use chime_alerts::AlertEngineConfig;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Settings for the host process
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Directory holding one JSON file per schedule
    pub data_dir: PathBuf,
    /// JSON array of events the feed loop watches
    pub events_file: PathBuf,
    /// How often the events file is re-read
    pub rescan_interval: Duration,
    /// Engine settings
    pub engine: AlertEngineConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./chime-data"),
            events_file: PathBuf::from("./events.json"),
            rescan_interval: Duration::from_secs(60),
            engine: AlertEngineConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `CHIME_DATA_DIR`: schedule store directory (default: "./chime-data")
    /// - `CHIME_EVENTS_FILE`: events feed (default: "./events.json")
    /// - `CHIME_RESCAN_INTERVAL_SECS`: feed poll period (default: 60)
    /// - `CHIME_RECONCILE_INTERVAL_SECS`: missed-alert sweep period (default: 300)
    /// - `CHIME_RETENTION_DAYS`: schedule retention (default: 7)
    /// - `CHIME_LOOKAHEAD_DAYS`: planning horizon (default: 7)
    /// - `CHIME_VOICE_LOCALE`: announcement locale (default: "en-US")
    ///
    /// Unparseable numbers fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| var(key).and_then(|s| s.trim().parse::<u64>().ok());
        let days = |key: &str| var(key).and_then(|s| s.trim().parse::<u32>().ok());

        let mut engine = defaults.engine;
        if let Some(n) = days("CHIME_LOOKAHEAD_DAYS") {
            engine = engine.with_lookahead(DAY * n);
        }
        if let Some(n) = days("CHIME_RETENTION_DAYS") {
            engine = engine.with_retention(DAY * n);
        }
        if let Some(secs) = number("CHIME_RECONCILE_INTERVAL_SECS") {
            engine = engine.with_reconcile_interval(Duration::from_secs(secs));
        }
        if let Some(locale) = var("CHIME_VOICE_LOCALE") {
            engine = engine.with_voice_locale(locale);
        }

        Self {
            data_dir: var("CHIME_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            events_file: var("CHIME_EVENTS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.events_file),
            rescan_interval: number("CHIME_RESCAN_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.rescan_interval),
            engine,
        }
    }
}
