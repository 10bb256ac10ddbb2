// Telemetry
//
// Console logging through tracing-subscriber with an EnvFilter taken from
// RUST_LOG or LOG_LEVEL.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "chime_alerts=info,chime_daemon=info";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Log filter (e.g., "info", "chime_alerts=debug")
    pub log_filter: Option<String>,
    /// Include the event target in each line
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: None,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// - `RUST_LOG`: full filter directive
    /// - `LOG_LEVEL`: a bare level applied to both chime crates
    pub fn from_env() -> Self {
        let log_filter = std::env::var("RUST_LOG").ok().or_else(|| {
            std::env::var("LOG_LEVEL")
                .ok()
                .map(|level| format!("chime_alerts={level},chime_daemon={level}"))
        });
        Self {
            log_filter,
            ..Default::default()
        }
    }

    /// The filter that will actually be installed
    pub fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Install the global subscriber
///
/// Call once, before anything logs.
pub fn init_telemetry(config: TelemetryConfig) {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_filter(config.filter());

    tracing_subscriber::registry().with(console_layer).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_filter_is_used() {
        let config = TelemetryConfig {
            log_filter: Some("chime_alerts=debug".to_string()),
            ..Default::default()
        };
        assert_eq!(config.filter().to_string(), "chime_alerts=debug");
    }

    #[test]
    fn test_invalid_filter_falls_back_to_default() {
        let config = TelemetryConfig {
            log_filter: Some("chime_alerts=[".to_string()),
            ..Default::default()
        };
        let filter = config.filter().to_string();
        assert!(filter.contains("chime_alerts=info"));
        assert!(filter.contains("chime_daemon=info"));
    }
}
