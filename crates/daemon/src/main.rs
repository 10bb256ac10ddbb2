use std::sync::Arc;

use anyhow::{Context, Result};
use chime_alerts::{AlertService, FileKvStore, PresentationEvent, SystemClock};
use chime_daemon::{
    init_telemetry, log_channels, DaemonConfig, EventFeed, FileEventDirectory, TelemetryConfig,
};
use tokio::sync::{broadcast, watch};

#[tokio::main]
async fn main() -> Result<()> {
    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("Loaded .env from {:?}", path);
    }

    // Configure via environment variables:
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "chime_alerts=info,chime_daemon=info")
    init_telemetry(TelemetryConfig::from_env());

    tracing::info!("chime-daemon starting...");

    let config = DaemonConfig::from_env();
    tracing::info!(
        data_dir = %config.data_dir.display(),
        events_file = %config.events_file.display(),
        rescan_secs = config.rescan_interval.as_secs(),
        "Loaded configuration"
    );

    let kv = FileKvStore::open(&config.data_dir)
        .await
        .with_context(|| format!("Failed to open store at {}", config.data_dir.display()))?;
    let directory = FileEventDirectory::new(&config.events_file);

    let service = Arc::new(AlertService::new(
        config.engine.clone(),
        Arc::new(kv),
        log_channels(),
        Arc::new(directory.clone()),
        Arc::new(SystemClock),
    ));

    let presentations = tokio::spawn(log_presentations(service.subscribe()));

    service
        .start()
        .await
        .context("Failed to start alert service")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feed = tokio::spawn(EventFeed::new().run(
        service.clone(),
        directory,
        config.rescan_interval,
        shutdown_rx,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");

    shutdown_tx.send_replace(true);
    if let Err(e) = feed.await {
        tracing::warn!(error = %e, "Event feed task ended abnormally");
    }
    if let Err(e) = service.shutdown().await {
        tracing::warn!(error = %e, "Alert service did not shut down cleanly");
    }
    presentations.abort();

    tracing::info!("chime-daemon shutdown complete");
    Ok(())
}

async fn log_presentations(mut rx: broadcast::Receiver<PresentationEvent>) {
    loop {
        match rx.recv().await {
            Ok(PresentationEvent::Presented(state)) => {
                tracing::info!(
                    event_id = %state.event_id,
                    label = %state.label,
                    tier = %state.tier,
                    alert_id = %state.id,
                    "Alert presented: {}",
                    state.title
                );
            }
            Ok(PresentationEvent::Notified { event_id, label, text, .. }) => {
                tracing::info!(%event_id, %label, "Notification: {}", text);
            }
            Ok(PresentationEvent::Cleared { alert_id, event_id, reason }) => {
                tracing::info!(%event_id, %alert_id, ?reason, "Alert cleared");
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Presentation log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
