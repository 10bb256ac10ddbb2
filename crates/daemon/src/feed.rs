//! Event feed
//!
//! Polls the events file and turns differences between consecutive
//! snapshots into schedule, reschedule and cancel calls on the service.
//! Only a start-time change reschedules; a renamed event keeps its fired
//! bits and the new title is picked up by the next schedule it gets.
//! The first pass has no previous snapshot, so it compares against the
//! store instead and cancels schedules whose event is gone from the file.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chime_alerts::{AlertService, EventRef, RescanReport, ScheduleOutcome, ServiceError};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::directory::FileEventDirectory;

/// What one feed pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedReport {
    pub scheduled: usize,
    pub rescheduled: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub rescan: RescanReport,
}

/// Remembers the last events snapshot seen
#[derive(Debug, Default)]
pub struct EventFeed {
    snapshot: HashMap<String, EventRef>,
    primed: bool,
}

impl EventFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn known(&self) -> usize {
        self.snapshot.len()
    }

    /// Apply the current list of events
    ///
    /// New or changed events are compared with the stored schedule, so the
    /// first pass after a restart also catches events moved while the
    /// process was down.
    pub async fn sync(
        &mut self,
        service: &AlertService,
        current: Vec<EventRef>,
    ) -> Result<FeedReport, ServiceError> {
        let mut report = FeedReport::default();
        let current: HashMap<String, EventRef> =
            current.into_iter().map(|e| (e.id.clone(), e)).collect();

        let removed: Vec<String> = if self.primed {
            self.snapshot
                .keys()
                .filter(|id| !current.contains_key(*id))
                .cloned()
                .collect()
        } else {
            service
                .store()
                .list_keys()
                .await?
                .into_iter()
                .filter(|id| !current.contains_key(id))
                .collect()
        };

        for id in &removed {
            match service.cancel_event(id).await {
                Ok(()) => report.cancelled += 1,
                Err(e) => {
                    warn!(event_id = %id, error = %e, "Failed to cancel removed event");
                    report.failed += 1;
                }
            }
        }

        for event in current.values() {
            if self.snapshot.get(&event.id) == Some(event) {
                continue;
            }
            match self.apply(service, event).await {
                Ok(Applied::Scheduled) => report.scheduled += 1,
                Ok(Applied::Rescheduled) => report.rescheduled += 1,
                Ok(Applied::Unchanged) => {}
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "Failed to apply event change");
                    report.failed += 1;
                }
            }
        }

        let events: Vec<EventRef> = current.values().cloned().collect();
        report.rescan = service.rescan(&events).await?;
        self.snapshot = current;
        self.primed = true;

        if report.scheduled + report.rescheduled + report.cancelled > 0 {
            info!(
                scheduled = report.scheduled,
                rescheduled = report.rescheduled,
                cancelled = report.cancelled,
                "Applied event feed changes"
            );
        }
        Ok(report)
    }

    async fn apply(&self, service: &AlertService, event: &EventRef) -> Result<Applied, ServiceError> {
        match service.store().load(&event.id).await? {
            None => match service.schedule_event(event).await? {
                ScheduleOutcome::Scheduled { .. } => Ok(Applied::Scheduled),
                _ => Ok(Applied::Unchanged),
            },
            Some(entry) if entry.start_at != event.start_at => {
                debug!(
                    event_id = %event.id,
                    from = %entry.start_at,
                    to = %event.start_at,
                    "Event moved"
                );
                service.reschedule_event(event).await?;
                Ok(Applied::Rescheduled)
            }
            Some(_) => Ok(Applied::Unchanged),
        }
    }

    /// Poll `directory` every `interval` until shutdown is signalled
    pub async fn run(
        mut self,
        service: Arc<AlertService>,
        directory: FileEventDirectory,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match directory.load().await {
                        Ok(events) => {
                            if let Err(e) = self.sync(&service, events).await {
                                warn!(error = %e, "Event feed pass failed");
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Could not read events, keeping previous snapshot");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    debug!("Event feed: shutdown requested");
                    break;
                }
            }
        }

        debug!("Event feed exited");
    }
}

enum Applied {
    Scheduled,
    Rescheduled,
    Unchanged,
}
