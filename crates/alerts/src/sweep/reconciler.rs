//! Missed-alert reconciliation
//!
//! The correctness backstop for every stretch of time the process was not
//! running continuously: suspended, killed, offline, or simply started after
//! a trigger's moment had passed.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::dispatcher::{AlertDispatcher, DeliveryOutcome};
use crate::events::EventDirectory;
use crate::persistence::{ScheduleStore, StoreError};

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Schedules examined
    pub scanned: usize,
    /// Triggers this sweep delivered
    pub delivered: usize,
    /// Schedules deleted because their event no longer exists
    pub orphaned: usize,
    /// Values purged because they failed to decode
    pub malformed: usize,
    /// Schedules or triggers left for the next sweep after an error
    pub skipped: usize,
}

/// Scans the store and delivers everything overdue
pub struct MissedAlertReconciler {
    store: Arc<ScheduleStore>,
    dispatcher: AlertDispatcher,
    directory: Arc<dyn EventDirectory>,
    clock: SharedClock,
}

impl MissedAlertReconciler {
    pub fn new(
        store: Arc<ScheduleStore>,
        dispatcher: AlertDispatcher,
        directory: Arc<dyn EventDirectory>,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            dispatcher,
            directory,
            clock,
        }
    }

    /// Run one reconciliation pass
    ///
    /// Delivery is idempotent, so running this while live timers fire the
    /// same triggers is safe. Each schedule is handled in isolation; one bad
    /// entry never stops the rest of the sweep. Only a failure to enumerate
    /// the store at all is returned as an error.
    pub async fn sweep(&self) -> Result<ReconcileReport, StoreError> {
        let snapshot = self.store.load_all().await?;
        let mut report = ReconcileReport {
            scanned: snapshot.entries.len(),
            malformed: snapshot.purged_malformed,
            skipped: snapshot.failed_keys,
            ..Default::default()
        };

        for entry in snapshot.entries {
            match self.directory.lookup(&entry.event_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    info!(event_id = %entry.event_id, "Event no longer exists, dropping schedule");
                    match self.store.delete(&entry.event_id).await {
                        Ok(()) => {
                            self.dispatcher.withdraw(&entry.event_id).await;
                            report.orphaned += 1;
                        }
                        Err(e) => {
                            warn!(event_id = %entry.event_id, error = %e, "Failed to drop orphaned schedule");
                            report.skipped += 1;
                        }
                    }
                    continue;
                }
                Err(e) => {
                    warn!(event_id = %entry.event_id, error = %e, "Event lookup failed, retrying next sweep");
                    report.skipped += 1;
                    continue;
                }
            }

            let now = self.clock.now();
            let due: Vec<_> = entry.due(now).map(|t| t.label).collect();
            for label in due {
                match self.dispatcher.deliver(&entry.event_id, label).await {
                    Ok(DeliveryOutcome::Delivered { .. }) => {
                        info!(event_id = %entry.event_id, %label, "Delivered missed alert");
                        report.delivered += 1;
                    }
                    Ok(outcome) => {
                        debug!(event_id = %entry.event_id, %label, ?outcome, "Missed alert already handled");
                    }
                    Err(e) => {
                        warn!(event_id = %entry.event_id, %label, error = %e, "Missed alert delivery failed");
                        report.skipped += 1;
                    }
                }
            }
        }

        if report.delivered > 0 || report.orphaned > 0 || report.malformed > 0 {
            info!(
                scanned = report.scanned,
                delivered = report.delivered,
                orphaned = report.orphaned,
                malformed = report.malformed,
                skipped = report.skipped,
                "Reconciliation sweep finished"
            );
        } else {
            debug!(scanned = report.scanned, "Reconciliation sweep found nothing");
        }

        Ok(report)
    }
}
