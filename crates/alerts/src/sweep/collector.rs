//! Retention sweep
//!
//! Deletes schedules whose `created_at` is older than the retention window,
//! whatever their fired state. The window outlasts the lookahead horizon, so
//! a schedule is only collected once its meeting is long over.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::persistence::{ScheduleStore, StoreError};

const MAX_RETENTION_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
    pub scanned: usize,
    pub removed: usize,
}

pub struct StaleScheduleCollector {
    store: Arc<ScheduleStore>,
    clock: SharedClock,
    retention: Duration,
}

impl StaleScheduleCollector {
    pub fn new(store: Arc<ScheduleStore>, clock: SharedClock, retention: Duration) -> Self {
        Self {
            store,
            clock,
            retention,
        }
    }

    pub async fn collect(&self) -> Result<CollectReport, StoreError> {
        let snapshot = self.store.load_all().await?;
        let retention = ChronoDuration::from_std(self.retention)
            .unwrap_or_else(|_| ChronoDuration::days(MAX_RETENTION_DAYS));
        let now = self.clock.now();

        let mut report = CollectReport {
            scanned: snapshot.entries.len(),
            removed: 0,
        };

        for entry in snapshot.entries {
            let age = now.signed_duration_since(entry.created_at);
            if age <= retention {
                continue;
            }
            match self.store.delete(&entry.event_id).await {
                Ok(()) => {
                    debug!(event_id = %entry.event_id, age_hours = age.num_hours(), "Collected stale schedule");
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(event_id = %entry.event_id, error = %e, "Failed to collect stale schedule");
                }
            }
        }

        if report.removed > 0 {
            info!(
                scanned = report.scanned,
                removed = report.removed,
                "Retention sweep finished"
            );
        }
        Ok(report)
    }
}
