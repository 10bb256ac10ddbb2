//! Schedule planning
//!
//! Turns an [`EventRef`] into a fresh [`ScheduleEntry`]. Planning has no side
//! effects; persisting and arming the result is the caller's job.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::clock::SharedClock;
use crate::model::{EventRef, ScheduleEntry, TriggerTime};
use crate::policy::triggers_for;

/// Reasons an event cannot be planned right now
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Event starts after the lookahead horizon; a later rescan will pick it up
    #[error("event {event_id} starts at {start_at}, beyond the lookahead horizon")]
    BeyondHorizon {
        event_id: String,
        start_at: DateTime<Utc>,
    },

    /// Every trigger moment is already in the past
    #[error("event {event_id} has no future trigger to schedule")]
    NothingToSchedule { event_id: String },
}

/// Computes schedules from the escalation policy
#[derive(Clone)]
pub struct SchedulePlanner {
    clock: SharedClock,
    lookahead: Duration,
}

impl SchedulePlanner {
    pub fn new(clock: SharedClock, lookahead: Duration) -> Self {
        Self { clock, lookahead }
    }

    pub fn lookahead(&self) -> Duration {
        self.lookahead
    }

    /// Whether `event` starts within the lookahead horizon of now
    pub fn within_horizon(&self, event: &EventRef) -> bool {
        let now = self.clock.now();
        match ChronoDuration::from_std(self.lookahead)
            .ok()
            .and_then(|horizon| now.checked_add_signed(horizon))
        {
            Some(limit) => event.start_at <= limit,
            None => true,
        }
    }

    /// Plan the alert schedule for `event`
    ///
    /// Every produced `at_time` is strictly after the current time and all
    /// fired bits start cleared.
    pub fn plan(&self, event: &EventRef) -> Result<ScheduleEntry, PlanError> {
        if !self.within_horizon(event) {
            return Err(PlanError::BeyondHorizon {
                event_id: event.id.clone(),
                start_at: event.start_at,
            });
        }

        let now = self.clock.now();
        let trigger_times: Vec<TriggerTime> = triggers_for(event.start_at, now)
            .into_iter()
            .map(|planned| TriggerTime {
                label: planned.label,
                at_time: planned.at_time,
                tier: planned.tier,
                fired: false,
            })
            .collect();

        if trigger_times.is_empty() {
            return Err(PlanError::NothingToSchedule {
                event_id: event.id.clone(),
            });
        }

        Ok(ScheduleEntry {
            event_id: event.id.clone(),
            title: event.title.clone(),
            start_at: event.start_at,
            location_summary: event.location_summary.clone(),
            trigger_times,
            created_at: now,
        })
    }
}
