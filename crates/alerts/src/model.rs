//! Domain types shared across the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::{Tier, TriggerLabel};

/// What the engine needs to know about a calendar event
///
/// Owned by the event subsystem; the engine only reads it when planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRef {
    pub id: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_summary: Option<String>,
}

impl EventRef {
    pub fn new(id: impl Into<String>, title: impl Into<String>, start_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            start_at,
            location_summary: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location_summary = Some(location.into());
        self
    }
}

/// One scheduled alert moment inside a [`ScheduleEntry`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerTime {
    pub label: TriggerLabel,
    pub at_time: DateTime<Utc>,
    pub tier: Tier,
    /// Flips false to true exactly once, only through the dispatcher
    pub fired: bool,
}

/// Durable alert schedule for one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub event_id: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_summary: Option<String>,
    /// Ordered by non-decreasing `at_time`
    pub trigger_times: Vec<TriggerTime>,
    pub created_at: DateTime<Utc>,
}

impl ScheduleEntry {
    /// Look up the trigger for a label
    pub fn trigger(&self, label: TriggerLabel) -> Option<&TriggerTime> {
        self.trigger_times.iter().find(|t| t.label == label)
    }

    /// Unfired triggers whose moment has arrived
    pub fn due(&self, now: DateTime<Utc>) -> impl Iterator<Item = &TriggerTime> {
        self.trigger_times
            .iter()
            .filter(move |t| !t.fired && t.at_time <= now)
    }

    /// Unfired triggers still in the future
    pub fn upcoming(&self, now: DateTime<Utc>) -> impl Iterator<Item = &TriggerTime> {
        self.trigger_times
            .iter()
            .filter(move |t| !t.fired && t.at_time > now)
    }

    pub fn all_fired(&self) -> bool {
        self.trigger_times.iter().all(|t| t.fired)
    }

    /// Set the fired bit for `label`
    ///
    /// Returns `false` when the label is unknown or was already fired.
    pub(crate) fn mark_fired(&mut self, label: TriggerLabel) -> bool {
        match self.trigger_times.iter_mut().find(|t| t.label == label) {
            Some(trigger) if !trigger.fired => {
                trigger.fired = true;
                true
            }
            _ => false,
        }
    }
}
