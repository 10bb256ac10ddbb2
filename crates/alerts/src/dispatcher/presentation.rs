//! Presentation state owned by the dispatcher

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{ScheduleEntry, TriggerTime};
use crate::policy::{PresentationStyle, Tier, TriggerLabel};

/// Everything needed to present one alert without touching the store again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertContent {
    pub event_id: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub location_summary: Option<String>,
    pub label: TriggerLabel,
    pub tier: Tier,
    /// Moment the trigger was due
    pub at_time: DateTime<Utc>,
}

impl AlertContent {
    pub(crate) fn from_trigger(entry: &ScheduleEntry, trigger: &TriggerTime) -> Self {
        Self {
            event_id: entry.event_id.clone(),
            title: entry.title.clone(),
            start_at: entry.start_at,
            location_summary: entry.location_summary.clone(),
            label: trigger.label,
            tier: trigger.tier,
            at_time: trigger.at_time,
        }
    }
}

/// The single sustained alert currently presented by this process
///
/// Never persisted: a restart loses the presentation but not the fired bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveAlertState {
    /// Distinguishes successive presentations of the same event
    pub id: Uuid,
    pub event_id: String,
    pub label: TriggerLabel,
    pub tier: Tier,
    pub title: String,
    pub presentation: PresentationStyle,
    pub started_at: DateTime<Utc>,
    /// Set when this presentation is a snoozed re-delivery: when it came due
    pub snoozed_until: Option<DateTime<Utc>>,
}

impl ActiveAlertState {
    pub(crate) fn new(
        alert: &AlertContent,
        started_at: DateTime<Utc>,
        snoozed_until: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_id: alert.event_id.clone(),
            label: alert.label,
            tier: alert.tier,
            title: alert.title.clone(),
            presentation: alert.tier.channels().presentation,
            started_at,
            snoozed_until,
        }
    }
}

/// Why a presentation went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearReason {
    Dismissed,
    Snoozed,
    AutoClosed,
    /// A newer sustained alert took the slot
    Replaced,
    /// The event was cancelled or rescheduled
    Cancelled,
}

/// Notifications for whatever renders alerts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresentationEvent {
    /// A sustained alert now occupies the slot
    Presented(ActiveAlertState),
    /// A transient (light) alert was shown
    Notified {
        event_id: String,
        label: TriggerLabel,
        title: String,
        text: String,
    },
    Cleared {
        alert_id: Uuid,
        event_id: String,
        reason: ClearReason,
    },
}

/// Returned by a successful snooze
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnoozeTicket {
    pub id: Uuid,
    pub event_id: String,
    pub label: TriggerLabel,
    pub due_at: DateTime<Utc>,
}
