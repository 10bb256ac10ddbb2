//! Spoken announcement text

use chrono::{DateTime, Utc};

use crate::policy::TriggerLabel;

use super::presentation::AlertContent;

/// Deliveries later than this use the real remaining time instead of the label
const LATE_GRACE_SECS: i64 = 60;

fn label_phrase(label: TriggerLabel) -> &'static str {
    match label {
        TriggerLabel::OneDay => "1 day",
        TriggerLabel::OneHour => "1 hour",
        TriggerLabel::FifteenMinutes => "15 minutes",
        TriggerLabel::FiveMinutes => "5 minutes",
        TriggerLabel::OneMinute => "1 minute",
        TriggerLabel::Now => "now",
    }
}

fn minutes_phrase(minutes: i64) -> String {
    if minutes == 1 {
        "1 minute".to_string()
    } else {
        format!("{} minutes", minutes)
    }
}

/// Build the text spoken for `alert` when delivered at `now`
///
/// A trigger delivered late by the reconciliation sweep describes the real
/// remaining time, so a missed "15 minutes" alert never lies about it.
pub fn announcement(alert: &AlertContent, now: DateTime<Utc>) -> String {
    let remaining = alert.start_at.signed_duration_since(now);
    let late = now.signed_duration_since(alert.at_time).num_seconds() > LATE_GRACE_SECS;

    let mut text = if remaining.num_seconds() <= 0 {
        if late {
            format!("{} has already started", alert.title)
        } else {
            format!("{} is starting now", alert.title)
        }
    } else if late || alert.label == TriggerLabel::Now {
        // Round up so "starts in 0 minutes" is never said
        let minutes = (remaining.num_seconds() + 59) / 60;
        format!("{} starts in {}", alert.title, minutes_phrase(minutes))
    } else {
        format!("{} starts in {}", alert.title, label_phrase(alert.label))
    };

    if let Some(location) = &alert.location_summary {
        text.push_str(". Location: ");
        text.push_str(location);
    }
    text
}
