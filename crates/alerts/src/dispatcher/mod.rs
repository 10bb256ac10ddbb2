//! Alert dispatcher
//!
//! The single choke point both the live timers and the reconciliation sweep
//! call into. It provides:
//! - exactly-once delivery per trigger (persisted check-and-set on `fired`)
//! - tier-driven channel activation (audio, vibration, voice)
//! - the process-wide single active-alert slot with dismiss, snooze and
//!   auto-close
//!
//! # Delivery order
//!
//! ```text
//! deliver(event, label)
//!   ├─ store.mark_fired ── NoSchedule / UnknownTrigger / AlreadyFired → no-op
//!   │        │
//!   │        ▼ (fired bit persisted)
//!   ├─ tear down previous sustained alert (stop channels, cancel countdown)
//!   ├─ start audio / vibration / voice (each failure logged, never fatal)
//!   └─ occupy slot + start auto-close countdown
//! ```

mod announce;
mod presentation;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capability::{CapabilityError, DeliveryChannels};
use crate::clock::SharedClock;
use crate::persistence::{MarkFired, ScheduleStore, StoreError};
use crate::policy::{ChannelSettings, Tier, TriggerLabel};

pub use announce::announcement;
pub use presentation::{
    ActiveAlertState, AlertContent, ClearReason, PresentationEvent, SnoozeTicket,
};

const EVENT_BUFFER: usize = 64;

/// Dispatcher errors
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Reading or persisting the schedule failed; the trigger stays unfired
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// What a `deliver` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// This call flipped the fired bit and ran the channels
    Delivered { tier: Tier },
    /// No schedule for the event
    NoSchedule,
    /// Schedule has no such trigger
    UnknownTrigger,
    /// Someone else already delivered it
    AlreadyFired,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

struct ActivePresentation {
    state: ActiveAlertState,
    alert: AlertContent,
    auto_close: Option<JoinHandle<()>>,
}

struct PendingSnooze {
    id: Uuid,
    handle: JoinHandle<()>,
}

struct DispatcherInner {
    store: Arc<ScheduleStore>,
    channels: DeliveryChannels,
    clock: SharedClock,
    voice_locale: String,
    active: Mutex<Option<ActivePresentation>>,
    snoozes: DashMap<String, Vec<PendingSnooze>>,
    events: broadcast::Sender<PresentationEvent>,
}

/// Idempotent alert delivery
///
/// Cheap to clone; all clones share the same active-alert slot.
#[derive(Clone)]
pub struct AlertDispatcher {
    inner: Arc<DispatcherInner>,
}

impl AlertDispatcher {
    pub fn new(
        store: Arc<ScheduleStore>,
        channels: DeliveryChannels,
        clock: SharedClock,
        voice_locale: impl Into<String>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(DispatcherInner {
                store,
                channels,
                clock,
                voice_locale: voice_locale.into(),
                active: Mutex::new(None),
                snoozes: DashMap::new(),
                events,
            }),
        }
    }

    /// Subscribe to presentation changes
    pub fn subscribe(&self) -> broadcast::Receiver<PresentationEvent> {
        self.inner.events.subscribe()
    }

    /// The sustained alert currently presented, if any
    pub async fn active_alert(&self) -> Option<ActiveAlertState> {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .map(|p| p.state.clone())
    }

    /// Deliver one trigger, at most once over the lifetime of its schedule
    ///
    /// The fired bit is persisted before any channel runs, so a crash in the
    /// middle of delivery never causes a replay on the next sweep. Races with
    /// another caller for the same trigger resolve to exactly one winner.
    pub async fn deliver(
        &self,
        event_id: &str,
        label: TriggerLabel,
    ) -> Result<DeliveryOutcome, DispatchError> {
        let entry = match self.inner.store.mark_fired(event_id, label).await? {
            MarkFired::Marked(entry) => entry,
            MarkFired::NoSchedule => {
                debug!(%event_id, %label, "No schedule, skipping delivery");
                return Ok(DeliveryOutcome::NoSchedule);
            }
            MarkFired::UnknownTrigger => {
                debug!(%event_id, %label, "Trigger not in schedule, skipping delivery");
                return Ok(DeliveryOutcome::UnknownTrigger);
            }
            MarkFired::AlreadyFired => {
                debug!(%event_id, %label, "Trigger already fired");
                return Ok(DeliveryOutcome::AlreadyFired);
            }
        };

        let Some(trigger) = entry.trigger(label) else {
            return Ok(DeliveryOutcome::UnknownTrigger);
        };
        let alert = AlertContent::from_trigger(&entry, trigger);
        let tier = alert.tier;

        let lateness = self.inner.clock.now().signed_duration_since(alert.at_time);
        info!(
            %event_id,
            %label,
            %tier,
            late_secs = lateness.num_seconds().max(0),
            "Delivering alert"
        );

        self.present(alert, None).await;
        Ok(DeliveryOutcome::Delivered { tier })
    }

    /// Dismiss the active alert, stopping its channels
    pub async fn dismiss(&self) -> Option<ActiveAlertState> {
        let mut slot = self.inner.active.lock().await;
        let presentation = slot.take()?;
        let state = presentation.state.clone();
        self.teardown(presentation, ClearReason::Dismissed, true)
            .await;
        info!(event_id = %state.event_id, label = %state.label, "Alert dismissed");
        Some(state)
    }

    /// Snooze the active alert for `minutes`
    ///
    /// The alert is cleared now and presented again once the time is up,
    /// independently of the schedule's fired bits. The snooze lives only in
    /// memory; losing it on a crash is acceptable. Returns `None` when
    /// nothing is active or `minutes` is zero.
    pub async fn snooze(&self, minutes: u32) -> Option<SnoozeTicket> {
        if minutes == 0 {
            return None;
        }

        let mut slot = self.inner.active.lock().await;
        let presentation = slot.take()?;
        let alert = presentation.alert.clone();
        self.teardown(presentation, ClearReason::Snoozed, true).await;
        drop(slot);

        let delay = Duration::from_secs(u64::from(minutes) * 60);
        let due_at = self.inner.clock.now() + ChronoDuration::minutes(i64::from(minutes));
        let ticket = SnoozeTicket {
            id: Uuid::now_v7(),
            event_id: alert.event_id.clone(),
            label: alert.label,
            due_at,
        };

        let dispatcher = self.clone();
        let ticket_id = ticket.id;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if dispatcher.take_snooze(&alert.event_id, ticket_id) {
                debug!(event_id = %alert.event_id, label = %alert.label, "Snooze elapsed");
                dispatcher.present(alert, Some(due_at)).await;
            }
        });

        self.inner
            .snoozes
            .entry(ticket.event_id.clone())
            .or_default()
            .push(PendingSnooze {
                id: ticket.id,
                handle,
            });

        info!(
            event_id = %ticket.event_id,
            label = %ticket.label,
            minutes,
            "Alert snoozed"
        );
        Some(ticket)
    }

    /// Drop everything in flight for an event that was cancelled or moved
    ///
    /// Cancels pending snoozes and clears the active alert if it belongs to
    /// the event. Fired bits are untouched.
    pub async fn withdraw(&self, event_id: &str) {
        if let Some((_, pending)) = self.inner.snoozes.remove(event_id) {
            for snooze in pending {
                snooze.handle.abort();
            }
            debug!(%event_id, "Cancelled pending snoozes");
        }

        let mut slot = self.inner.active.lock().await;
        if slot.as_ref().is_some_and(|p| p.state.event_id == event_id) {
            if let Some(presentation) = slot.take() {
                self.teardown(presentation, ClearReason::Cancelled, true)
                    .await;
            }
        }
    }

    /// Number of snoozed re-deliveries waiting to fire
    pub fn pending_snoozes(&self) -> usize {
        self.inner.snoozes.iter().map(|s| s.value().len()).sum()
    }

    fn take_snooze(&self, event_id: &str, id: Uuid) -> bool {
        let mut found = false;
        if let Some(mut pending) = self.inner.snoozes.get_mut(event_id) {
            let before = pending.len();
            pending.retain(|s| s.id != id);
            found = pending.len() != before;
        }
        self.inner
            .snoozes
            .remove_if(event_id, |_, pending| pending.is_empty());
        found
    }

    /// Run the channels for `alert` and, for sustained tiers, occupy the slot
    async fn present(&self, alert: AlertContent, snoozed_until: Option<DateTime<Utc>>) {
        let settings = alert.tier.channels();

        if !alert.tier.is_sustained() {
            if self.inner.active.lock().await.is_some() {
                // Audio and vibration belong to the sustained alert
                debug!(event_id = %alert.event_id, "Sustained alert active, notifying only");
                self.announce(&alert, &settings).await;
                return;
            }
            self.start_channels(&alert, &settings).await;
            if let Some(delay) = settings.auto_close {
                self.spawn_transient_close(delay);
            }
            return;
        }

        let mut slot = self.inner.active.lock().await;
        if let Some(previous) = slot.take() {
            debug!(
                previous = %previous.state.event_id,
                next = %alert.event_id,
                "Replacing active alert"
            );
            self.teardown(previous, ClearReason::Replaced, true).await;
        }

        self.start_channels(&alert, &settings).await;

        let state = ActiveAlertState::new(&alert, self.inner.clock.now(), snoozed_until);
        let auto_close = settings
            .auto_close
            .map(|delay| self.spawn_auto_close(state.id, delay));

        *slot = Some(ActivePresentation {
            state: state.clone(),
            alert,
            auto_close,
        });
        drop(slot);

        let _ = self.inner.events.send(PresentationEvent::Presented(state));
    }

    async fn start_channels(&self, alert: &AlertContent, settings: &ChannelSettings) {
        let channels = &self.inner.channels;

        log_channel(
            "audio",
            &alert.event_id,
            channels.audio.start(alert.tier, &settings.audio).await,
        );
        log_channel(
            "vibration",
            &alert.event_id,
            channels
                .vibration
                .start(alert.tier, settings.vibration)
                .await,
        );

        self.announce(alert, settings).await;
    }

    /// Voice (if the tier has one) and, for transient tiers, `Notified`
    async fn announce(&self, alert: &AlertContent, settings: &ChannelSettings) {
        let channels = &self.inner.channels;
        let text = announcement(alert, self.inner.clock.now());
        if let Some(voice) = &settings.voice {
            log_channel(
                "voice",
                &alert.event_id,
                channels
                    .voice
                    .speak(&text, &self.inner.voice_locale, voice)
                    .await,
            );
        }

        if !alert.tier.is_sustained() {
            let _ = self.inner.events.send(PresentationEvent::Notified {
                event_id: alert.event_id.clone(),
                label: alert.label,
                title: alert.title.clone(),
                text,
            });
        }
    }

    async fn stop_channels(&self, event_id: &str) {
        let channels = &self.inner.channels;
        log_channel("audio", event_id, channels.audio.stop().await);
        log_channel("vibration", event_id, channels.vibration.stop().await);
    }

    /// Stop a presentation's channels and announce that it is gone
    ///
    /// `cancel_countdown` must be false when called from the countdown task
    /// itself, which would otherwise abort its own teardown.
    async fn teardown(
        &self,
        presentation: ActivePresentation,
        reason: ClearReason,
        cancel_countdown: bool,
    ) {
        if cancel_countdown {
            if let Some(handle) = presentation.auto_close {
                handle.abort();
            }
        }

        self.stop_channels(&presentation.state.event_id).await;

        let _ = self.inner.events.send(PresentationEvent::Cleared {
            alert_id: presentation.state.id,
            event_id: presentation.state.event_id,
            reason,
        });
    }

    fn spawn_auto_close(&self, alert_id: Uuid, delay: Duration) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            dispatcher.auto_close(alert_id).await;
        })
    }

    async fn auto_close(&self, alert_id: Uuid) {
        let mut slot = self.inner.active.lock().await;
        if slot.as_ref().map(|p| p.state.id) != Some(alert_id) {
            debug!(%alert_id, "Auto-close for a presentation that is already gone");
            return;
        }
        if let Some(presentation) = slot.take() {
            info!(event_id = %presentation.state.event_id, "Alert auto-closed");
            self.teardown(presentation, ClearReason::AutoClosed, false)
                .await;
        }
    }

    /// Transient alerts have no slot; stop their one-shot channels unless a
    /// sustained alert started meanwhile and now owns them
    fn spawn_transient_close(&self, delay: Duration) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let slot = dispatcher.inner.active.lock().await;
            if slot.is_none() {
                dispatcher.stop_channels("transient").await;
            }
        });
    }
}

fn log_channel(channel: &str, event_id: &str, result: Result<(), CapabilityError>) {
    match result {
        Ok(()) => {}
        Err(CapabilityError::Unsupported) => {
            debug!(%event_id, channel, "Channel unsupported on this platform");
        }
        Err(e) => {
            warn!(%event_id, channel, error = %e, "Delivery channel failed");
        }
    }
}
