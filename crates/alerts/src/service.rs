//! Alert service
//!
//! Wires planner, store, live timers, dispatcher and the two sweeps together
//! and exposes the entry points the event subsystem calls when events are
//! created, moved or cancelled.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         AlertService                          │
//! │                                                               │
//! │  schedule_event ─► SchedulePlanner ─► ScheduleStore ─► arm    │
//! │                                                      │        │
//! │  ┌────────────────┐  ┌────────────────┐  ┌──────────▼──────┐  │
//! │  │ Reconcile loop │  │  Collect loop  │  │ LiveTimerEngine │  │
//! │  │    (5 min)     │  │    (1 hour)    │  │ (per trigger)   │  │
//! │  └───────┬────────┘  └────────────────┘  └────────┬────────┘  │
//! │          │                                        │           │
//! │          ▼                                        ▼           │
//! │  ┌─────────────────────────────────────────────────────────┐  │
//! │  │                    AlertDispatcher                      │  │
//! │  │   (fired check-and-set, channels, active-alert slot)    │  │
//! │  └─────────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::capability::DeliveryChannels;
use crate::clock::SharedClock;
use crate::config::AlertEngineConfig;
use crate::dispatcher::{ActiveAlertState, AlertDispatcher, PresentationEvent, SnoozeTicket};
use crate::events::EventDirectory;
use crate::model::EventRef;
use crate::persistence::{DurableKvStore, ScheduleStore, StoreError};
use crate::planner::{PlanError, SchedulePlanner};
use crate::sweep::{
    CollectReport, MissedAlertReconciler, ReconcileReport, StaleScheduleCollector,
};
use crate::timer::LiveTimerEngine;

/// Service errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Service already running
    #[error("alert service is already running")]
    AlreadyRunning,

    /// Background loops did not stop in time
    #[error("graceful shutdown timed out")]
    ShutdownTimeout,

    /// A background loop ended abnormally before shutdown
    #[error("background loop failed: {0}")]
    LoopFailed(String),
}

/// Service status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Background loops are not running
    Stopped,
    /// Sweeps are running and timers are armed
    Running,
    /// Shutdown in progress
    Draining,
}

/// Result of asking the service to schedule an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Schedule persisted and `armed` live timers started
    Scheduled { triggers: usize, armed: usize },
    /// Starts beyond the lookahead horizon; a later rescan will plan it
    OutsideHorizon,
    /// No trigger moment left in the future
    NothingToSchedule,
    /// A schedule already exists for this event
    AlreadyScheduled,
}

/// Counts from a rescan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescanReport {
    pub scheduled: usize,
    pub already_scheduled: usize,
    pub outside_horizon: usize,
    pub failed: usize,
}

/// The alert scheduling and escalation engine
///
/// # Example
///
/// ```ignore
/// use chime_alerts::prelude::*;
///
/// let service = AlertService::new(config, kv, channels, directory, Arc::new(SystemClock));
/// service.start().await?;
///
/// service.schedule_event(&EventRef::new("evt-1", "Standup", start_at)).await?;
///
/// // ... on shutdown
/// service.shutdown().await?;
/// ```
pub struct AlertService {
    config: AlertEngineConfig,
    store: Arc<ScheduleStore>,
    planner: SchedulePlanner,
    dispatcher: AlertDispatcher,
    timers: LiveTimerEngine,
    directory: Arc<dyn EventDirectory>,
    reconciler: Arc<MissedAlertReconciler>,
    collector: Arc<StaleScheduleCollector>,
    shutdown_tx: watch::Sender<bool>,
    status: RwLock<ServiceStatus>,
    reconcile_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
    collect_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl AlertService {
    /// Build the full component graph over the supplied capabilities
    pub fn new(
        config: AlertEngineConfig,
        kv: Arc<dyn DurableKvStore>,
        channels: DeliveryChannels,
        directory: Arc<dyn EventDirectory>,
        clock: SharedClock,
    ) -> Self {
        let store = Arc::new(ScheduleStore::new(kv));
        let planner = SchedulePlanner::new(clock.clone(), config.lookahead);
        let dispatcher = AlertDispatcher::new(
            store.clone(),
            channels,
            clock.clone(),
            config.voice_locale.clone(),
        );
        let timers = LiveTimerEngine::new(dispatcher.clone(), clock.clone());
        let reconciler = Arc::new(MissedAlertReconciler::new(
            store.clone(),
            dispatcher.clone(),
            directory.clone(),
            clock.clone(),
        ));
        let collector = Arc::new(StaleScheduleCollector::new(
            store.clone(),
            clock,
            config.retention,
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            store,
            planner,
            dispatcher,
            timers,
            directory,
            reconciler,
            collector,
            shutdown_tx,
            status: RwLock::new(ServiceStatus::Stopped),
            reconcile_handle: parking_lot::Mutex::new(None),
            collect_handle: parking_lot::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AlertEngineConfig {
        &self.config
    }

    pub fn status(&self) -> ServiceStatus {
        *self.status.read()
    }

    pub fn store(&self) -> &Arc<ScheduleStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    pub fn timers(&self) -> &LiveTimerEngine {
        &self.timers
    }

    /// Restore timers, then start the periodic sweeps
    ///
    /// The reconciliation loop's first tick is immediate, so anything missed
    /// while the process was down is delivered right away.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), ServiceError> {
        {
            let mut status = self.status.write();
            if *status != ServiceStatus::Stopped {
                return Err(ServiceError::AlreadyRunning);
            }
            *status = ServiceStatus::Running;
        }
        self.shutdown_tx.send_replace(false);

        info!(
            reconcile_secs = self.config.effective_reconcile_interval().as_secs(),
            collect_secs = self.config.effective_collect_interval().as_secs(),
            "Starting alert service"
        );

        match self.restore().await {
            Ok(armed) => info!(armed, "Restored live timers from store"),
            Err(e) => warn!(error = %e, "Could not restore timers, relying on reconciliation"),
        }

        self.start_reconcile_loop();
        self.start_collect_loop();
        Ok(())
    }

    /// Stop the sweeps and cancel every live timer
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        {
            let mut status = self.status.write();
            if *status == ServiceStatus::Stopped {
                return Ok(());
            }
            *status = ServiceStatus::Draining;
        }

        info!("Stopping alert service");
        self.shutdown_tx.send_replace(true);

        let handles: Vec<JoinHandle<()>> = [
            self.reconcile_handle.lock().take(),
            self.collect_handle.lock().take(),
        ]
        .into_iter()
        .flatten()
        .collect();

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        let mut timed_out = false;
        let mut failure = None;
        for handle in handles {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Background loop ended abnormally");
                    failure = Some(e.to_string());
                }
                Err(_) => timed_out = true,
            }
        }

        let cancelled = self.timers.disarm_all();
        debug!(cancelled, "Cancelled live timers");
        *self.status.write() = ServiceStatus::Stopped;

        if timed_out {
            warn!("Background loops did not stop in time");
            return Err(ServiceError::ShutdownTimeout);
        }
        if let Some(e) = failure {
            return Err(ServiceError::LoopFailed(e));
        }
        info!("Alert service stopped");
        Ok(())
    }

    /// Arm live timers for every persisted schedule whose event still exists
    ///
    /// Schedules of events that disappeared while the process was down are
    /// deleted instead. If the directory cannot answer, the entry is armed
    /// and the reconciliation sweep decides later. Returns the number of
    /// timers armed.
    pub async fn restore(&self) -> Result<usize, ServiceError> {
        let snapshot = self.store.load_all().await?;
        let mut armed = 0;

        for entry in &snapshot.entries {
            match self.directory.lookup(&entry.event_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    info!(event_id = %entry.event_id, "Event no longer exists, dropping schedule");
                    if let Err(e) = self.store.delete(&entry.event_id).await {
                        warn!(event_id = %entry.event_id, error = %e, "Failed to drop orphaned schedule");
                    }
                    continue;
                }
                Err(e) => {
                    warn!(event_id = %entry.event_id, error = %e, "Event lookup failed, arming anyway");
                }
            }
            armed += self.timers.arm(entry);
        }

        Ok(armed)
    }

    /// Plan, persist and arm a newly seen event
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn schedule_event(&self, event: &EventRef) -> Result<ScheduleOutcome, ServiceError> {
        if self.store.load(&event.id).await?.is_some() {
            return Ok(ScheduleOutcome::AlreadyScheduled);
        }
        self.plan_and_arm(event).await
    }

    /// Replace the schedule of an event whose start time changed
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn reschedule_event(
        &self,
        event: &EventRef,
    ) -> Result<ScheduleOutcome, ServiceError> {
        self.drop_schedule(&event.id).await?;
        self.plan_and_arm(event).await
    }

    /// Forget an event that was cancelled upstream
    #[instrument(skip(self))]
    pub async fn cancel_event(&self, event_id: &str) -> Result<(), ServiceError> {
        self.drop_schedule(event_id).await?;
        info!(%event_id, "Event cancelled, schedule removed");
        Ok(())
    }

    /// Plan events that entered the lookahead window since they were last seen
    pub async fn rescan(&self, events: &[EventRef]) -> Result<RescanReport, ServiceError> {
        let known: HashSet<String> = self.store.list_keys().await?.into_iter().collect();
        let mut report = RescanReport::default();

        for event in events {
            if known.contains(&event.id) {
                report.already_scheduled += 1;
                continue;
            }
            if !self.planner.within_horizon(event) {
                report.outside_horizon += 1;
                continue;
            }
            match self.plan_and_arm(event).await {
                Ok(ScheduleOutcome::Scheduled { .. }) => report.scheduled += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "Failed to schedule event during rescan");
                    report.failed += 1;
                }
            }
        }

        if report.scheduled > 0 {
            info!(scheduled = report.scheduled, "Rescan scheduled new events");
        }
        Ok(report)
    }

    /// Run a reconciliation sweep now
    pub async fn reconcile_now(&self) -> Result<ReconcileReport, ServiceError> {
        Ok(self.reconciler.sweep().await?)
    }

    /// Run a retention sweep now
    pub async fn collect_now(&self) -> Result<CollectReport, ServiceError> {
        Ok(self.collector.collect().await?)
    }

    pub async fn active_alert(&self) -> Option<ActiveAlertState> {
        self.dispatcher.active_alert().await
    }

    pub async fn dismiss(&self) -> Option<ActiveAlertState> {
        self.dispatcher.dismiss().await
    }

    pub async fn snooze(&self, minutes: u32) -> Option<SnoozeTicket> {
        self.dispatcher.snooze(minutes).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresentationEvent> {
        self.dispatcher.subscribe()
    }

    async fn plan_and_arm(&self, event: &EventRef) -> Result<ScheduleOutcome, ServiceError> {
        let entry = match self.planner.plan(event) {
            Ok(entry) => entry,
            Err(PlanError::BeyondHorizon { .. }) => {
                debug!(event_id = %event.id, "Event beyond lookahead horizon");
                return Ok(ScheduleOutcome::OutsideHorizon);
            }
            Err(PlanError::NothingToSchedule { .. }) => {
                debug!(event_id = %event.id, "Event has no future trigger");
                return Ok(ScheduleOutcome::NothingToSchedule);
            }
        };

        self.store.save(&entry).await?;
        let armed = self.timers.arm(&entry);
        info!(
            event_id = %event.id,
            triggers = entry.trigger_times.len(),
            armed,
            "Scheduled alerts"
        );
        Ok(ScheduleOutcome::Scheduled {
            triggers: entry.trigger_times.len(),
            armed,
        })
    }

    async fn drop_schedule(&self, event_id: &str) -> Result<(), ServiceError> {
        self.timers.disarm(event_id);
        self.dispatcher.withdraw(event_id).await;
        self.store.delete(event_id).await?;
        Ok(())
    }

    fn start_reconcile_loop(&self) {
        let reconciler = Arc::clone(&self.reconciler);
        let interval = self.config.effective_reconcile_interval();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = reconciler.sweep().await {
                            error!("Reconciliation sweep failed: {}", e);
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Reconcile loop: shutdown requested");
                        break;
                    }
                }
            }

            debug!("Reconcile loop exited");
        });

        *self.reconcile_handle.lock() = Some(handle);
    }

    fn start_collect_loop(&self) {
        let collector = Arc::clone(&self.collector);
        let interval = self.config.effective_collect_interval();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = collector.collect().await {
                            error!("Retention sweep failed: {}", e);
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Collect loop: shutdown requested");
                        break;
                    }
                }
            }

            debug!("Collect loop exited");
        });

        *self.collect_handle.lock() = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, TokioClock};
    use crate::events::InMemoryEventDirectory;
    use crate::persistence::InMemoryKvStore;
    use crate::policy::TriggerLabel;
    use crate::testing::RecordingChannels;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    struct Fixture {
        service: AlertService,
        channels: Arc<RecordingChannels>,
        clock: Arc<TokioClock>,
    }

    fn fixture() -> Fixture {
        let channels = RecordingChannels::new();
        let clock = Arc::new(TokioClock::new());
        let service = AlertService::new(
            AlertEngineConfig::default(),
            Arc::new(InMemoryKvStore::new()),
            channels.channels(),
            Arc::new(InMemoryEventDirectory::new()),
            clock.clone(),
        );
        Fixture {
            service,
            channels,
            clock,
        }
    }

    fn event(clock: &TokioClock, id: &str, start_in: ChronoDuration) -> EventRef {
        EventRef::new(id, format!("Meeting {id}"), clock.now() + start_in)
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_event_outcomes() {
        let f = fixture();

        let outcome = f
            .service
            .schedule_event(&event(&f.clock, "soon", ChronoDuration::minutes(20)))
            .await
            .unwrap();
        assert_eq!(outcome, ScheduleOutcome::Scheduled { triggers: 4, armed: 4 });

        let again = f
            .service
            .schedule_event(&event(&f.clock, "soon", ChronoDuration::minutes(20)))
            .await
            .unwrap();
        assert_eq!(again, ScheduleOutcome::AlreadyScheduled);

        let far = f
            .service
            .schedule_event(&event(&f.clock, "far", ChronoDuration::days(10)))
            .await
            .unwrap();
        assert_eq!(far, ScheduleOutcome::OutsideHorizon);

        let past = f
            .service
            .schedule_event(&event(&f.clock, "past", ChronoDuration::minutes(-5)))
            .await
            .unwrap();
        assert_eq!(past, ScheduleOutcome::NothingToSchedule);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_timers_and_schedule() {
        let f = fixture();
        f.service
            .schedule_event(&event(&f.clock, "e1", ChronoDuration::minutes(20)))
            .await
            .unwrap();

        let moved = event(&f.clock, "e1", ChronoDuration::hours(3));
        let outcome = f.service.reschedule_event(&moved).await.unwrap();
        assert_eq!(outcome, ScheduleOutcome::Scheduled { triggers: 5, armed: 5 });

        // Old 15min moment passes without delivery
        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        assert!(f.channels.calls().is_empty());

        let entry = f.service.store().load("e1").await.unwrap().unwrap();
        assert_eq!(entry.start_at, moved.start_at);
        assert!(entry.trigger(TriggerLabel::OneHour).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_removes_everything() {
        let f = fixture();
        f.service
            .schedule_event(&event(&f.clock, "e1", ChronoDuration::minutes(20)))
            .await
            .unwrap();

        f.service.cancel_event("e1").await.unwrap();

        assert_eq!(f.service.timers().armed_count(), 0);
        assert_eq!(f.service.store().load("e1").await.unwrap(), None);
        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        assert!(f.channels.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescan_plans_events_entering_window() {
        let f = fixture();
        let events = vec![
            event(&f.clock, "near", ChronoDuration::hours(2)),
            event(&f.clock, "far", ChronoDuration::days(9)),
        ];

        let first = f.service.rescan(&events).await.unwrap();
        assert_eq!(first.scheduled, 1);
        assert_eq!(first.outside_horizon, 1);

        let second = f.service.rescan(&events).await.unwrap();
        assert_eq!(second.scheduled, 0);
        assert_eq!(second.already_scheduled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_fails_and_shutdown_stops() {
        let f = fixture();
        f.service.start().await.unwrap();
        assert_eq!(f.service.status(), ServiceStatus::Running);
        assert!(matches!(
            f.service.start().await,
            Err(ServiceError::AlreadyRunning)
        ));

        f.service
            .schedule_event(&event(&f.clock, "e1", ChronoDuration::minutes(20)))
            .await
            .unwrap();

        f.service.shutdown().await.unwrap();
        assert_eq!(f.service.status(), ServiceStatus::Stopped);
        assert_eq!(f.service.timers().armed_count(), 0);
        f.service.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_intervals_keep_loops_alive() {
        let json = r#"{
            "lookahead": 604800000,
            "retention": 604800000,
            "reconcile_interval": 0,
            "collect_interval": 0,
            "voice_locale": "en-US",
            "shutdown_timeout": 5000
        }"#;
        let config: AlertEngineConfig = serde_json::from_str(json).unwrap();
        let service = AlertService::new(
            config,
            Arc::new(InMemoryKvStore::new()),
            RecordingChannels::new().channels(),
            Arc::new(InMemoryEventDirectory::new()),
            Arc::new(TokioClock::new()),
        );

        service.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        service.shutdown().await.unwrap();
        assert_eq!(service.status(), ServiceStatus::Stopped);
    }
}
