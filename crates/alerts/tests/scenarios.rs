//! End-to-end alert scenarios
//!
//! Paused-time tests drive the live timers through [`TokioClock`]; restart
//! and recovery tests use [`ManualClock`] and explicit sweeps.

use std::sync::Arc;
use std::time::Duration;

use chime_alerts::testing::{ChannelCall, RecordingChannels};
use chime_alerts::{
    AlertEngineConfig, AlertService, Clock, DurableKvStore, EventRef, FileKvStore,
    InMemoryEventDirectory, InMemoryKvStore, ManualClock, PresentationEvent, ScheduleOutcome,
    SharedClock, Tier, TokioClock, TriggerLabel,
};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};

struct Harness {
    service: AlertService,
    channels: Arc<RecordingChannels>,
    directory: Arc<InMemoryEventDirectory>,
}

fn harness(kv: Arc<dyn DurableKvStore>, clock: SharedClock) -> Harness {
    let channels = RecordingChannels::new();
    let directory = Arc::new(InMemoryEventDirectory::new());
    let service = AlertService::new(
        AlertEngineConfig::default(),
        kv,
        channels.channels(),
        directory.clone(),
        clock,
    );
    Harness {
        service,
        channels,
        directory,
    }
}

fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
    ))
}

#[test_log::test(tokio::test(start_paused = true))]
async fn live_timer_delivers_fifteen_minute_alert_on_time() {
    let clock = Arc::new(TokioClock::new());
    let h = harness(Arc::new(InMemoryKvStore::new()), clock.clone());

    let event = EventRef::new("E1", "Design review", clock.now() + ChronoDuration::minutes(20));
    h.directory.upsert(event.clone());
    let outcome = h.service.schedule_event(&event).await.unwrap();
    assert_eq!(outcome, ScheduleOutcome::Scheduled { triggers: 4, armed: 4 });

    let entry = h.service.store().load("E1").await.unwrap().unwrap();
    let labels: Vec<_> = entry.trigger_times.iter().map(|t| t.label).collect();
    assert_eq!(
        labels,
        vec![
            TriggerLabel::FifteenMinutes,
            TriggerLabel::FiveMinutes,
            TriggerLabel::OneMinute,
            TriggerLabel::Now,
        ]
    );

    // At +15 min the 5min trigger is due as well; stop one minute short
    tokio::time::sleep(Duration::from_secs(14 * 60)).await;

    assert_eq!(h.channels.audio_starts(), vec![Tier::Medium]);
    let entry = h.service.store().load("E1").await.unwrap().unwrap();
    assert!(entry.trigger(TriggerLabel::FifteenMinutes).unwrap().fired);
    assert!(!entry.trigger(TriggerLabel::FiveMinutes).unwrap().fired);

    let active = h.service.active_alert().await.unwrap();
    assert_eq!(active.label, TriggerLabel::FifteenMinutes);
    assert_eq!(active.title, "Design review");
}

#[test_log::test(tokio::test)]
async fn missed_alert_is_recovered_once_after_downtime() {
    let clock = manual_clock();
    let kv: Arc<dyn DurableKvStore> = Arc::new(InMemoryKvStore::new());
    let event = EventRef::new("E2", "1:1", clock.now() + ChronoDuration::minutes(13));

    {
        let first = harness(kv.clone(), clock.clone());
        first.service.schedule_event(&event).await.unwrap();
    }

    // Process was down for ten minutes; the 5min trigger passed unseen
    clock.advance(ChronoDuration::minutes(10));
    let second = harness(kv, clock.clone());
    second.directory.upsert(event);

    let report = second.service.reconcile_now().await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(second.channels.audio_starts(), vec![Tier::Medium]);
    assert_eq!(
        second.channels.spoken(),
        vec!["1:1 starts in 3 minutes".to_string()]
    );

    let again = second.service.reconcile_now().await.unwrap();
    assert_eq!(again.delivered, 0);
    assert_eq!(second.channels.audio_starts().len(), 1);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn snoozed_alert_comes_back_without_touching_fired_bits() {
    let clock = Arc::new(TokioClock::new());
    let h = harness(Arc::new(InMemoryKvStore::new()), clock.clone());
    let mut events = h.service.subscribe();

    let event = EventRef::new("E3", "Launch", clock.now() + ChronoDuration::seconds(30));
    h.service.schedule_event(&event).await.unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;
    let active = h.service.active_alert().await.unwrap();
    assert_eq!(active.tier, Tier::Maximum);
    assert_eq!(active.label, TriggerLabel::Now);

    let ticket = h.service.snooze(5).await.unwrap();
    assert_eq!(ticket.label, TriggerLabel::Now);
    assert!(h.service.active_alert().await.is_none());
    assert_eq!(h.channels.count(&ChannelCall::AudioStop), 1);
    assert_eq!(h.channels.count(&ChannelCall::VibrationStop), 1);

    tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;

    let again = h.service.active_alert().await.unwrap();
    assert_eq!(again.label, TriggerLabel::Now);
    assert_eq!(again.snoozed_until, Some(ticket.due_at));
    assert_ne!(again.id, active.id);
    assert_eq!(h.channels.audio_starts(), vec![Tier::Maximum, Tier::Maximum]);

    let entry = h.service.store().load("E3").await.unwrap().unwrap();
    assert!(entry.trigger(TriggerLabel::Now).unwrap().fired);

    let mut presented = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, PresentationEvent::Presented(_)) {
            presented += 1;
        }
    }
    assert_eq!(presented, 2);
}

#[test_log::test(tokio::test)]
async fn deleted_event_schedule_is_dropped_without_alerting() {
    let clock = manual_clock();
    let h = harness(Arc::new(InMemoryKvStore::new()), clock.clone());

    let event = EventRef::new("E4", "Gone", clock.now() + ChronoDuration::hours(2));
    h.service.schedule_event(&event).await.unwrap();

    // Never added to the directory, so upstream considers it deleted
    clock.advance(ChronoDuration::minutes(61));
    let report = h.service.reconcile_now().await.unwrap();

    assert_eq!(report.orphaned, 1);
    assert_eq!(report.delivered, 0);
    assert!(h.channels.calls().is_empty());
    assert_eq!(h.service.store().load("E4").await.unwrap(), None);
}

#[test_log::test(tokio::test)]
async fn retention_sweep_bounds_storage() {
    let clock = manual_clock();
    let h = harness(Arc::new(InMemoryKvStore::new()), clock.clone());

    for (id, offset) in [("old", 1), ("fresh", 3)] {
        let event = EventRef::new(id, id, clock.now() + ChronoDuration::days(offset));
        h.service.schedule_event(&event).await.unwrap();
        clock.advance(ChronoDuration::days(2));
    }

    // "old" was created 8 days ago, "fresh" 6 days ago
    clock.advance(ChronoDuration::days(4));
    let report = h.service.collect_now().await.unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.removed, 1);
    assert_eq!(
        h.service.store().list_keys().await.unwrap(),
        vec!["fresh".to_string()]
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn restarted_service_rearms_persisted_schedules() {
    let clock = Arc::new(TokioClock::new());
    let kv: Arc<dyn DurableKvStore> = Arc::new(InMemoryKvStore::new());
    let event = EventRef::new("E5", "Planning", clock.now() + ChronoDuration::minutes(20));

    {
        let first = harness(kv.clone(), clock.clone());
        first.directory.upsert(event.clone());
        first.service.schedule_event(&event).await.unwrap();
        first.service.start().await.unwrap();
        first.service.shutdown().await.unwrap();
        assert!(first.channels.calls().is_empty());
    }

    let second = harness(kv, clock.clone());
    second.directory.upsert(event);
    second.service.start().await.unwrap();
    assert_eq!(second.service.timers().armed_count(), 4);

    tokio::time::sleep(Duration::from_secs(6 * 60)).await;
    assert_eq!(second.channels.audio_starts(), vec![Tier::Medium]);

    second.service.shutdown().await.unwrap();
}

#[test_log::test(tokio::test(start_paused = true))]
async fn restart_drops_schedule_of_event_deleted_while_down() {
    let clock = Arc::new(TokioClock::new());
    let kv: Arc<dyn DurableKvStore> = Arc::new(InMemoryKvStore::new());
    let event = EventRef::new("E7", "Cancelled sync", clock.now() + ChronoDuration::minutes(20));

    {
        let first = harness(kv.clone(), clock.clone());
        first.directory.upsert(event.clone());
        first.service.schedule_event(&event).await.unwrap();
    }

    // Upstream no longer knows the event; none of its triggers is due yet
    let second = harness(kv, clock.clone());
    second.service.start().await.unwrap();
    assert_eq!(second.service.timers().armed_count(), 0);

    tokio::time::sleep(Duration::from_secs(6 * 60)).await;

    assert!(second.channels.calls().is_empty());
    assert_eq!(second.service.store().load("E7").await.unwrap(), None);
    second.service.shutdown().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = manual_clock();
    let event = EventRef::new("E6", "Retro", clock.now() + ChronoDuration::minutes(30))
        .with_location("Room 4");

    {
        let kv = Arc::new(FileKvStore::open(dir.path()).await.unwrap());
        let first = harness(kv, clock.clone());
        first.service.schedule_event(&event).await.unwrap();
    }

    clock.advance(ChronoDuration::minutes(17));
    let kv = Arc::new(FileKvStore::open(dir.path()).await.unwrap());
    let second = harness(kv, clock.clone());
    second.directory.upsert(event);

    let report = second.service.reconcile_now().await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(
        second.channels.spoken(),
        vec!["Retro starts in 13 minutes. Location: Room 4".to_string()]
    );

    let entry = second.service.store().load("E6").await.unwrap().unwrap();
    assert!(entry.trigger(TriggerLabel::FifteenMinutes).unwrap().fired);
}
