//! # Chime Alerts
//!
//! Escalating meeting alerts that are delivered exactly once, even when the
//! process is killed and restarted in between.
//!
//! ## Features
//!
//! - **Static escalation policy**: six trigger moments from one day out to the start time, in three intensity tiers
//! - **Durable schedules**: one record per event with a fired bit per trigger, over any key-value capability
//! - **Live timers**: on-time delivery while the process runs
//! - **Missed-alert recovery**: a periodic sweep delivers whatever the timers missed
//! - **Retention**: stale schedules are collected so storage stays bounded
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       AlertService                           │
//! │  (schedule / reschedule / cancel, sweep loops, lifecycle)   │
//! └─────────────────────────────────────────────────────────────┘
//!            │                  │                   │
//!            ▼                  ▼                   ▼
//! ┌──────────────────┐ ┌─────────────────┐ ┌──────────────────┐
//! │ SchedulePlanner  │ │ LiveTimerEngine │ │ MissedAlert-     │
//! │ (policy → times) │ │ (in-process)    │ │ Reconciler       │
//! └──────────────────┘ └─────────────────┘ └──────────────────┘
//!                               │                   │
//!                               ▼                   ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     AlertDispatcher                          │
//! │  (fired check-and-set, channels, single active alert)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScheduleStore                           │
//! │  (JSON records over DurableKvStore: memory or files)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use chime_alerts::prelude::*;
//!
//! let kv = Arc::new(FileKvStore::open("/var/lib/chime").await?);
//! let service = AlertService::new(
//!     AlertEngineConfig::default(),
//!     kv,
//!     channels,
//!     directory,
//!     Arc::new(SystemClock),
//! );
//! service.start().await?;
//!
//! let standup = EventRef::new("evt-42", "Standup", start_at).with_location("Room 4");
//! service.schedule_event(&standup).await?;
//! ```

pub mod capability;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod model;
pub mod persistence;
pub mod planner;
pub mod policy;
pub mod service;
pub mod sweep;
pub mod testing;
pub mod timer;

/// Prelude for common imports
pub mod prelude {
    pub use crate::capability::{
        AudioAlarm, CapabilityError, DeliveryChannels, SilentVoice, Vibration, VoiceAnnouncement,
    };
    pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock, TokioClock};
    pub use crate::config::AlertEngineConfig;
    pub use crate::dispatcher::{
        ActiveAlertState, AlertDispatcher, ClearReason, DeliveryOutcome, PresentationEvent,
        SnoozeTicket,
    };
    pub use crate::events::{DirectoryError, EventDirectory, InMemoryEventDirectory};
    pub use crate::model::{EventRef, ScheduleEntry, TriggerTime};
    pub use crate::persistence::{
        DurableKvStore, FileKvStore, InMemoryKvStore, KvError, ScheduleStore, StoreError,
    };
    pub use crate::policy::{Tier, TriggerLabel};
    pub use crate::service::{
        AlertService, RescanReport, ScheduleOutcome, ServiceError, ServiceStatus,
    };
}

// Re-export key types at crate root
pub use capability::{
    AudioAlarm, CapabilityError, DeliveryChannels, SilentVoice, Vibration, VoiceAnnouncement,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock, TokioClock};
pub use config::AlertEngineConfig;
pub use dispatcher::{
    announcement, ActiveAlertState, AlertContent, AlertDispatcher, ClearReason, DeliveryOutcome,
    DispatchError, PresentationEvent, SnoozeTicket,
};
pub use events::{DirectoryError, EventDirectory, InMemoryEventDirectory};
pub use model::{EventRef, ScheduleEntry, TriggerTime};
pub use persistence::{
    DurableKvStore, FileKvStore, InMemoryKvStore, KvError, MarkFired, ScheduleSnapshot,
    ScheduleStore, StoreError,
};
pub use planner::{PlanError, SchedulePlanner};
pub use policy::{
    triggers_for, AudioProfile, ChannelSettings, PlannedTrigger, PresentationStyle, Tier,
    TriggerLabel, TriggerSpec, UnknownLabel, VibrationPattern, VoiceProfile, VolumeRamp,
    ESCALATION_POLICY,
};
pub use service::{AlertService, RescanReport, ScheduleOutcome, ServiceError, ServiceStatus};
pub use sweep::{CollectReport, MissedAlertReconciler, ReconcileReport, StaleScheduleCollector};
pub use timer::LiveTimerEngine;
