//! Live timer engine
//!
//! In-process delayed callbacks for the unfired future triggers of armed
//! schedules. Nothing here is persisted: if the process dies the timers die
//! with it, and the reconciliation sweep delivers whatever they missed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::clock::SharedClock;
use crate::dispatcher::AlertDispatcher;
use crate::model::ScheduleEntry;
use crate::policy::TriggerLabel;

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

type TimerRegistry = DashMap<String, HashMap<TriggerLabel, ArmedTimer>>;

/// Owns every outstanding per-trigger callback
///
/// At most one callback exists per (event, label): arming an event first
/// disarms whatever was armed for it before.
pub struct LiveTimerEngine {
    dispatcher: AlertDispatcher,
    clock: SharedClock,
    timers: Arc<TimerRegistry>,
    next_generation: AtomicU64,
}

impl LiveTimerEngine {
    pub fn new(dispatcher: AlertDispatcher, clock: SharedClock) -> Self {
        Self {
            dispatcher,
            clock,
            timers: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Arm one callback per unfired future trigger of `entry`
    ///
    /// Returns the number of callbacks armed.
    pub fn arm(&self, entry: &ScheduleEntry) -> usize {
        self.disarm(&entry.event_id);

        let now = self.clock.now();
        let upcoming: Vec<_> = entry.upcoming(now).cloned().collect();
        if upcoming.is_empty() {
            return 0;
        }

        // Holding the registry slot while spawning keeps a zero-delay timer
        // from deregistering itself before it was registered
        let mut slot = self.timers.entry(entry.event_id.clone()).or_default();
        for trigger in &upcoming {
            let delay = trigger
                .at_time
                .signed_duration_since(now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            let handle = self.spawn_timer(entry.event_id.clone(), trigger.label, generation, delay);
            slot.insert(trigger.label, ArmedTimer { generation, handle });
        }
        drop(slot);

        debug!(
            event_id = %entry.event_id,
            armed = upcoming.len(),
            "Armed live timers"
        );
        upcoming.len()
    }

    /// Cancel every outstanding callback for an event
    pub fn disarm(&self, event_id: &str) -> usize {
        match self.timers.remove(event_id) {
            Some((_, timers)) => {
                let count = timers.len();
                for timer in timers.into_values() {
                    timer.handle.abort();
                }
                debug!(%event_id, cancelled = count, "Disarmed live timers");
                count
            }
            None => 0,
        }
    }

    /// Cancel every outstanding callback (shutdown)
    pub fn disarm_all(&self) -> usize {
        let event_ids: Vec<String> = self.timers.iter().map(|t| t.key().clone()).collect();
        event_ids.iter().map(|id| self.disarm(id)).sum()
    }

    /// Number of outstanding callbacks across all events
    pub fn armed_count(&self) -> usize {
        self.timers.iter().map(|t| t.value().len()).sum()
    }

    pub fn is_armed(&self, event_id: &str, label: TriggerLabel) -> bool {
        self.timers
            .get(event_id)
            .is_some_and(|timers| timers.contains_key(&label))
    }

    fn spawn_timer(
        &self,
        event_id: String,
        label: TriggerLabel,
        generation: u64,
        delay: Duration,
    ) -> JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        let timers = Arc::clone(&self.timers);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Deregister before delivering so a later disarm cannot abort a
            // delivery halfway through
            deregister(&timers, &event_id, label, generation);

            match dispatcher.deliver(&event_id, label).await {
                Ok(outcome) => {
                    debug!(%event_id, %label, ?outcome, "Live timer fired");
                }
                Err(e) => {
                    // Fired bit not set; the next reconciliation sweep retries
                    error!(%event_id, %label, error = %e, "Live timer delivery failed");
                }
            }
        })
    }
}

fn deregister(timers: &TimerRegistry, event_id: &str, label: TriggerLabel, generation: u64) {
    if let Some(mut armed) = timers.get_mut(event_id) {
        if armed
            .get(&label)
            .is_some_and(|timer| timer.generation == generation)
        {
            armed.remove(&label);
        }
    }
    timers.remove_if(event_id, |_, armed| armed.is_empty());
}

impl Drop for LiveTimerEngine {
    fn drop(&mut self) {
        self.disarm_all();
    }
}
