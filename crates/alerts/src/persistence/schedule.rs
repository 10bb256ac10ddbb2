//! Typed schedule persistence over a [`DurableKvStore`]

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::kv::{DurableKvStore, KvError};
use crate::model::ScheduleEntry;
use crate::policy::TriggerLabel;

const KEY_PREFIX: &str = "schedule/";

/// Error type for schedule store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend read/write failed; transient, retried on the next sweep
    #[error("storage error: {0}")]
    Kv(#[from] KvError),

    /// Entry could not be encoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Outcome of the guarded check-and-set on a trigger's fired bit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkFired {
    /// Bit flipped and persisted; carries the updated entry
    Marked(ScheduleEntry),
    /// No schedule for this event (cancelled, deleted or malformed)
    NoSchedule,
    /// Schedule exists but has no trigger with this label
    UnknownTrigger,
    /// Another caller already fired this trigger
    AlreadyFired,
}

/// Result of reading every schedule
#[derive(Debug, Default)]
pub struct ScheduleSnapshot {
    pub entries: Vec<ScheduleEntry>,
    /// Keys whose value failed to decode and were deleted
    pub purged_malformed: usize,
    /// Keys that could not be read this time
    pub failed_keys: usize,
}

/// One durable [`ScheduleEntry`] per event id
///
/// Performs no implicit invalidation: when an event moves or disappears the
/// owner of that change must `delete` (and possibly re-plan and `save`).
/// Read-modify-write operations on the same event are serialised, so the
/// fired bit can only ever flip once.
pub struct ScheduleStore {
    kv: Arc<dyn DurableKvStore>,
    guards: DashMap<String, Arc<Mutex<()>>>,
}

impl ScheduleStore {
    pub fn new(kv: Arc<dyn DurableKvStore>) -> Self {
        Self {
            kv,
            guards: DashMap::new(),
        }
    }

    fn key(event_id: &str) -> String {
        format!("{KEY_PREFIX}{event_id}")
    }

    fn guard(&self, event_id: &str) -> Arc<Mutex<()>> {
        self.guards
            .entry(event_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_guard(&self, event_id: &str) {
        self.guards
            .remove_if(event_id, |_, guard| Arc::strong_count(guard) == 1);
    }

    /// Persist an entry, replacing any previous one for the same event
    pub async fn save(&self, entry: &ScheduleEntry) -> Result<(), StoreError> {
        let guard = self.guard(&entry.event_id);
        let _held = guard.lock().await;
        self.write(entry).await
    }

    /// Load the entry for an event
    ///
    /// A value that fails to decode is deleted and reported as absent.
    pub async fn load(&self, event_id: &str) -> Result<Option<ScheduleEntry>, StoreError> {
        self.read(event_id).await
    }

    /// Load every entry
    ///
    /// Only a failure to enumerate keys is an error; per-key problems are
    /// counted in the snapshot and the remaining keys are still read.
    pub async fn load_all(&self) -> Result<ScheduleSnapshot, StoreError> {
        let mut snapshot = ScheduleSnapshot::default();

        for event_id in self.list_keys().await? {
            match self.kv.get(&Self::key(&event_id)).await {
                Ok(Some(bytes)) => match self.decode(&event_id, &bytes).await {
                    Some(entry) => snapshot.entries.push(entry),
                    None => snapshot.purged_malformed += 1,
                },
                Ok(None) => {}
                Err(e) => {
                    warn!(%event_id, error = %e, "Failed to read schedule, skipping");
                    snapshot.failed_keys += 1;
                }
            }
        }

        Ok(snapshot)
    }

    /// Remove the entry for an event
    pub async fn delete(&self, event_id: &str) -> Result<(), StoreError> {
        {
            let guard = self.guard(event_id);
            let _held = guard.lock().await;
            self.kv.delete(&Self::key(event_id)).await?;
        }
        self.release_guard(event_id);
        debug!(%event_id, "Deleted schedule");
        Ok(())
    }

    /// Event ids that currently have a schedule
    pub async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self
            .kv
            .keys()
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Check-and-set the fired bit of one trigger
    ///
    /// The updated entry is persisted before this returns, so the caller can
    /// run delivery side effects knowing a crash will not replay them.
    pub(crate) async fn mark_fired(
        &self,
        event_id: &str,
        label: TriggerLabel,
    ) -> Result<MarkFired, StoreError> {
        let guard = self.guard(event_id);
        let _held = guard.lock().await;

        let Some(mut entry) = self.read(event_id).await? else {
            return Ok(MarkFired::NoSchedule);
        };

        match entry.trigger(label) {
            None => return Ok(MarkFired::UnknownTrigger),
            Some(trigger) if trigger.fired => return Ok(MarkFired::AlreadyFired),
            Some(_) => {}
        }

        entry.mark_fired(label);
        self.write(&entry).await?;
        Ok(MarkFired::Marked(entry))
    }

    async fn write(&self, entry: &ScheduleEntry) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec(entry).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.kv.set(&Self::key(&entry.event_id), bytes).await?;
        Ok(())
    }

    async fn read(&self, event_id: &str) -> Result<Option<ScheduleEntry>, StoreError> {
        match self.kv.get(&Self::key(event_id)).await? {
            Some(bytes) => Ok(self.decode(event_id, &bytes).await),
            None => Ok(None),
        }
    }

    /// Decode a stored value, purging it if it is malformed
    async fn decode(&self, event_id: &str, bytes: &[u8]) -> Option<ScheduleEntry> {
        match serde_json::from_slice::<ScheduleEntry>(bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(%event_id, error = %e, "Malformed schedule entry, deleting");
                if let Err(e) = self.kv.delete(&Self::key(event_id)).await {
                    warn!(%event_id, error = %e, "Failed to delete malformed schedule");
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TriggerTime;
    use crate::persistence::InMemoryKvStore;
    use crate::policy::Tier;
    use chrono::{Duration, Utc};

    fn entry(event_id: &str) -> ScheduleEntry {
        let now = Utc::now();
        ScheduleEntry {
            event_id: event_id.to_string(),
            title: "Retro".to_string(),
            start_at: now + Duration::minutes(30),
            location_summary: Some("Room 2".to_string()),
            trigger_times: vec![
                TriggerTime {
                    label: TriggerLabel::FifteenMinutes,
                    at_time: now + Duration::minutes(15),
                    tier: Tier::Medium,
                    fired: false,
                },
                TriggerTime {
                    label: TriggerLabel::Now,
                    at_time: now + Duration::minutes(30),
                    tier: Tier::Maximum,
                    fired: false,
                },
            ],
            created_at: now,
        }
    }

    fn store() -> (Arc<InMemoryKvStore>, ScheduleStore) {
        let kv = Arc::new(InMemoryKvStore::new());
        (kv.clone(), ScheduleStore::new(kv))
    }

    #[tokio::test]
    async fn test_save_load_delete() {
        let (_, store) = store();
        let e = entry("evt-1");

        store.save(&e).await.unwrap();
        assert_eq!(store.load("evt-1").await.unwrap(), Some(e));
        assert_eq!(store.list_keys().await.unwrap(), vec!["evt-1".to_string()]);

        store.delete("evt-1").await.unwrap();
        assert_eq!(store.load("evt-1").await.unwrap(), None);
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_keys_ignores_foreign_keys() {
        let (kv, store) = store();
        kv.insert_raw("settings/theme", "dark");
        store.save(&entry("evt-2")).await.unwrap();

        assert_eq!(store.list_keys().await.unwrap(), vec!["evt-2".to_string()]);
    }

    #[tokio::test]
    async fn test_mark_fired_flips_once() {
        let (_, store) = store();
        store.save(&entry("evt-1")).await.unwrap();

        let first = store
            .mark_fired("evt-1", TriggerLabel::FifteenMinutes)
            .await
            .unwrap();
        assert!(matches!(first, MarkFired::Marked(ref e)
            if e.trigger(TriggerLabel::FifteenMinutes).unwrap().fired));

        let second = store
            .mark_fired("evt-1", TriggerLabel::FifteenMinutes)
            .await
            .unwrap();
        assert_eq!(second, MarkFired::AlreadyFired);

        let persisted = store.load("evt-1").await.unwrap().unwrap();
        assert!(persisted.trigger(TriggerLabel::FifteenMinutes).unwrap().fired);
        assert!(!persisted.trigger(TriggerLabel::Now).unwrap().fired);
    }

    #[tokio::test]
    async fn test_mark_fired_missing_schedule_and_label() {
        let (_, store) = store();
        assert_eq!(
            store.mark_fired("ghost", TriggerLabel::Now).await.unwrap(),
            MarkFired::NoSchedule
        );

        store.save(&entry("evt-1")).await.unwrap();
        assert_eq!(
            store.mark_fired("evt-1", TriggerLabel::OneDay).await.unwrap(),
            MarkFired::UnknownTrigger
        );
    }

    #[tokio::test]
    async fn test_concurrent_mark_fired_single_winner() {
        let (_, store) = store();
        let store = Arc::new(store);
        store.save(&entry("evt-1")).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.mark_fired("evt-1", TriggerLabel::Now).await })
            })
            .collect();

        let mut marked = 0;
        for handle in handles {
            if let MarkFired::Marked(_) = handle.await.unwrap().unwrap() {
                marked += 1;
            }
        }
        assert_eq!(marked, 1);
    }

    #[tokio::test]
    async fn test_malformed_entry_is_purged() {
        let (kv, store) = store();
        kv.insert_raw("schedule/broken", "{not json");
        store.save(&entry("evt-ok")).await.unwrap();

        let snapshot = store.load_all().await.unwrap();
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].event_id, "evt-ok");
        assert_eq!(snapshot.purged_malformed, 1);
        assert!(kv.get_raw("schedule/broken").is_none());

        kv.insert_raw("schedule/broken", "[]");
        assert_eq!(store.load("broken").await.unwrap(), None);
        assert!(kv.get_raw("schedule/broken").is_none());
    }
}
