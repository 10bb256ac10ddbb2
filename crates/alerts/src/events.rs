//! Read-only view of the upstream event subsystem

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::model::EventRef;

/// Upstream lookup failed; treated as transient
#[derive(Debug, thiserror::Error)]
#[error("event directory unavailable: {0}")]
pub struct DirectoryError(pub String);

/// Answers "does this event still exist, and what does it look like now?"
///
/// The reconciliation sweep uses this to tell a live schedule from one whose
/// event was deleted while nobody was listening.
#[async_trait]
pub trait EventDirectory: Send + Sync {
    async fn lookup(&self, event_id: &str) -> Result<Option<EventRef>, DirectoryError>;
}

/// Map-backed [`EventDirectory`] for tests and embedding
#[derive(Debug, Default)]
pub struct InMemoryEventDirectory {
    events: RwLock<HashMap<String, EventRef>>,
}

impl InMemoryEventDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, event: EventRef) {
        self.events.write().insert(event.id.clone(), event);
    }

    pub fn remove(&self, event_id: &str) -> Option<EventRef> {
        self.events.write().remove(event_id)
    }

    pub fn all(&self) -> Vec<EventRef> {
        self.events.read().values().cloned().collect()
    }
}

#[async_trait]
impl EventDirectory for InMemoryEventDirectory {
    async fn lookup(&self, event_id: &str) -> Result<Option<EventRef>, DirectoryError> {
        Ok(self.events.read().get(event_id).cloned())
    }
}
