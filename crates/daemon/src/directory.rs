//! Event directory backed by a JSON file
//!
//! The file holds an array of events. A missing file means there are no
//! events; a file that cannot be read or parsed is a transient error so the
//! reconciler leaves schedules alone until it is fixed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chime_alerts::{DirectoryError, EventDirectory, EventRef};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FileEventDirectory {
    path: PathBuf,
}

impl FileEventDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every event currently in the file
    pub async fn load(&self) -> Result<Vec<EventRef>, DirectoryError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Events file missing, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(DirectoryError(format!(
                    "read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        serde_json::from_slice(&bytes)
            .map_err(|e| DirectoryError(format!("parse {}: {}", self.path.display(), e)))
    }
}

#[async_trait]
impl EventDirectory for FileEventDirectory {
    async fn lookup(&self, event_id: &str) -> Result<Option<EventRef>, DirectoryError> {
        Ok(self.load().await?.into_iter().find(|e| e.id == event_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let directory = FileEventDirectory::new(dir.path().join("events.json"));

        assert!(directory.load().await.unwrap().is_empty());
        assert_eq!(directory.lookup("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookup_finds_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let start = Utc.with_ymd_and_hms(2026, 5, 4, 10, 30, 0).unwrap();
        let events = vec![
            EventRef::new("a", "Standup", start),
            EventRef::new("b", "Lunch", start).with_location("Cafeteria"),
        ];
        std::fs::write(&path, serde_json::to_vec(&events).unwrap()).unwrap();

        let directory = FileEventDirectory::new(&path);
        let found = directory.lookup("b").await.unwrap().unwrap();
        assert_eq!(found.title, "Lunch");
        assert_eq!(found.location_summary.as_deref(), Some("Cafeteria"));
        assert_eq!(directory.lookup("c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let directory = FileEventDirectory::new(&path);
        assert!(directory.load().await.is_err());
        assert!(directory.lookup("a").await.is_err());
    }
}
