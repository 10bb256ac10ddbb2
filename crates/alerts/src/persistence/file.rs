//! File-backed implementation of DurableKvStore
//!
//! One file per key. Keys are hex-encoded into file names so any string is a
//! valid key. Writes land in a temporary sibling first and are renamed into
//! place, which is atomic on the same filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use super::kv::{DurableKvStore, KvError};

const VALUE_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Directory-backed [`DurableKvStore`]
#[derive(Debug, Clone)]
pub struct FileKvStore {
    root: PathBuf,
}

impl FileKvStore {
    /// Open (and create if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, KvError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "Opened file key-value store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", hex::encode(key), VALUE_EXTENSION))
    }

    fn key_from_file_name(name: &str) -> Option<String> {
        let stem = name.strip_suffix(&format!(".{}", VALUE_EXTENSION))?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }
}

#[async_trait]
impl DurableKvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        match tokio::fs::read(self.value_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), KvError> {
        let target = self.value_path(key);
        let temp = self.root.join(format!(
            "{}.{}.{}",
            hex::encode(key),
            Uuid::now_v7().simple(),
            TEMP_EXTENSION
        ));

        tokio::fs::write(&temp, &value).await?;
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            // Best effort; a leftover temp file is ignored by `keys`
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        match tokio::fs::remove_file(self.value_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, KvError> {
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        let mut keys = vec![];

        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            match Self::key_from_file_name(name) {
                Some(key) => keys.push(key),
                None if name.ends_with(TEMP_EXTENSION) => {}
                None => warn!(file = %name, "Ignoring unrecognised file in store directory"),
            }
        }

        Ok(keys)
    }
}
