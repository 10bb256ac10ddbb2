//! DurableKvStore trait definition

use async_trait::async_trait;

/// Error type for key-value backend operations
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

/// Durable key-value capability
///
/// Values must survive a process restart. The only transactional guarantee
/// required is single-key atomicity: a reader never observes a partially
/// written value.
#[async_trait]
pub trait DurableKvStore: Send + Sync + 'static {
    /// Read a value, `None` if the key is absent
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Write a value, replacing any previous one atomically
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), KvError>;

    /// Remove a key; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// All keys currently stored
    async fn keys(&self) -> Result<Vec<String>, KvError>;
}
