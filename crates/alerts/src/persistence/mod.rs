//! Persistence layer for alert schedules
//!
//! This module provides:
//! - [`DurableKvStore`] trait, the host-supplied durable capability
//! - [`InMemoryKvStore`] for testing and embedding
//! - [`FileKvStore`] for a single-host deployment (one file per key)
//! - [`ScheduleStore`], the typed wrapper that owns the on-disk representation
//!   of one [`ScheduleEntry`](crate::ScheduleEntry) per event

mod file;
mod kv;
mod memory;
mod schedule;

pub use file::FileKvStore;
pub use kv::{DurableKvStore, KvError};
pub use memory::InMemoryKvStore;
pub use schedule::{MarkFired, ScheduleSnapshot, ScheduleStore, StoreError};
