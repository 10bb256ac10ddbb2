//! Host process pieces for running the alert engine on a single machine
//!
//! The binary in `main.rs` wires these together; they live in a library so
//! they can be tested without starting the process.

pub mod capabilities;
pub mod config;
pub mod directory;
pub mod feed;
pub mod telemetry;

pub use capabilities::{log_channels, LogAudioAlarm, LogVibration, LogVoiceAnnouncement};
pub use config::DaemonConfig;
pub use directory::FileEventDirectory;
pub use feed::{EventFeed, FeedReport};
pub use telemetry::{init_telemetry, TelemetryConfig};
