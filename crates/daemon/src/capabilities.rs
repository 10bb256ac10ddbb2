//! Delivery capabilities that log what a device would do
//!
//! Useful on a headless host and for watching the engine's decisions. The
//! audio and vibration channels remember whether they are running so that a
//! stop without a start shows up in the log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chime_alerts::{
    AudioAlarm, AudioProfile, CapabilityError, DeliveryChannels, Tier, Vibration,
    VibrationPattern, VoiceAnnouncement, VoiceProfile,
};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct LogAudioAlarm {
    playing: AtomicBool,
}

impl LogAudioAlarm {
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioAlarm for LogAudioAlarm {
    async fn start(&self, tier: Tier, profile: &AudioProfile) -> Result<(), CapabilityError> {
        self.playing.store(true, Ordering::SeqCst);
        info!(
            %tier,
            repeating = profile.repeating,
            volume = profile.volume,
            ramp_to = profile.ramp.as_ref().map(|r| r.to),
            "Audio alarm started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), CapabilityError> {
        if self.playing.swap(false, Ordering::SeqCst) {
            info!("Audio alarm stopped");
        } else {
            debug!("Audio alarm stop requested while idle");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LogVibration {
    running: AtomicBool,
}

impl LogVibration {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Vibration for LogVibration {
    async fn start(&self, tier: Tier, pattern: VibrationPattern) -> Result<(), CapabilityError> {
        self.running.store(true, Ordering::SeqCst);
        info!(%tier, ?pattern, "Vibration started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), CapabilityError> {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Vibration stopped");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LogVoiceAnnouncement;

#[async_trait]
impl VoiceAnnouncement for LogVoiceAnnouncement {
    async fn speak(
        &self,
        text: &str,
        locale: &str,
        profile: &VoiceProfile,
    ) -> Result<(), CapabilityError> {
        info!(%locale, volume = profile.volume, "Announcement: {}", text);
        Ok(())
    }
}

/// All three logging channels, ready for the engine
pub fn log_channels() -> DeliveryChannels {
    DeliveryChannels::new(
        Arc::new(LogAudioAlarm::default()),
        Arc::new(LogVibration::default()),
        Arc::new(LogVoiceAnnouncement),
    )
}
