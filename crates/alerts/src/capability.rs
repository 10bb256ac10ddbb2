//! Delivery capability interfaces
//!
//! The host supplies these; the engine only decides which ones to invoke and
//! when. Errors are reported back so the dispatcher can log them, but a
//! failing channel never blocks the others.

use std::sync::Arc;

use async_trait::async_trait;

use crate::policy::{AudioProfile, Tier, VibrationPattern, VoiceProfile};

/// Errors a delivery channel can report
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    /// The platform has no such channel
    #[error("capability unsupported on this platform")]
    Unsupported,

    /// The channel tried and failed
    #[error("capability failed: {0}")]
    Failed(String),
}

/// Repeating or one-shot alarm tone
#[async_trait]
pub trait AudioAlarm: Send + Sync {
    async fn start(&self, tier: Tier, profile: &AudioProfile) -> Result<(), CapabilityError>;

    async fn stop(&self) -> Result<(), CapabilityError>;
}

/// Physical-motion channel
#[async_trait]
pub trait Vibration: Send + Sync {
    async fn start(&self, tier: Tier, pattern: VibrationPattern) -> Result<(), CapabilityError>;

    async fn stop(&self) -> Result<(), CapabilityError>;
}

/// Spoken announcement, best effort
#[async_trait]
pub trait VoiceAnnouncement: Send + Sync {
    async fn speak(
        &self,
        text: &str,
        locale: &str,
        profile: &VoiceProfile,
    ) -> Result<(), CapabilityError>;
}

/// The three delivery channels handed to the dispatcher
#[derive(Clone)]
pub struct DeliveryChannels {
    pub audio: Arc<dyn AudioAlarm>,
    pub vibration: Arc<dyn Vibration>,
    pub voice: Arc<dyn VoiceAnnouncement>,
}

impl DeliveryChannels {
    pub fn new(
        audio: Arc<dyn AudioAlarm>,
        vibration: Arc<dyn Vibration>,
        voice: Arc<dyn VoiceAnnouncement>,
    ) -> Self {
        Self {
            audio,
            vibration,
            voice,
        }
    }
}

/// Voice implementation for platforms without speech support
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentVoice;

#[async_trait]
impl VoiceAnnouncement for SilentVoice {
    async fn speak(
        &self,
        _text: &str,
        _locale: &str,
        _profile: &VoiceProfile,
    ) -> Result<(), CapabilityError> {
        Ok(())
    }
}
