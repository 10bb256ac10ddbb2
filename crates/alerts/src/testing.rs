//! Recording delivery channels for tests and dry runs
//!
//! [`RecordingChannels`] implements all three capabilities, records every
//! call in order and can be told to fail individual channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::capability::{
    AudioAlarm, CapabilityError, DeliveryChannels, Vibration, VoiceAnnouncement,
};
use crate::policy::{AudioProfile, Tier, VibrationPattern, VoiceProfile};

/// One recorded capability invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCall {
    AudioStart(Tier),
    AudioStop,
    VibrationStart(Tier, VibrationPattern),
    VibrationStop,
    Speak { text: String, locale: String },
}

/// In-memory recorder for audio, vibration and voice
#[derive(Debug, Default)]
pub struct RecordingChannels {
    calls: Mutex<Vec<ChannelCall>>,
    fail_audio: AtomicBool,
    fail_vibration: AtomicBool,
    fail_voice: AtomicBool,
}

impl RecordingChannels {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bundle this recorder as all three delivery channels
    pub fn channels(self: &Arc<Self>) -> DeliveryChannels {
        DeliveryChannels::new(self.clone(), self.clone(), self.clone())
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<ChannelCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Tiers passed to `AudioAlarm::start`, in order
    pub fn audio_starts(&self) -> Vec<Tier> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                ChannelCall::AudioStart(tier) => Some(*tier),
                _ => None,
            })
            .collect()
    }

    /// Texts passed to `VoiceAnnouncement::speak`, in order
    pub fn spoken(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                ChannelCall::Speak { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &ChannelCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn fail_audio(&self, fail: bool) {
        self.fail_audio.store(fail, Ordering::SeqCst);
    }

    pub fn fail_vibration(&self, fail: bool) {
        self.fail_vibration.store(fail, Ordering::SeqCst);
    }

    pub fn fail_voice(&self, fail: bool) {
        self.fail_voice.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: ChannelCall, fail: &AtomicBool) -> Result<(), CapabilityError> {
        if fail.load(Ordering::SeqCst) {
            return Err(CapabilityError::Failed(format!("{call:?} rejected")));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl AudioAlarm for RecordingChannels {
    async fn start(&self, tier: Tier, _profile: &AudioProfile) -> Result<(), CapabilityError> {
        self.record(ChannelCall::AudioStart(tier), &self.fail_audio)
    }

    async fn stop(&self) -> Result<(), CapabilityError> {
        self.record(ChannelCall::AudioStop, &self.fail_audio)
    }
}

#[async_trait]
impl Vibration for RecordingChannels {
    async fn start(&self, tier: Tier, pattern: VibrationPattern) -> Result<(), CapabilityError> {
        self.record(
            ChannelCall::VibrationStart(tier, pattern),
            &self.fail_vibration,
        )
    }

    async fn stop(&self) -> Result<(), CapabilityError> {
        self.record(ChannelCall::VibrationStop, &self.fail_vibration)
    }
}

#[async_trait]
impl VoiceAnnouncement for RecordingChannels {
    async fn speak(
        &self,
        text: &str,
        locale: &str,
        _profile: &VoiceProfile,
    ) -> Result<(), CapabilityError> {
        self.record(
            ChannelCall::Speak {
                text: text.to_string(),
                locale: locale.to_string(),
            },
            &self.fail_voice,
        )
    }
}
