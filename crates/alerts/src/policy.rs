//! Escalation policy table
//!
//! Static mapping from "how long before the meeting" to the intensity of the
//! alert and the delivery channels that intensity uses. Pure data.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one rung of the escalation ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TriggerLabel {
    #[serde(rename = "1day")]
    OneDay,
    #[serde(rename = "1hour")]
    OneHour,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "now")]
    Now,
}

impl TriggerLabel {
    /// Wire/persisted form of the label
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneDay => "1day",
            Self::OneHour => "1hour",
            Self::FifteenMinutes => "15min",
            Self::FiveMinutes => "5min",
            Self::OneMinute => "1min",
            Self::Now => "now",
        }
    }

    /// Policy entry for this label
    pub fn spec(self) -> &'static TriggerSpec {
        // Variants are declared in table order
        &ESCALATION_POLICY[self as usize]
    }
}

impl fmt::Display for TriggerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown trigger label
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown trigger label: {0}")]
pub struct UnknownLabel(pub String);

impl FromStr for TriggerLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1day" => Ok(Self::OneDay),
            "1hour" => Ok(Self::OneHour),
            "15min" => Ok(Self::FifteenMinutes),
            "5min" => Ok(Self::FiveMinutes),
            "1min" => Ok(Self::OneMinute),
            "now" => Ok(Self::Now),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

/// Escalation intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Light,
    Medium,
    Maximum,
}

impl Tier {
    /// Channel configuration for this tier (fixed policy, not per event)
    pub fn channels(self) -> ChannelSettings {
        match self {
            Self::Light => ChannelSettings {
                audio: AudioProfile {
                    repeating: false,
                    volume: 0.5,
                    ramp: None,
                },
                vibration: VibrationPattern::SinglePulse,
                voice: None,
                presentation: PresentationStyle::Transient,
                auto_close: Some(Duration::from_secs(3)),
            },
            Self::Medium => ChannelSettings {
                audio: AudioProfile {
                    repeating: true,
                    volume: 0.6,
                    ramp: None,
                },
                vibration: VibrationPattern::ShortRepeating,
                voice: Some(VoiceProfile { volume: 0.8 }),
                presentation: PresentationStyle::PersistentBanner,
                auto_close: None,
            },
            Self::Maximum => ChannelSettings {
                audio: AudioProfile {
                    repeating: true,
                    volume: 0.6,
                    ramp: Some(VolumeRamp {
                        to: 1.0,
                        over: Duration::from_secs(20),
                    }),
                },
                vibration: VibrationPattern::ComplexRepeating,
                voice: Some(VoiceProfile { volume: 1.0 }),
                presentation: PresentationStyle::FullTakeover,
                auto_close: Some(Duration::from_secs(30)),
            },
        }
    }

    /// Whether delivery occupies the process's single active-alert slot
    pub fn is_sustained(self) -> bool {
        !matches!(self.channels().presentation, PresentationStyle::Transient)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Medium => write!(f, "medium"),
            Self::Maximum => write!(f, "maximum"),
        }
    }
}

/// Which channels a tier activates and how
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
    pub audio: AudioProfile,
    pub vibration: VibrationPattern,
    /// `None` means no voice announcement
    pub voice: Option<VoiceProfile>,
    pub presentation: PresentationStyle,
    /// Countdown after which the presentation closes itself
    pub auto_close: Option<Duration>,
}

/// Tone settings handed to the audio capability
#[derive(Debug, Clone, PartialEq)]
pub struct AudioProfile {
    pub repeating: bool,
    /// Starting volume in `0.0..=1.0`
    pub volume: f32,
    pub ramp: Option<VolumeRamp>,
}

/// Gradual volume increase while the tone keeps repeating
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRamp {
    /// Final volume in `0.0..=1.0`
    pub to: f32,
    pub over: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VibrationPattern {
    SinglePulse,
    ShortRepeating,
    ComplexRepeating,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceProfile {
    pub volume: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationStyle {
    /// Toast-like, dismissible, closes by itself
    Transient,
    /// Stays until the user acts
    PersistentBanner,
    /// Takes over the screen and cannot be swiped away
    FullTakeover,
}

/// One rung of the escalation ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSpec {
    pub label: TriggerLabel,
    pub lead_time: Duration,
    pub tier: Tier,
}

/// The escalation ladder, ordered by strictly decreasing lead time
pub const ESCALATION_POLICY: [TriggerSpec; 6] = [
    TriggerSpec {
        label: TriggerLabel::OneDay,
        lead_time: Duration::from_secs(24 * 60 * 60),
        tier: Tier::Light,
    },
    TriggerSpec {
        label: TriggerLabel::OneHour,
        lead_time: Duration::from_secs(60 * 60),
        tier: Tier::Light,
    },
    TriggerSpec {
        label: TriggerLabel::FifteenMinutes,
        lead_time: Duration::from_secs(15 * 60),
        tier: Tier::Medium,
    },
    TriggerSpec {
        label: TriggerLabel::FiveMinutes,
        lead_time: Duration::from_secs(5 * 60),
        tier: Tier::Medium,
    },
    TriggerSpec {
        label: TriggerLabel::OneMinute,
        lead_time: Duration::from_secs(60),
        tier: Tier::Maximum,
    },
    TriggerSpec {
        label: TriggerLabel::Now,
        lead_time: Duration::ZERO,
        tier: Tier::Maximum,
    },
];

/// A concrete trigger moment computed from the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedTrigger {
    pub label: TriggerLabel,
    pub at_time: DateTime<Utc>,
    pub tier: Tier,
}

/// Compute the trigger moments for a meeting starting at `start_at`
///
/// Triggers whose moment is not strictly after `now` are dropped, not fired:
/// a meeting first seen five minutes ahead does not replay its "1 day before"
/// alert. The result is ordered by ascending `at_time`.
pub fn triggers_for(start_at: DateTime<Utc>, now: DateTime<Utc>) -> Vec<PlannedTrigger> {
    ESCALATION_POLICY
        .iter()
        .filter_map(|spec| {
            let lead = ChronoDuration::from_std(spec.lead_time).ok()?;
            let at_time = start_at - lead;
            (at_time > now).then_some(PlannedTrigger {
                label: spec.label,
                at_time,
                tier: spec.tier,
            })
        })
        .collect()
}
