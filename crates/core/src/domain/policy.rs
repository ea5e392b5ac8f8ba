//! Operating modes, feature flags and the option policy
//!
//! The policy is a pure table: each category admits a fixed subset of the
//! option bits, and the caller's feature flags select from that subset.

use crate::domain::audio::{Category, CategoryOptions};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Requested operating mode of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    Playback,
    Record,
    Ambient,
    SoloAmbient,
    PlayAndRecord,
    MultiRoute,
}

impl OperatingMode {
    pub const ALL: [OperatingMode; 6] = [
        OperatingMode::Playback,
        OperatingMode::Record,
        OperatingMode::Ambient,
        OperatingMode::SoloAmbient,
        OperatingMode::PlayAndRecord,
        OperatingMode::MultiRoute,
    ];

    /// Category requested from the hardware session for this mode
    pub fn category(self) -> Category {
        match self {
            OperatingMode::Playback => Category::Playback,
            OperatingMode::Record => Category::Record,
            OperatingMode::Ambient => Category::Ambient,
            OperatingMode::SoloAmbient => Category::SoloAmbient,
            OperatingMode::PlayAndRecord => Category::PlayAndRecord,
            OperatingMode::MultiRoute => Category::MultiRoute,
        }
    }

    pub fn options(self, flags: &FeatureFlags) -> CategoryOptions {
        options_for(&self.category(), flags)
    }

    /// Whether the processing unit may be wired for input in this mode
    pub fn uses_input(self) -> bool {
        self.category().supports_input()
    }

    /// Whether the processing unit must produce output in this mode
    pub fn uses_output(self) -> bool {
        self.category().supports_output()
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.category())
    }
}

/// Caller-controlled behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub mix_with_others: bool,
    pub duck_others: bool,
    pub default_to_speaker: bool,
    pub allow_bluetooth: bool,
    pub allow_bluetooth_a2dp: bool,
    pub allow_air_play: bool,
    pub interrupt_spoken_audio_and_mix_with_others: bool,
    /// Raise any positive channel count to at least two
    pub prefer_stereo: bool,
    /// Let the processing unit buffer samples between callbacks
    pub buffer_samples: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            mix_with_others: true,
            duck_others: false,
            default_to_speaker: true,
            allow_bluetooth: false,
            allow_bluetooth_a2dp: false,
            allow_air_play: false,
            interrupt_spoken_audio_and_mix_with_others: false,
            prefer_stereo: true,
            buffer_samples: true,
        }
    }
}

/// Individual feature flag, for targeted mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    MixWithOthers,
    DuckOthers,
    DefaultToSpeaker,
    AllowBluetooth,
    AllowBluetoothA2dp,
    AllowAirPlay,
    InterruptSpokenAudioAndMixWithOthers,
    PreferStereo,
    BufferSamples,
}

impl FeatureFlags {
    pub fn get(&self, feature: Feature) -> bool {
        match feature {
            Feature::MixWithOthers => self.mix_with_others,
            Feature::DuckOthers => self.duck_others,
            Feature::DefaultToSpeaker => self.default_to_speaker,
            Feature::AllowBluetooth => self.allow_bluetooth,
            Feature::AllowBluetoothA2dp => self.allow_bluetooth_a2dp,
            Feature::AllowAirPlay => self.allow_air_play,
            Feature::InterruptSpokenAudioAndMixWithOthers => {
                self.interrupt_spoken_audio_and_mix_with_others
            }
            Feature::PreferStereo => self.prefer_stereo,
            Feature::BufferSamples => self.buffer_samples,
        }
    }

    pub fn set(&mut self, feature: Feature, enabled: bool) {
        let slot = match feature {
            Feature::MixWithOthers => &mut self.mix_with_others,
            Feature::DuckOthers => &mut self.duck_others,
            Feature::DefaultToSpeaker => &mut self.default_to_speaker,
            Feature::AllowBluetooth => &mut self.allow_bluetooth,
            Feature::AllowBluetoothA2dp => &mut self.allow_bluetooth_a2dp,
            Feature::AllowAirPlay => &mut self.allow_air_play,
            Feature::InterruptSpokenAudioAndMixWithOthers => {
                &mut self.interrupt_spoken_audio_and_mix_with_others
            }
            Feature::PreferStereo => &mut self.prefer_stereo,
            Feature::BufferSamples => &mut self.buffer_samples,
        };
        *slot = enabled;
    }

    /// Every option bit the flags ask for, before category filtering
    pub fn requested_options(&self) -> CategoryOptions {
        let mut options = CategoryOptions::empty();
        options.set(CategoryOptions::MIX_WITH_OTHERS, self.mix_with_others);
        options.set(CategoryOptions::DUCK_OTHERS, self.duck_others);
        options.set(CategoryOptions::DEFAULT_TO_SPEAKER, self.default_to_speaker);
        options.set(CategoryOptions::ALLOW_BLUETOOTH, self.allow_bluetooth);
        options.set(CategoryOptions::ALLOW_BLUETOOTH_A2DP, self.allow_bluetooth_a2dp);
        options.set(CategoryOptions::ALLOW_AIR_PLAY, self.allow_air_play);
        options.set(
            CategoryOptions::INTERRUPT_SPOKEN_AUDIO_AND_MIX_WITH_OTHERS,
            self.interrupt_spoken_audio_and_mix_with_others,
        );
        options
    }
}

/// Option bits each category is allowed to carry
const ELIGIBLE_OPTIONS: [(Category, CategoryOptions); 6] = [
    (
        Category::Playback,
        CategoryOptions::MIX_WITH_OTHERS
            .union(CategoryOptions::DUCK_OTHERS)
            .union(CategoryOptions::INTERRUPT_SPOKEN_AUDIO_AND_MIX_WITH_OTHERS),
    ),
    (
        Category::PlayAndRecord,
        CategoryOptions::MIX_WITH_OTHERS
            .union(CategoryOptions::DUCK_OTHERS)
            .union(CategoryOptions::DEFAULT_TO_SPEAKER)
            .union(CategoryOptions::ALLOW_BLUETOOTH)
            .union(CategoryOptions::INTERRUPT_SPOKEN_AUDIO_AND_MIX_WITH_OTHERS)
            .union(CategoryOptions::ALLOW_BLUETOOTH_A2DP)
            .union(CategoryOptions::ALLOW_AIR_PLAY),
    ),
    (Category::Record, CategoryOptions::ALLOW_BLUETOOTH),
    (Category::SoloAmbient, CategoryOptions::empty()),
    (Category::Ambient, CategoryOptions::DUCK_OTHERS),
    (
        Category::MultiRoute,
        CategoryOptions::MIX_WITH_OTHERS
            .union(CategoryOptions::DUCK_OTHERS)
            .union(CategoryOptions::INTERRUPT_SPOKEN_AUDIO_AND_MIX_WITH_OTHERS),
    ),
];

/// Option bits the given category may carry; empty for unknown categories
pub fn eligible_options(category: &Category) -> CategoryOptions {
    ELIGIBLE_OPTIONS
        .iter()
        .find(|(candidate, _)| candidate == category)
        .map(|(_, options)| *options)
        .unwrap_or_else(CategoryOptions::empty)
}

/// Concrete option bitset to request for `category` under `flags`
pub fn options_for(category: &Category, flags: &FeatureFlags) -> CategoryOptions {
    flags.requested_options() & eligible_options(category)
}
