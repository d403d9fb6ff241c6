//! Realtime session constants, voices and voice presets.
//!
//! This module contains:
//! - Wire constants (data channel labels, transcription defaults)
//! - Voice selection
//! - The built-in voice preset catalogue used for calls and previews

use serde::{Deserialize, Serialize};

/// Label of the control data channel for calls.
pub const DATA_CHANNEL_LABEL: &str = "oai-events";

/// Label of the control data channel for voice previews.
pub const PREVIEW_CHANNEL_LABEL: &str = "oai-preview";

/// Default signaling endpoint for the offer/answer exchange.
pub const DEFAULT_SIGNALING_URL: &str = "http://localhost:3000/api/voice/offer";

/// Default header carrying the selected voice on the signaling request.
pub const DEFAULT_VOICE_HEADER: &str = "X-Voice-Preset";

/// Default transcription model for user audio.
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "gpt-4o-mini-transcribe";

/// Default transcription language.
pub const DEFAULT_TRANSCRIPTION_LANGUAGE: &str = "en";

/// Response modalities requested from the service.
pub const RESPONSE_MODALITIES: [&str; 2] = ["audio", "text"];

/// Instruction prefix pinning transcription and replies to English.
pub const ENGLISH_ONLY_INSTRUCTION: &str = "You are an English-only voice mentor. \
Always transcribe and respond in English, even if the user speaks another language. \
Do not output Malay or any other language.";

// =============================================================================
// Voices
// =============================================================================

/// Available voices of the realtime speech service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealtimeVoice {
    /// Alloy voice (default)
    #[default]
    Alloy,
    /// Ash voice
    Ash,
    /// Ballad voice
    Ballad,
    /// Coral voice
    Coral,
    /// Echo voice
    Echo,
    /// Sage voice
    Sage,
    /// Shimmer voice
    Shimmer,
    /// Verse voice
    Verse,
}

impl RealtimeVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "alloy" => Self::Alloy,
            "ash" => Self::Ash,
            "ballad" => Self::Ballad,
            "coral" => Self::Coral,
            "echo" => Self::Echo,
            "sage" => Self::Sage,
            "shimmer" => Self::Shimmer,
            "verse" => Self::Verse,
            _ => Self::default(),
        }
    }

    /// Get all available voices.
    pub fn all() -> &'static [Self] {
        &[
            Self::Alloy,
            Self::Ash,
            Self::Ballad,
            Self::Coral,
            Self::Echo,
            Self::Sage,
            Self::Shimmer,
            Self::Verse,
        ]
    }
}

impl std::fmt::Display for RealtimeVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Voice Presets
// =============================================================================

/// A named persona mapped onto a service voice, with a sample line used by
/// voice previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoicePreset {
    /// Stable preset identifier
    pub id: &'static str,
    /// Human-readable label
    pub label: &'static str,
    /// Service voice used for this preset
    pub voice: RealtimeVoice,
    /// Sample utterance spoken during a preview
    pub preview_text: &'static str,
}

/// Identifier of the default preset.
pub const DEFAULT_VOICE_PRESET: &str = "warm_female";

/// Built-in preset catalogue.
pub const VOICE_PRESETS: &[VoicePreset] = &[
    VoicePreset {
        id: "warm_female",
        label: "Warm Female Mentor",
        voice: RealtimeVoice::Shimmer,
        preview_text: "Hi there. I'm your warm mentor. I'm here to listen and help you navigate your studies with a calm mind.",
    },
    VoicePreset {
        id: "calm_male",
        label: "Calm Male Mentor",
        voice: RealtimeVoice::Ballad,
        preview_text: "Hello. I'm your calm study mentor. I'll help you break down complex cases into clear, manageable parts.",
    },
    VoicePreset {
        id: "empathetic_ally",
        label: "Empathetic Ally",
        voice: RealtimeVoice::Coral,
        preview_text: "I know the pressure is high, but you're doing amazing. I'm here to listen and help you through the tough spots.",
    },
    VoicePreset {
        id: "witty_buddy",
        label: "Witty Study Buddy",
        voice: RealtimeVoice::Verse,
        preview_text: "Ready to crush some torts? I promise to keep things interesting and maybe crack a bad joke or two.",
    },
    VoicePreset {
        id: "wise_sage",
        label: "Wise Professor",
        voice: RealtimeVoice::Sage,
        preview_text: "Knowledge is a journey, not a race. Let us examine the principles with a clear and focused mind.",
    },
    VoicePreset {
        id: "vibrant_senior",
        label: "Vibrant Senior",
        voice: RealtimeVoice::Shimmer,
        preview_text: "You've totally got this! Law is tough, but you're tougher. Let's power through this together!",
    },
    VoicePreset {
        id: "sophisticated_guide",
        label: "Sophisticated Guide",
        voice: RealtimeVoice::Ballad,
        preview_text: "Precision in language is the hallmark of a great lawyer. Allow me to assist you in refining your understanding.",
    },
    VoicePreset {
        id: "quick_peer",
        label: "Quick-Witted Peer",
        voice: RealtimeVoice::Ash,
        preview_text: "Let's get straight to the point. No fluff, just the core facts and key arguments you need to win.",
    },
    VoicePreset {
        id: "intense_coach",
        label: "Intense Coach",
        voice: RealtimeVoice::Echo,
        preview_text: "Focus. Eyes on the prize. We are here to achieve mastery. No distractions allowed. Give me 100%.",
    },
];

impl VoicePreset {
    /// Look up a preset by id.
    pub fn find(id: &str) -> Option<&'static VoicePreset> {
        VOICE_PRESETS
            .iter()
            .find(|preset| preset.id.eq_ignore_ascii_case(id.trim()))
    }

    /// Look up a preset by id, falling back to the default preset.
    pub fn find_or_default(id: &str) -> &'static VoicePreset {
        Self::find(id).unwrap_or_else(Self::default_preset)
    }

    /// The default preset.
    pub fn default_preset() -> &'static VoicePreset {
        // VOICE_PRESETS is a non-empty constant whose first entry is the default
        &VOICE_PRESETS[0]
    }

    /// Instructions asking the service to speak the preview line.
    pub fn preview_prompt(&self) -> String {
        format!(
            "Say exactly this phrase with emotion: \"{}\"",
            self.preview_text
        )
    }
}
