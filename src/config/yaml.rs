use serde::Deserialize;
use std::path::PathBuf;

use crate::core::tools::HttpToolConfig;
use crate::core::transcript::PhraseSubstitution;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// signaling:
///   url: "https://voice.example.com/api/voice/offer"
///   token: "session-token"
///   voice_header: "X-Voice-Preset"
///   timeout_seconds: 15
///   ice_servers:
///     - "stun:stun.l.google.com:19302"
///
/// session:
///   voice_preset: "calm_male"
///   instructions: "You are a friendly study mentor."
///   greet_on_connect: true
///   transcription_model: "gpt-4o-mini-transcribe"
///   transcription_language: "en"
///
/// audio:
///   echo_cancellation: true
///   noise_suppression: true
///   auto_gain_control: true
///
/// transcript:
///   dedup_window_ms: 2500
///   wake_word: "Durmah"
///   mishearings: ["Denmark", "Dharma"]
///   phrase_substitutions:
///     - from: "Hey Denmark"
///       to: "Hey Durmah"
///
/// barge_in:
///   enabled: true
///   threshold: 10
///   interval_ms: 16
///
/// preview:
///   linger_ms: 400
///
/// tools:
///   - name: "get_schedule"
///     description: "Upcoming lectures for the student"
///     url: "https://api.example.com/schedule"
///     parameters:
///       type: object
///       properties:
///         days: { type: integer }
///     timeout_seconds: 5
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub signaling: Option<SignalingYaml>,
    pub session: Option<SessionYaml>,
    pub audio: Option<AudioYaml>,
    pub transcript: Option<TranscriptYaml>,
    pub barge_in: Option<BargeInYaml>,
    pub preview: Option<PreviewYaml>,
    pub tools: Option<Vec<HttpToolConfig>>,
}

/// Signaling endpoint configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SignalingYaml {
    pub url: Option<String>,
    pub token: Option<String>,
    pub voice_header: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub ice_servers: Option<Vec<String>>,
}

/// Session behavior from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub voice_preset: Option<String>,
    pub instructions: Option<String>,
    pub greet_on_connect: Option<bool>,
    pub transcription_model: Option<String>,
    /// Empty string disables the language hint and guard
    pub transcription_language: Option<String>,
}

/// Microphone constraints from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub echo_cancellation: Option<bool>,
    pub noise_suppression: Option<bool>,
    pub auto_gain_control: Option<bool>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Transcript reconciliation from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TranscriptYaml {
    pub dedup_window_ms: Option<u64>,
    pub wake_word: Option<String>,
    pub mishearings: Option<Vec<String>>,
    pub phrase_substitutions: Option<Vec<PhraseSubstitution>>,
}

/// Barge-in detection from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BargeInYaml {
    pub enabled: Option<bool>,
    pub threshold: Option<u8>,
    pub interval_ms: Option<u64>,
}

/// Voice preview from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PreviewYaml {
    pub linger_ms: Option<u64>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
