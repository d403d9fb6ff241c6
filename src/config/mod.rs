//! Configuration module for the voice engine
//!
//! This module handles engine configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use waav_voice_engine::config::EngineConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = EngineConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = EngineConfig::from_file(&config_path)?;
//!
//! println!("Signaling endpoint: {}", config.signaling_url);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::audio::MediaConstraints;
use crate::core::call::{BargeInConfig, DEFAULT_PREVIEW_LINGER_MS, SessionSettings};
use crate::core::realtime::{
    DEFAULT_SIGNALING_URL, DEFAULT_TRANSCRIPTION_LANGUAGE, DEFAULT_TRANSCRIPTION_MODEL,
    DEFAULT_VOICE_HEADER, DEFAULT_VOICE_PRESET,
};
use crate::core::tools::HttpToolConfig;
use crate::core::transcript::ReconcilerConfig;
use crate::core::transport::{DEFAULT_ICE_SERVER, DEFAULT_SIGNALING_TIMEOUT_SECS, SignalingConfig};

/// Engine configuration
///
/// Holds everything needed to build a [`crate::core::call::VoiceEngine`]:
/// the signaling endpoint, session behavior, microphone constraints,
/// transcript cleanup rules, barge-in tuning and HTTP tools.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    // Signaling
    pub signaling_url: String,
    pub signaling_token: Option<String>,
    pub signaling_timeout_seconds: u64,
    pub voice_header: String,
    pub ice_servers: Vec<String>,

    // Session
    pub voice_preset: String,
    pub instructions: Option<String>,
    pub greet_on_connect: bool,
    pub transcription_model: String,
    /// `None` disables both the language hint and the language guard
    pub transcription_language: Option<String>,

    pub media: MediaConstraints,
    pub transcript: ReconcilerConfig,
    pub barge_in: BargeInConfig,
    pub preview_linger_ms: u64,

    pub tools: Vec<HttpToolConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signaling_url: DEFAULT_SIGNALING_URL.to_string(),
            signaling_token: None,
            signaling_timeout_seconds: DEFAULT_SIGNALING_TIMEOUT_SECS,
            voice_header: DEFAULT_VOICE_HEADER.to_string(),
            ice_servers: vec![DEFAULT_ICE_SERVER.to_string()],
            voice_preset: DEFAULT_VOICE_PRESET.to_string(),
            instructions: None,
            greet_on_connect: false,
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            transcription_language: Some(DEFAULT_TRANSCRIPTION_LANGUAGE.to_string()),
            media: MediaConstraints::default(),
            transcript: ReconcilerConfig::default(),
            barge_in: BargeInConfig::default(),
            preview_linger_ms: DEFAULT_PREVIEW_LINGER_MS,
            tools: Vec::new(),
        }
    }
}

impl Drop for EngineConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut token) = self.signaling_token {
            token.zeroize();
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Call `dotenvy::dotenv()` beforehand to pick up a `.env` file.
    ///
    /// # Errors
    /// Returns an error if a variable cannot be parsed or validation fails.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, layered over environment variables
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the merged configuration for values the engine cannot use
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_signaling_url(&self.signaling_url)?;
        validation::validate_tools(&self.tools)?;
        validation::validate_barge_in(self.barge_in.threshold, self.barge_in.interval_ms)?;
        validation::check_voice_preset(&self.voice_preset);
        Ok(())
    }

    /// Session settings for the engine
    pub fn session_settings(&self) -> SessionSettings {
        let mut transcript = self.transcript.clone();
        transcript.expected_language = self.transcription_language.clone();

        SessionSettings {
            voice_preset: self.voice_preset.clone(),
            instructions: self.instructions.clone(),
            greet_on_connect: self.greet_on_connect,
            transcription_model: self.transcription_model.clone(),
            transcription_language: self.transcription_language.clone(),
            media: self.media.clone(),
            transcript,
            barge_in: self.barge_in.clone(),
            preview_linger_ms: self.preview_linger_ms,
        }
    }

    /// Signaling client settings
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            url: self.signaling_url.clone(),
            token: self.signaling_token.clone(),
            voice_header: self.voice_header.clone(),
            timeout: Duration::from_secs(self.signaling_timeout_seconds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("VOICE_SIGNALING_URL");
            env::remove_var("VOICE_SIGNALING_TOKEN");
            env::remove_var("VOICE_PRESET");
            env::remove_var("VOICE_PRESET_HEADER");
            env::remove_var("VOICE_INSTRUCTIONS");
            env::remove_var("VOICE_TRANSCRIPTION_MODEL");
            env::remove_var("VOICE_TRANSCRIPTION_LANGUAGE");
            env::remove_var("VOICE_DEDUP_WINDOW_MS");
            env::remove_var("VOICE_BARGE_IN_THRESHOLD");
            env::remove_var("VOICE_ICE_SERVERS");
        }
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        cleanup_env_vars();

        let config = EngineConfig::from_env().expect("defaults should be valid");
        assert_eq!(config.signaling_url, DEFAULT_SIGNALING_URL);
        assert_eq!(config.voice_preset, DEFAULT_VOICE_PRESET);
        assert_eq!(config.ice_servers, vec![DEFAULT_ICE_SERVER.to_string()]);
        assert_eq!(config.transcription_language.as_deref(), Some("en"));
        assert!(config.tools.is_empty());
        assert!(config.barge_in.enabled);
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        cleanup_env_vars();
        unsafe {
            env::set_var("VOICE_SIGNALING_URL", "https://voice.example.com/offer");
            env::set_var("VOICE_SIGNALING_TOKEN", "env-token");
            env::set_var("VOICE_PRESET", "wise_sage");
            env::set_var("VOICE_BARGE_IN_THRESHOLD", "30");
            env::set_var("VOICE_ICE_SERVERS", "stun:a.example.com:3478, stun:b.example.com:3478");
        }

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.signaling_url, "https://voice.example.com/offer");
        assert_eq!(config.signaling_token.as_deref(), Some("env-token"));
        assert_eq!(config.voice_preset, "wise_sage");
        assert_eq!(config.barge_in.threshold, 30);
        assert_eq!(config.ice_servers.len(), 2);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_from_env_invalid_threshold() {
        cleanup_env_vars();
        unsafe {
            env::set_var("VOICE_BARGE_IN_THRESHOLD", "200");
        }

        let result = EngineConfig::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Barge-in threshold"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_from_file_overrides_env() {
        cleanup_env_vars();
        unsafe {
            env::set_var("VOICE_SIGNALING_URL", "https://env.example.com/offer");
            env::set_var("VOICE_PRESET", "quick_peer");
        }

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
signaling:
  url: "https://yaml.example.com/offer"
  timeout_seconds: 5
session:
  transcription_language: ""
barge_in:
  threshold: 12
tools:
  - name: "get_schedule"
    url: "https://api.example.com/schedule"
"#,
        )
        .unwrap();

        let config = EngineConfig::from_file(&config_path).unwrap();
        assert_eq!(config.signaling_url, "https://yaml.example.com/offer");
        assert_eq!(config.signaling_timeout_seconds, 5);
        assert_eq!(config.voice_preset, "quick_peer");
        assert!(config.transcription_language.is_none());
        assert!(config.transcript.expected_language.is_none());
        assert_eq!(config.barge_in.threshold, 12);
        assert_eq!(config.tools.len(), 1);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_from_file_rejects_duplicate_tools() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
tools:
  - name: "lookup"
    url: "https://api.example.com/a"
  - name: "lookup"
    url: "https://api.example.com/b"
"#,
        )
        .unwrap();

        let err = EngineConfig::from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("Duplicate tool name"));
    }

    #[test]
    fn test_session_settings_carry_language() {
        let mut config = EngineConfig::default();
        config.transcription_language = Some("fr".to_string());
        config.instructions = Some("Be brief.".to_string());

        let settings = config.session_settings();
        assert_eq!(settings.transcript.expected_language.as_deref(), Some("fr"));
        assert_eq!(settings.full_instructions(), "Be brief.");
    }

    #[test]
    fn test_signaling_config() {
        let mut config = EngineConfig::default();
        config.signaling_token = Some("secret".to_string());
        config.signaling_timeout_seconds = 7;

        let signaling = config.signaling_config();
        assert_eq!(signaling.url, DEFAULT_SIGNALING_URL);
        assert_eq!(signaling.token.as_deref(), Some("secret"));
        assert_eq!(signaling.timeout, Duration::from_secs(7));
    }
}
