use std::env;
use std::str::FromStr;

/// Values read from environment variables
///
/// Every field is optional; unset or blank variables leave the default in
/// place during merging.
#[derive(Debug, Clone, Default)]
pub(super) struct EnvConfig {
    pub signaling_url: Option<String>,
    pub signaling_token: Option<String>,
    pub voice_preset: Option<String>,
    pub voice_header: Option<String>,
    pub instructions: Option<String>,
    pub transcription_model: Option<String>,
    /// `Some("")` clears the language
    pub transcription_language: Option<String>,
    pub dedup_window_ms: Option<u64>,
    pub barge_in_threshold: Option<u8>,
    pub ice_servers: Option<Vec<String>>,
}

/// Read a non-blank string variable
fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parse a variable, reporting its name on failure
fn env_parse<T>(name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name}: {e}").into()),
        None => Ok(None),
    }
}

/// Split a comma-separated list, dropping blank entries
pub(super) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load every recognized variable
///
/// # Errors
/// Returns an error when a numeric variable cannot be parsed.
pub(super) fn load_env_config() -> Result<EnvConfig, Box<dyn std::error::Error>> {
    Ok(EnvConfig {
        signaling_url: env_string("VOICE_SIGNALING_URL"),
        signaling_token: env_string("VOICE_SIGNALING_TOKEN"),
        voice_preset: env_string("VOICE_PRESET"),
        voice_header: env_string("VOICE_PRESET_HEADER"),
        instructions: env_string("VOICE_INSTRUCTIONS"),
        transcription_model: env_string("VOICE_TRANSCRIPTION_MODEL"),
        transcription_language: env::var("VOICE_TRANSCRIPTION_LANGUAGE")
            .ok()
            .map(|value| value.trim().to_string()),
        dedup_window_ms: env_parse("VOICE_DEDUP_WINDOW_MS")?,
        barge_in_threshold: env_parse("VOICE_BARGE_IN_THRESHOLD")?,
        ice_servers: env_string("VOICE_ICE_SERVERS").map(|raw| split_list(&raw)),
    })
}
