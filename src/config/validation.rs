use std::collections::HashSet;

use tracing::warn;

use crate::core::realtime::VoicePreset;
use crate::core::tools::HttpToolConfig;
use crate::utils::url_validation::validate_endpoint_url;

/// Validate the signaling endpoint URL
pub(super) fn validate_signaling_url(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    validate_endpoint_url(url).map_err(|e| format!("Invalid signaling URL '{url}': {e}"))?;
    Ok(())
}

/// Validate tool definitions
///
/// Names must be non-empty and unique, URLs must be valid endpoints.
pub(super) fn validate_tools(tools: &[HttpToolConfig]) -> Result<(), Box<dyn std::error::Error>> {
    let mut seen = HashSet::new();
    for tool in tools {
        let name = tool.name.trim();
        if name.is_empty() {
            return Err("Tool name cannot be empty".into());
        }
        if !seen.insert(name.to_string()) {
            return Err(format!("Duplicate tool name: {name}").into());
        }
        validate_endpoint_url(&tool.url)
            .map_err(|e| format!("Invalid URL for tool '{name}': {e}"))?;
        if tool.timeout_seconds == Some(0) {
            return Err(format!("Tool '{name}' timeout_seconds must be greater than 0").into());
        }
    }
    Ok(())
}

/// Validate barge-in detection parameters
///
/// The level meter reports peak deviation from the midpoint, so useful
/// thresholds lie between 1 and 127.
pub(super) fn validate_barge_in(
    threshold: u8,
    interval_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    if !(1..=127).contains(&threshold) {
        return Err(format!("Barge-in threshold must be between 1 and 127, got {threshold}").into());
    }
    if interval_ms == 0 {
        return Err("Barge-in interval_ms must be greater than 0".into());
    }
    Ok(())
}

/// Warn about voice presets that will fall back to the default
pub(super) fn check_voice_preset(preset: &str) {
    if VoicePreset::find(preset).is_none() {
        warn!(
            "Unknown voice preset '{}', falling back to '{}'",
            preset,
            VoicePreset::default_preset().id
        );
    }
}
