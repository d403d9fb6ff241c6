use super::EngineConfig;
use super::env::{EnvConfig, load_env_config};
use super::yaml::YamlConfig;

/// Build the final configuration
///
/// Starts from defaults, applies environment variables, then YAML values.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let env = load_env_config()?;
    let mut config = EngineConfig::default();
    apply_env(&mut config, &env);
    if let Some(yaml) = yaml {
        apply_yaml(&mut config, yaml);
    }
    Ok(config)
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn apply_env(config: &mut EngineConfig, env: &EnvConfig) {
    if let Some(url) = &env.signaling_url {
        config.signaling_url = url.clone();
    }
    if let Some(token) = &env.signaling_token {
        config.signaling_token = Some(token.clone());
    }
    if let Some(preset) = &env.voice_preset {
        config.voice_preset = preset.clone();
    }
    if let Some(header) = &env.voice_header {
        config.voice_header = header.clone();
    }
    if let Some(instructions) = &env.instructions {
        config.instructions = Some(instructions.clone());
    }
    if let Some(model) = &env.transcription_model {
        config.transcription_model = model.clone();
    }
    if let Some(language) = &env.transcription_language {
        config.transcription_language = non_empty(language);
    }
    if let Some(window) = env.dedup_window_ms {
        config.transcript.dedup_window_ms = window;
    }
    if let Some(threshold) = env.barge_in_threshold {
        config.barge_in.threshold = threshold;
    }
    if let Some(servers) = &env.ice_servers {
        config.ice_servers = servers.clone();
    }
}

fn apply_yaml(config: &mut EngineConfig, yaml: YamlConfig) {
    if let Some(signaling) = yaml.signaling {
        if let Some(url) = signaling.url {
            config.signaling_url = url;
        }
        if let Some(token) = signaling.token {
            config.signaling_token = non_empty(&token);
        }
        if let Some(header) = signaling.voice_header {
            config.voice_header = header;
        }
        if let Some(timeout) = signaling.timeout_seconds {
            config.signaling_timeout_seconds = timeout;
        }
        if let Some(servers) = signaling.ice_servers {
            config.ice_servers = servers;
        }
    }

    if let Some(session) = yaml.session {
        if let Some(preset) = session.voice_preset {
            config.voice_preset = preset;
        }
        if let Some(instructions) = session.instructions {
            config.instructions = non_empty(&instructions);
        }
        if let Some(greet) = session.greet_on_connect {
            config.greet_on_connect = greet;
        }
        if let Some(model) = session.transcription_model {
            config.transcription_model = model;
        }
        if let Some(language) = session.transcription_language {
            config.transcription_language = non_empty(&language);
        }
    }

    if let Some(audio) = yaml.audio {
        let media = &mut config.media;
        if let Some(v) = audio.echo_cancellation {
            media.echo_cancellation = v;
        }
        if let Some(v) = audio.noise_suppression {
            media.noise_suppression = v;
        }
        if let Some(v) = audio.auto_gain_control {
            media.auto_gain_control = v;
        }
        if let Some(v) = audio.sample_rate {
            media.sample_rate = v;
        }
        if let Some(v) = audio.channels {
            media.channels = v;
        }
    }

    if let Some(transcript) = yaml.transcript {
        if let Some(window) = transcript.dedup_window_ms {
            config.transcript.dedup_window_ms = window;
        }
        if let Some(wake_word) = transcript.wake_word {
            config.transcript.wake_word = wake_word;
        }
        if let Some(mishearings) = transcript.mishearings {
            config.transcript.mishearings = mishearings;
        }
        if let Some(substitutions) = transcript.phrase_substitutions {
            config.transcript.phrase_substitutions = substitutions;
        }
    }

    if let Some(barge_in) = yaml.barge_in {
        if let Some(enabled) = barge_in.enabled {
            config.barge_in.enabled = enabled;
        }
        if let Some(threshold) = barge_in.threshold {
            config.barge_in.threshold = threshold;
        }
        if let Some(interval) = barge_in.interval_ms {
            config.barge_in.interval_ms = interval;
        }
    }

    if let Some(preview) = yaml.preview
        && let Some(linger) = preview.linger_ms
    {
        config.preview_linger_ms = linger;
    }

    if let Some(tools) = yaml.tools {
        config.tools = tools;
    }

    // The language guard follows the transcription language
    config.transcript.expected_language = config.transcription_language.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::{SessionYaml, SignalingYaml};

    #[test]
    fn test_apply_env_overrides_defaults() {
        let mut config = EngineConfig::default();
        let env = EnvConfig {
            signaling_url: Some("https://env.example.com/offer".to_string()),
            barge_in_threshold: Some(25),
            transcription_language: Some(String::new()),
            ..Default::default()
        };
        apply_env(&mut config, &env);

        assert_eq!(config.signaling_url, "https://env.example.com/offer");
        assert_eq!(config.barge_in.threshold, 25);
        assert!(config.transcription_language.is_none());
    }

    #[test]
    fn test_apply_yaml_overrides_env() {
        let mut config = EngineConfig::default();
        apply_env(
            &mut config,
            &EnvConfig {
                signaling_url: Some("https://env.example.com/offer".to_string()),
                voice_preset: Some("ash_env".to_string()),
                ..Default::default()
            },
        );
        apply_yaml(
            &mut config,
            YamlConfig {
                signaling: Some(SignalingYaml {
                    url: Some("https://yaml.example.com/offer".to_string()),
                    ..Default::default()
                }),
                session: Some(SessionYaml {
                    transcription_language: Some("fr".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );

        assert_eq!(config.signaling_url, "https://yaml.example.com/offer");
        // Untouched by YAML, env value stays
        assert_eq!(config.voice_preset, "ash_env");
        assert_eq!(config.transcription_language.as_deref(), Some("fr"));
        assert_eq!(config.transcript.expected_language.as_deref(), Some("fr"));
    }
}
