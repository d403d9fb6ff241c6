use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Parser, Subcommand};

use waav_voice_engine::{EngineConfig, VoicePreset, core::realtime::VOICE_PRESETS};

/// WaaV Voice - Realtime voice conversations from the terminal
#[derive(Parser, Debug)]
#[command(name = "waav-voice")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a voice call; typed lines are sent as user text
    Call,

    /// Play a short sample of a voice preset
    Preview {
        /// Voice preset identifier
        #[arg(short = 'p', long = "preset")]
        preset: String,
    },

    /// List available voice presets
    Presets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Commands::Presets = cli.command {
        for preset in VOICE_PRESETS {
            let marker = if preset.id == VoicePreset::default_preset().id {
                " (default)"
            } else {
                ""
            };
            println!("{:<22} {} [{}]{}", preset.id, preset.label, preset.voice, marker);
        }
        return Ok(());
    }

    // Load configuration from file or environment
    let config = if let Some(config_path) = cli.config {
        println!("Loading configuration from {}", config_path.display());
        EngineConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        EngineConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    run(cli.command, config).await
}

#[cfg(all(feature = "native-webrtc", feature = "native-audio"))]
async fn run(command: Commands, config: EngineConfig) -> anyhow::Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::sync::watch;
    use tracing::warn;
    use waav_voice_engine::{CallStatus, MediaBackend, VoiceEngine};

    let backend = MediaBackend::native(config.ice_servers.clone());
    let engine = VoiceEngine::from_config(&config, backend)?;

    engine.on_turn(Arc::new(|turn| {
        Box::pin(async move {
            println!("[{}] {}", turn.role, turn.text);
        })
    }));
    engine.on_error(Arc::new(|err| {
        Box::pin(async move {
            eprintln!("error: {err}");
        })
    }));

    let (status_tx, mut status_rx) = watch::channel(engine.status());
    let status_tx = Arc::new(status_tx);
    engine.on_status(Arc::new(move |status| {
        let status_tx = status_tx.clone();
        Box::pin(async move {
            let _ = status_tx.send(status);
        })
    }));

    match command {
        Commands::Call => {
            engine.start().await?;
            println!("Call started. Type a message and press enter, Ctrl-C to hang up.");

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    // Transport loss tears the call down without user input
                    changed = status_rx.changed() => {
                        if changed.is_err() || !engine.is_listening() {
                            break;
                        }
                    }
                    line = lines.next_line() => match line? {
                        Some(line) => {
                            if let Err(e) = engine.send_text(&line).await {
                                warn!("Failed to send text: {}", e);
                            }
                        }
                        None => break,
                    },
                }
            }

            engine.stop().await;
        }
        Commands::Preview { preset } => {
            engine.preview_voice(&preset).await?;
            // Preview tears itself down after the sample plays
            let finished = status_rx.wait_for(|status| *status != CallStatus::Previewing);
            if tokio::time::timeout(Duration::from_secs(30), finished)
                .await
                .is_err()
            {
                warn!("Preview did not finish in time");
            }
            engine.stop_preview().await;
        }
        Commands::Presets => {}
    }

    if let Some(err) = engine.last_error() {
        return Err(anyhow!(err));
    }
    Ok(())
}

#[cfg(not(all(feature = "native-webrtc", feature = "native-audio")))]
async fn run(_command: Commands, _config: EngineConfig) -> anyhow::Result<()> {
    anyhow::bail!("Calls need the native media backend; rebuild with `--features native`")
}
