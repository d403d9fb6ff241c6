//! Voice preview sessions.
//!
//! A preview opens its own short-lived transport to have the service speak a
//! preset's sample line. It is refused while a call is active and tears
//! itself down shortly after the response completes or on the first error.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant as TokioInstant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::engine::{EngineShared, send_event, stopped_while_connecting};
use super::resources::ConnectAttempt;
use super::state::CallStatus;
use crate::core::audio::RemoteAudioTrack;
use crate::core::realtime::{
    ClientEvent, EventKind, EventStreamDecoder, PREVIEW_CHANNEL_LABEL, RealtimeError,
    RealtimeResult, ResponseConfig, VoicePreset,
};
use crate::core::transport::{
    ConnectRequest, Connection, DataChannel, TransportEvent, TransportEventReceiver,
};

/// Default delay between preview completion and teardown.
pub const DEFAULT_PREVIEW_LINGER_MS: u64 = 400;

/// Parked deadline for the linger timer before completion.
const LINGER_PARKED: Duration = Duration::from_secs(24 * 60 * 60);

impl EngineShared {
    pub(super) async fn preview_voice(self: &Arc<Self>, preset_id: &str) -> RealtimeResult<()> {
        if self.status().is_call_active() {
            return Err(RealtimeError::InvalidState(
                "Cannot preview a voice during an active call".to_string(),
            ));
        }
        self.stop_preview().await;

        let preset = VoicePreset::find_or_default(preset_id);
        if preset.id != preset_id.trim() {
            debug!("Unknown preset {}, previewing {}", preset_id, preset.id);
        }

        let attempt = ConnectAttempt::new();
        let epoch = {
            let mut st = self.state.lock();
            if !st.status.can_transition_to(CallStatus::Previewing) {
                return Err(RealtimeError::InvalidState(format!(
                    "Cannot preview a voice while {}",
                    st.status
                )));
            }
            info!("Call status {} -> {}", st.status, CallStatus::Previewing);
            st.status = CallStatus::Previewing;
            st.preview_epoch += 1;
            st.preview_connecting = Some(attempt.clone());
            st.preview_epoch
        };
        let _settled = attempt.settle_guard();
        self.notify_status(CallStatus::Previewing).await;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let request = ConnectRequest {
            channel_label: PREVIEW_CHANNEL_LABEL.to_string(),
            voice: Some(preset.voice.as_str().to_string()),
            constraints: self.settings.media.clone(),
        };

        let connection = match self
            .negotiator
            .connect(&request, events_tx, attempt.cancel_token())
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                let current = {
                    let mut st = self.state.lock();
                    if st.preview_epoch == epoch {
                        st.preview_connecting = None;
                        true
                    } else {
                        false
                    }
                };
                if !current {
                    debug!("Preview connect abandoned: {}", e);
                    return Err(stopped_while_connecting());
                }
                warn!("Voice preview failed: {}", e);
                self.record_error_if_empty(e.clone()).await;
                self.finish_preview(Some(epoch)).await;
                return Err(e);
            }
        };

        let Connection {
            channel,
            mut resources,
            ..
        } = connection;
        let cancel = resources.cancel_token();

        let adopted = {
            let mut st = self.state.lock();
            if st.preview_epoch == epoch {
                st.preview_connecting = None;
                st.preview_resources = std::mem::take(&mut resources);
                true
            } else {
                false
            }
        };
        if !adopted {
            debug!("Preview stopped while connecting");
            resources.detach_handlers();
            resources.release().await;
            return Err(stopped_while_connecting());
        }

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            shared
                .run_preview(epoch, preset, events_rx, channel, cancel)
                .await;
        });
        info!("Previewing voice preset {}", preset.id);
        Ok(())
    }

    /// Stop any running preview. Idempotent.
    pub(super) async fn stop_preview(&self) {
        self.finish_preview(None).await;
    }

    fn is_preview_current(&self, epoch: u64) -> bool {
        self.state.lock().preview_epoch == epoch
    }

    /// Release the preview registry, aborting a preview still connecting.
    /// With an epoch, only that preview is stopped so a stale timer cannot
    /// end a newer one.
    async fn finish_preview(&self, epoch: Option<u64>) {
        let (mut registry, attempt) = {
            let mut st = self.state.lock();
            if let Some(epoch) = epoch
                && st.preview_epoch != epoch
            {
                return;
            }
            st.preview_epoch += 1;
            st.preview_resources.detach_handlers();
            (
                std::mem::take(&mut st.preview_resources),
                st.preview_connecting.take(),
            )
        };
        if let Some(attempt) = attempt {
            debug!("Aborting preview negotiation");
            attempt.abort().await;
        }
        let had_resources = !registry.is_empty();
        registry.release().await;
        if had_resources {
            debug!("Preview resources released");
        }
        if self.status() == CallStatus::Previewing {
            self.set_status(CallStatus::Idle).await;
        }
    }

    async fn run_preview(
        self: Arc<Self>,
        epoch: u64,
        preset: &'static VoicePreset,
        mut events: TransportEventReceiver,
        channel: Arc<dyn DataChannel>,
        cancel: CancellationToken,
    ) {
        let mut decoder = EventStreamDecoder::new();
        let linger = tokio::time::sleep(LINGER_PARKED);
        tokio::pin!(linger);
        let mut lingering = false;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                () = &mut linger, if lingering => {
                    debug!("Preview complete");
                    self.finish_preview(Some(epoch)).await;
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    if !self.is_preview_current(epoch) {
                        break;
                    }
                    match event {
                        TransportEvent::ConnectionState(state) if state.is_fatal() => {
                            self.fail_preview(epoch, RealtimeError::Transport(format!(
                                "Voice preview connection {}",
                                state
                            )))
                            .await;
                            break;
                        }
                        TransportEvent::ConnectionState(state) => {
                            debug!("Preview connection state: {}", state);
                        }
                        TransportEvent::ChannelOpen { label } if label == channel.label() => {
                            if let Err(e) = self.request_sample(preset, channel.as_ref()).await {
                                self.fail_preview(epoch, e).await;
                                break;
                            }
                        }
                        TransportEvent::ChannelMessage { label, text } if label == channel.label() => {
                            let mut failed = None;
                            for event in decoder.decode(&text) {
                                match event.kind {
                                    EventKind::ResponseCompleted
                                    | EventKind::ResponseDone
                                    | EventKind::AudioDone => {
                                        if !lingering {
                                            lingering = true;
                                            linger.as_mut().reset(
                                                TokioInstant::now()
                                                    + Duration::from_millis(self.settings.preview_linger_ms),
                                            );
                                        }
                                    }
                                    EventKind::ServerError | EventKind::ResponseFailed => {
                                        let message = event
                                            .error_message()
                                            .unwrap_or_else(|| format!("{} received", event.tag));
                                        failed = Some(RealtimeError::ServerReported(message));
                                        break;
                                    }
                                    _ => trace!("Preview event {}", event.tag),
                                }
                            }
                            if let Some(err) = failed {
                                self.fail_preview(epoch, err).await;
                                break;
                            }
                        }
                        TransportEvent::ChannelClosed { label } if label == channel.label() => {
                            self.fail_preview(
                                epoch,
                                RealtimeError::Transport("Voice preview channel closed".to_string()),
                            )
                            .await;
                            break;
                        }
                        TransportEvent::RemoteTrack(track) => self.play_preview(epoch, track),
                        _ => {}
                    }
                }
            }
        }
    }

    async fn request_sample(
        &self,
        preset: &VoicePreset,
        channel: &dyn DataChannel,
    ) -> RealtimeResult<()> {
        let update = self
            .settings
            .session_update(preset.voice.as_str(), Vec::new());
        send_event(channel, &update).await?;
        let speak = ClientEvent::create_response(Some(ResponseConfig::audio_and_text(Some(
            preset.preview_prompt(),
        ))));
        send_event(channel, &speak).await?;
        debug!("Requested preview sample for {}", preset.id);
        Ok(())
    }

    fn play_preview(&self, epoch: u64, track: RemoteAudioTrack) {
        match self.renderer.play(track) {
            Ok(handle) => {
                let mut st = self.state.lock();
                if st.preview_epoch == epoch {
                    st.preview_resources.add_playback(handle);
                } else {
                    handle.stop();
                }
            }
            Err(e) => warn!("Failed to play preview audio: {}", e),
        }
    }

    async fn fail_preview(&self, epoch: u64, err: RealtimeError) {
        warn!("Voice preview failed: {}", err);
        self.record_error_if_empty(err).await;
        self.finish_preview(Some(epoch)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_prompt() {
        let preset = VoicePreset::default_preset();
        let prompt = preset.preview_prompt();
        assert!(prompt.starts_with("Say exactly this phrase with emotion: \""));
        assert!(prompt.contains(preset.preview_text));
    }

    #[test]
    fn test_linger_default() {
        assert_eq!(DEFAULT_PREVIEW_LINGER_MS, 400);
        assert!(LINGER_PARKED > Duration::from_millis(DEFAULT_PREVIEW_LINGER_MS));
    }
}
