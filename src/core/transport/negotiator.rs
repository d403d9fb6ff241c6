use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::base::{DataChannel, PeerConnection, PeerConnectionFactory, TransportEventSender};
use super::signaling::SignalingClient;
use crate::core::audio::{AudioContext, MediaConstraints, MicrophoneSource};
use crate::core::call::ResourceRegistry;
use crate::core::realtime::{RealtimeError, RealtimeResult};

/// Parameters of one connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    /// Label of the control data channel
    pub channel_label: String,
    /// Voice sent to the signaling endpoint
    pub voice: Option<String>,
    pub constraints: MediaConstraints,
}

/// An established session transport and every resource it owns.
pub struct Connection {
    pub peer: Arc<dyn PeerConnection>,
    pub channel: Arc<dyn DataChannel>,
    pub audio_context: Arc<AudioContext>,
    pub resources: ResourceRegistry,
}

/// Opens the peer-to-peer media and data session.
///
/// The sequence is fixed: acquire the microphone, create the peer
/// connection, attach local tracks, request inbound audio, create the
/// control channel, build the offer, exchange it with the signaling
/// endpoint and apply the answer. Every resource is registered as soon as
/// it exists so a failure or cancellation at any step releases exactly what
/// was created.
#[derive(Clone)]
pub struct Negotiator {
    factory: Arc<dyn PeerConnectionFactory>,
    microphone: Arc<dyn MicrophoneSource>,
    signaling: Arc<SignalingClient>,
}

impl Negotiator {
    pub fn new(
        factory: Arc<dyn PeerConnectionFactory>,
        microphone: Arc<dyn MicrophoneSource>,
        signaling: Arc<SignalingClient>,
    ) -> Self {
        Self {
            factory,
            microphone,
            signaling,
        }
    }

    /// Run the connection sequence.
    ///
    /// # Errors
    /// `MediaAccess` when the microphone cannot be acquired, `Signaling`
    /// when the exchange fails, `Transport` for peer connection failures,
    /// `InvalidState` when `cancel` fires first. Partially created resources
    /// are released before returning.
    pub async fn connect(
        &self,
        request: &ConnectRequest,
        events: TransportEventSender,
        cancel: &CancellationToken,
    ) -> RealtimeResult<Connection> {
        let mut resources = ResourceRegistry::new();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RealtimeError::InvalidState(
                "Connection attempt cancelled".to_string(),
            )),
            result = self.run(request, events, &mut resources) => result,
        };
        match outcome {
            Ok((peer, channel, audio_context)) => Ok(Connection {
                peer,
                channel,
                audio_context,
                resources,
            }),
            Err(e) => {
                warn!("Connection attempt failed: {}", e);
                resources.detach_handlers();
                resources.release().await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &ConnectRequest,
        events: TransportEventSender,
        resources: &mut ResourceRegistry,
    ) -> RealtimeResult<(Arc<dyn PeerConnection>, Arc<dyn DataChannel>, Arc<AudioContext>)> {
        let stream = self.microphone.acquire(&request.constraints).await?;
        resources.set_local_stream(stream.clone());
        debug!("Microphone acquired with {} track(s)", stream.tracks().len());

        let audio_context = Arc::new(AudioContext::new());
        resources.set_audio_context(audio_context.clone());
        for track in stream.tracks() {
            audio_context.connect_source(track);
        }

        let peer = self.factory.create(events).await?;
        resources.set_peer(peer.clone());

        for track in stream.tracks() {
            peer.add_local_track(track).await?;
        }
        peer.request_inbound_audio().await?;

        let channel = peer.create_data_channel(&request.channel_label).await?;
        resources.set_channel(channel.clone());

        let offer = peer.create_offer().await?;
        let local = peer.set_local_description(&offer).await?;

        let answer = self
            .signaling
            .exchange(&local, request.voice.as_deref())
            .await?;
        peer.set_remote_description(&answer).await?;

        info!(
            "Transport negotiated via {} (channel {})",
            self.signaling.url(),
            request.channel_label
        );
        Ok((peer, channel, audio_context))
    }
}
