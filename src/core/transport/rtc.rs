//! Peer connection backed by webrtc-rs, with Opus for the audio lanes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use opus::{Application, Channels, Decoder, Encoder};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MediaEngine};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use super::base::{
    DEFAULT_ICE_SERVER, DataChannel, DataChannelState, PeerConnection, PeerConnectionFactory,
    PeerConnectionState, TransportEvent, TransportEventSender,
};
use crate::core::audio::{
    AudioFrame, FRAME_DURATION_MS, FRAME_SAMPLES, MediaTrack, RemoteAudioTrack, SAMPLE_RATE,
};
use crate::core::realtime::{RealtimeError, RealtimeResult};

/// Upper bound on waiting for ICE gathering before sending the offer.
const ICE_GATHER_TIMEOUT: Duration = Duration::from_secs(3);

/// Max encoded Opus packet size.
const MAX_OPUS_PACKET: usize = 1500;

/// Max decoded samples per packet (120 ms at 48 kHz).
const MAX_DECODED_SAMPLES: usize = 5760;

/// Decoded frames buffered for the renderer.
const REMOTE_FRAME_BUFFER: usize = 128;

/// Event sink shared by handlers; emptied on detach.
type SharedSink = Arc<Mutex<Option<TransportEventSender>>>;

fn emit(sink: &SharedSink, event: TransportEvent) {
    if let Some(tx) = sink.lock().as_ref() {
        let _ = tx.send(event);
    }
}

fn transport_err(context: &'static str) -> impl Fn(webrtc::Error) -> RealtimeError {
    move |e| RealtimeError::Transport(format!("{context}: {e}"))
}

fn map_state(state: RTCPeerConnectionState) -> PeerConnectionState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => PeerConnectionState::New,
        RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
        RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
        RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Creates webrtc-rs peer connections.
#[derive(Debug, Clone)]
pub struct WebRtcPeerFactory {
    ice_servers: Vec<String>,
}

impl WebRtcPeerFactory {
    pub fn new(ice_servers: Vec<String>) -> Self {
        let ice_servers = if ice_servers.is_empty() {
            vec![DEFAULT_ICE_SERVER.to_string()]
        } else {
            ice_servers
        };
        Self { ice_servers }
    }
}

impl Default for WebRtcPeerFactory {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl PeerConnectionFactory for WebRtcPeerFactory {
    async fn create(&self, events: TransportEventSender) -> RealtimeResult<Arc<dyn PeerConnection>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(transport_err("Failed to register codecs"))?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(transport_err("Failed to register interceptors"))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(transport_err("Failed to create peer connection"))?,
        );

        let peer = WebRtcPeer {
            pc,
            sink: Arc::new(Mutex::new(Some(events))),
            has_local_audio: AtomicBool::new(false),
            tasks: Arc::new(Mutex::new(Vec::new())),
        };
        peer.install_handlers();
        Ok(Arc::new(peer))
    }
}

// =============================================================================
// Peer Connection
// =============================================================================

struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    sink: SharedSink,
    has_local_audio: AtomicBool,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl WebRtcPeer {
    fn install_handlers(&self) {
        let sink = self.sink.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                info!("Peer connection state: {}", state);
                emit(&sink, TransportEvent::ConnectionState(map_state(state)));
                Box::pin(async {})
            }));

        let sink = self.sink.clone();
        let tasks = self.tasks.clone();
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                if track.kind() == RTPCodecType::Audio {
                    let (tx, rx) = mpsc::channel(REMOTE_FRAME_BUFFER);
                    let id = track.id();
                    tasks.lock().push(tokio::spawn(decode_remote(track, tx)));
                    emit(&sink, TransportEvent::RemoteTrack(RemoteAudioTrack::new(id, rx)));
                }
                Box::pin(async {})
            },
        ));
    }
}

async fn decode_remote(track: Arc<TrackRemote>, frames: mpsc::Sender<AudioFrame>) {
    let mut decoder = match Decoder::new(SAMPLE_RATE, Channels::Mono) {
        Ok(decoder) => decoder,
        Err(e) => {
            warn!("Failed to create Opus decoder: {}", e);
            return;
        }
    };
    let mut pcm = vec![0i16; MAX_DECODED_SAMPLES];
    while let Ok((packet, _)) = track.read_rtp().await {
        if packet.payload.is_empty() {
            continue;
        }
        match decoder.decode(&packet.payload, &mut pcm, false) {
            Ok(n) => {
                let frame = AudioFrame::from_i16(&pcm[..n], SAMPLE_RATE, 1);
                if frames.send(frame).await.is_err() {
                    break;
                }
            }
            Err(e) => trace!("Dropping undecodable packet: {}", e),
        }
    }
    debug!("Remote track {} ended", track.id());
}

async fn encode_local(
    mut frames: broadcast::Receiver<AudioFrame>,
    local: Arc<TrackLocalStaticSample>,
) {
    let mut encoder = match Encoder::new(SAMPLE_RATE, Channels::Mono, Application::Voip) {
        Ok(encoder) => encoder,
        Err(e) => {
            warn!("Failed to create Opus encoder: {}", e);
            return;
        }
    };
    let mut pending: Vec<i16> = Vec::with_capacity(FRAME_SAMPLES * 2);
    let mut packet = vec![0u8; MAX_OPUS_PACKET];
    loop {
        let frame = match frames.recv().await {
            Ok(frame) => frame,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                trace!("Encoder skipped {} frames", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        pending.extend(frame.to_i16());
        while pending.len() >= FRAME_SAMPLES {
            let chunk: Vec<i16> = pending.drain(..FRAME_SAMPLES).collect();
            let len = match encoder.encode(&chunk, &mut packet) {
                Ok(len) => len,
                Err(e) => {
                    warn!("Opus encode failed: {}", e);
                    continue;
                }
            };
            let sample = Sample {
                data: Bytes::copy_from_slice(&packet[..len]),
                duration: Duration::from_millis(FRAME_DURATION_MS),
                ..Default::default()
            };
            if let Err(e) = local.write_sample(&sample).await {
                debug!("Local track write failed: {}", e);
                return;
            }
        }
    }
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    async fn add_local_track(&self, track: &MediaTrack) -> RealtimeResult<()> {
        let local = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_string(),
                clock_rate: SAMPLE_RATE,
                channels: 2,
                ..Default::default()
            },
            "audio".to_string(),
            format!("waav-{}", track.id()),
        ));

        let rtp_sender = self
            .pc
            .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(transport_err("Failed to add local track"))?;

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; MAX_OPUS_PACKET];
            while rtp_sender.read(&mut rtcp_buf).await.is_ok() {}
        }));
        tasks.push(tokio::spawn(encode_local(track.subscribe(), local)));
        self.has_local_audio.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn request_inbound_audio(&self) -> RealtimeResult<()> {
        // A send-receive transceiver already exists once a local track is attached
        if self.has_local_audio.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.pc
            .add_transceiver_from_kind(
                RTPCodecType::Audio,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(transport_err("Failed to add receive transceiver"))?;
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> RealtimeResult<Arc<dyn DataChannel>> {
        let dc = self
            .pc
            .create_data_channel(label, None)
            .await
            .map_err(transport_err("Failed to create data channel"))?;
        let channel = WebRtcDataChannel {
            dc,
            label: label.to_string(),
            sink: Arc::new(Mutex::new(self.sink.lock().clone())),
        };
        channel.install_handlers();
        Ok(Arc::new(channel))
    }

    async fn create_offer(&self) -> RealtimeResult<String> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(transport_err("Failed to create offer"))?;
        Ok(offer.sdp)
    }

    async fn set_local_description(&self, sdp: &str) -> RealtimeResult<String> {
        let offer = RTCSessionDescription::offer(sdp.to_string())
            .map_err(transport_err("Invalid local offer"))?;
        let mut gathered = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(offer)
            .await
            .map_err(transport_err("Failed to set local description"))?;

        if tokio::time::timeout(ICE_GATHER_TIMEOUT, gathered.recv())
            .await
            .is_err()
        {
            debug!("ICE gathering still running, sending partial offer");
        }

        self.pc
            .local_description()
            .await
            .map(|desc| desc.sdp)
            .ok_or_else(|| RealtimeError::Transport("Missing local description".to_string()))
    }

    async fn set_remote_description(&self, sdp: &str) -> RealtimeResult<()> {
        let answer = RTCSessionDescription::answer(sdp.to_string())
            .map_err(|e| RealtimeError::Signaling(format!("Invalid answer SDP: {e}")))?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(transport_err("Failed to set remote description"))
    }

    fn connection_state(&self) -> PeerConnectionState {
        map_state(self.pc.connection_state())
    }

    fn detach_handlers(&self) {
        self.sink.lock().take();
        self.pc
            .on_peer_connection_state_change(Box::new(|_| Box::pin(async {})));
        self.pc.on_track(Box::new(|_, _, _| Box::pin(async {})));
    }

    async fn close(&self) -> RealtimeResult<()> {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.pc
            .close()
            .await
            .map_err(transport_err("Failed to close peer connection"))
    }
}

// =============================================================================
// Data Channel
// =============================================================================

struct WebRtcDataChannel {
    dc: Arc<RTCDataChannel>,
    label: String,
    sink: SharedSink,
}

impl WebRtcDataChannel {
    fn install_handlers(&self) {
        let sink = self.sink.clone();
        let label = self.label.clone();
        self.dc.on_open(Box::new(move || {
            debug!("Data channel {} open", label);
            emit(
                &sink,
                TransportEvent::ChannelOpen {
                    label: label.clone(),
                },
            );
            Box::pin(async {})
        }));

        let sink = self.sink.clone();
        let label = self.label.clone();
        self.dc.on_message(Box::new(move |msg: DataChannelMessage| {
            match String::from_utf8(msg.data.to_vec()) {
                Ok(text) => emit(
                    &sink,
                    TransportEvent::ChannelMessage {
                        label: label.clone(),
                        text,
                    },
                ),
                Err(_) => trace!("Ignoring binary message on {}", label),
            }
            Box::pin(async {})
        }));

        let sink = self.sink.clone();
        let label = self.label.clone();
        self.dc.on_close(Box::new(move || {
            emit(
                &sink,
                TransportEvent::ChannelClosed {
                    label: label.clone(),
                },
            );
            Box::pin(async {})
        }));
    }
}

#[async_trait]
impl DataChannel for WebRtcDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn ready_state(&self) -> DataChannelState {
        match self.dc.ready_state() {
            RTCDataChannelState::Open => DataChannelState::Open,
            RTCDataChannelState::Closing => DataChannelState::Closing,
            RTCDataChannelState::Closed => DataChannelState::Closed,
            _ => DataChannelState::Connecting,
        }
    }

    async fn send_text(&self, text: String) -> RealtimeResult<()> {
        if !self.is_open() {
            return Err(RealtimeError::NotConnected);
        }
        self.dc
            .send_text(text)
            .await
            .map(|_| ())
            .map_err(transport_err("Failed to send on data channel"))
    }

    fn detach(&self) {
        self.sink.lock().take();
    }

    async fn close(&self) -> RealtimeResult<()> {
        self.dc
            .close()
            .await
            .map_err(transport_err("Failed to close data channel"))
    }
}
