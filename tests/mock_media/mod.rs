//! In-process media doubles for engine tests
//!
//! Replaces the peer connection, data channel, microphone and speaker with
//! recording fakes. The signaling endpoint is a wiremock server that answers
//! every offer with a fixed session description.
//!
//! Tests drive the engine by injecting transport events through
//! [`FakePeer::emit`], exactly as a real peer connection's handlers would.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use waav_voice_engine::core::audio::{
    AudioFrame, AudioRenderer, FRAME_SAMPLES, LocalStream, MediaConstraints, MediaTrack,
    MicrophoneSource, PlaybackHandle, RemoteAudioTrack,
};
use waav_voice_engine::core::realtime::{RealtimeError, RealtimeResult};
use waav_voice_engine::core::transport::{
    DataChannel, DataChannelState, PeerConnection, PeerConnectionFactory, PeerConnectionState,
    SignalingConfig, TransportEvent, TransportEventSender,
};
use waav_voice_engine::{MediaBackend, SessionSettings, VoiceEngine};

pub const OFFER_PATH: &str = "/api/voice/offer";

pub const ANSWER_SDP: &str =
    "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n";

// =============================================================================
// Data Channel
// =============================================================================

pub struct FakeDataChannel {
    label: String,
    state: Mutex<DataChannelState>,
    sent: Mutex<Vec<String>>,
    detached: AtomicBool,
}

impl FakeDataChannel {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            state: Mutex::new(DataChannelState::Connecting),
            sent: Mutex::new(Vec::new()),
            detached: AtomicBool::new(false),
        }
    }

    pub fn set_state(&self, state: DataChannelState) {
        *self.state.lock() = state;
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .map(|text| serde_json::from_str(text).expect("sent events are JSON"))
            .collect()
    }

    /// `type` tags of every sent event, in order.
    pub fn sent_types(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|event| event["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        *self.state.lock() == DataChannelState::Closed
    }
}

#[async_trait]
impl DataChannel for FakeDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn ready_state(&self) -> DataChannelState {
        *self.state.lock()
    }

    async fn send_text(&self, text: String) -> RealtimeResult<()> {
        if !self.is_open() {
            return Err(RealtimeError::NotConnected);
        }
        self.sent.lock().push(text);
        Ok(())
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    async fn close(&self) -> RealtimeResult<()> {
        self.set_state(DataChannelState::Closed);
        Ok(())
    }
}

// =============================================================================
// Peer Connection
// =============================================================================

pub struct FakePeer {
    events: TransportEventSender,
    state: Mutex<PeerConnectionState>,
    channels: Mutex<Vec<Arc<FakeDataChannel>>>,
    local_tracks: Mutex<Vec<MediaTrack>>,
    inbound_requested: AtomicBool,
    detached: AtomicBool,
}

impl FakePeer {
    fn new(events: TransportEventSender) -> Self {
        Self {
            events,
            state: Mutex::new(PeerConnectionState::New),
            channels: Mutex::new(Vec::new()),
            local_tracks: Mutex::new(Vec::new()),
            inbound_requested: AtomicBool::new(false),
            detached: AtomicBool::new(false),
        }
    }

    /// Deliver an event as the peer's handlers would. Dropped once detached.
    pub fn emit(&self, event: TransportEvent) {
        if self.is_detached() {
            return;
        }
        let _ = self.events.send(event);
    }

    /// Mark the control channel open and announce it.
    pub fn open_channel(&self) {
        let channel = self.channel();
        channel.set_state(DataChannelState::Open);
        self.emit(TransportEvent::ChannelOpen {
            label: channel.label().to_string(),
        });
    }

    /// Deliver one server event on the control channel.
    pub fn server_event(&self, event: Value) {
        self.emit(TransportEvent::ChannelMessage {
            label: self.channel().label().to_string(),
            text: event.to_string(),
        });
    }

    /// Deliver an inbound assistant track. Returns its frame sender.
    pub fn remote_track(&self, id: &str) -> mpsc::Sender<AudioFrame> {
        let (tx, rx) = mpsc::channel(8);
        self.emit(TransportEvent::RemoteTrack(RemoteAudioTrack::new(id, rx)));
        tx
    }

    pub fn fail(&self) {
        *self.state.lock() = PeerConnectionState::Failed;
        self.emit(TransportEvent::ConnectionState(PeerConnectionState::Failed));
    }

    pub fn channel(&self) -> Arc<FakeDataChannel> {
        self.channels
            .lock()
            .last()
            .cloned()
            .expect("a data channel was created")
    }

    pub fn local_tracks(&self) -> Vec<MediaTrack> {
        self.local_tracks.lock().clone()
    }

    pub fn inbound_requested(&self) -> bool {
        self.inbound_requested.load(Ordering::SeqCst)
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        *self.state.lock() == PeerConnectionState::Closed
    }

    /// Local offer applied, answer not yet received.
    pub fn awaiting_answer(&self) -> bool {
        *self.state.lock() == PeerConnectionState::Connecting
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn add_local_track(&self, track: &MediaTrack) -> RealtimeResult<()> {
        self.local_tracks.lock().push(track.clone());
        Ok(())
    }

    async fn request_inbound_audio(&self) -> RealtimeResult<()> {
        self.inbound_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> RealtimeResult<Arc<dyn DataChannel>> {
        let channel = Arc::new(FakeDataChannel::new(label));
        self.channels.lock().push(channel.clone());
        Ok(channel)
    }

    async fn create_offer(&self) -> RealtimeResult<String> {
        Ok("v=0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n".to_string())
    }

    async fn set_local_description(&self, sdp: &str) -> RealtimeResult<String> {
        *self.state.lock() = PeerConnectionState::Connecting;
        Ok(sdp.to_string())
    }

    async fn set_remote_description(&self, _sdp: &str) -> RealtimeResult<()> {
        *self.state.lock() = PeerConnectionState::Connected;
        Ok(())
    }

    fn connection_state(&self) -> PeerConnectionState {
        *self.state.lock()
    }

    fn detach_handlers(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    async fn close(&self) -> RealtimeResult<()> {
        *self.state.lock() = PeerConnectionState::Closed;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePeerFactory {
    peers: Mutex<Vec<Arc<FakePeer>>>,
}

impl FakePeerFactory {
    pub fn peers(&self) -> Vec<Arc<FakePeer>> {
        self.peers.lock().clone()
    }

    pub fn latest(&self) -> Arc<FakePeer> {
        self.peers
            .lock()
            .last()
            .cloned()
            .expect("a peer connection was created")
    }
}

#[async_trait]
impl PeerConnectionFactory for FakePeerFactory {
    async fn create(&self, events: TransportEventSender) -> RealtimeResult<Arc<dyn PeerConnection>> {
        let peer = Arc::new(FakePeer::new(events));
        self.peers.lock().push(peer.clone());
        Ok(peer)
    }
}

// =============================================================================
// Microphone and Speaker
// =============================================================================

#[derive(Default)]
pub struct FakeMicrophone {
    deny: AtomicBool,
    tracks: Mutex<Vec<MediaTrack>>,
}

impl FakeMicrophone {
    pub fn denied() -> Self {
        let mic = Self::default();
        mic.deny.store(true, Ordering::SeqCst);
        mic
    }

    /// Every track handed out so far.
    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.tracks.lock().clone()
    }

    /// Push one frame at the given amplitude into the latest track.
    pub fn speak(&self, amplitude: f32) {
        if let Some(track) = self.tracks.lock().last() {
            track.push_frame(AudioFrame::mono(vec![amplitude; FRAME_SAMPLES]));
        }
    }
}

#[async_trait]
impl MicrophoneSource for FakeMicrophone {
    async fn acquire(&self, _constraints: &MediaConstraints) -> RealtimeResult<LocalStream> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(RealtimeError::MediaAccess("Permission denied".to_string()));
        }
        let track = MediaTrack::new("fake-mic");
        self.tracks.lock().push(track.clone());
        Ok(LocalStream::new(vec![track]))
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    handles: Mutex<Vec<PlaybackHandle>>,
}

impl FakeRenderer {
    pub fn handles(&self) -> Vec<PlaybackHandle> {
        self.handles.lock().clone()
    }
}

impl AudioRenderer for FakeRenderer {
    fn play(&self, _track: RemoteAudioTrack) -> RealtimeResult<PlaybackHandle> {
        let handle = PlaybackHandle::new(|| {});
        self.handles.lock().push(handle.clone());
        Ok(handle)
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub engine: VoiceEngine,
    pub peers: Arc<FakePeerFactory>,
    pub microphone: Arc<FakeMicrophone>,
    pub renderer: Arc<FakeRenderer>,
    pub server: MockServer,
}

/// Signaling server answering every offer.
pub async fn answering_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(OFFER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(ANSWER_SDP))
        .mount(&server)
        .await;
    server
}

/// Signaling endpoint that holds every answer for `delay`.
pub async fn slow_answering_server(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(OFFER_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ANSWER_SDP)
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    server
}

pub fn signaling_for(server: &MockServer) -> SignalingConfig {
    SignalingConfig {
        url: format!("{}{}", server.uri(), OFFER_PATH),
        ..Default::default()
    }
}

pub async fn harness(settings: SessionSettings) -> Harness {
    harness_with(settings, FakeMicrophone::default(), answering_server().await)
}

pub fn harness_with(
    settings: SessionSettings,
    microphone: FakeMicrophone,
    server: MockServer,
) -> Harness {
    let peers = Arc::new(FakePeerFactory::default());
    let microphone = Arc::new(microphone);
    let renderer = Arc::new(FakeRenderer::default());
    let backend = MediaBackend::new(peers.clone(), microphone.clone(), renderer.clone());
    let engine = VoiceEngine::new(settings, signaling_for(&server), backend)
        .expect("engine builds with a valid signaling URL");
    Harness {
        engine,
        peers,
        microphone,
        renderer,
        server,
    }
}

/// Poll until `condition` holds or two seconds pass.
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Give the session task time to drain queued events.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
