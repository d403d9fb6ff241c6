//! The voice engine: call lifecycle, inbound event handling and teardown.
//!
//! One engine runs at most one session. All activity after `start()` is
//! driven by a single session task that consumes transport events in
//! delivery order and samples the local level meter for barge-in. Shared
//! state sits behind one mutex that is never held across an await.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::barge_in::{BargeInConfig, BargeInController};
use super::preview::DEFAULT_PREVIEW_LINGER_MS;
use super::resources::{ConnectAttempt, ResourceRegistry};
use super::state::CallStatus;
use crate::config::EngineConfig;
use crate::core::audio::{
    AudioRenderer, LevelMeter, MediaConstraints, MicrophoneSource, RemoteAudioTrack,
};
use crate::core::realtime::{
    ClientEvent, DATA_CHANNEL_LABEL, DEFAULT_TRANSCRIPTION_LANGUAGE, DEFAULT_TRANSCRIPTION_MODEL,
    DEFAULT_VOICE_PRESET, ENGLISH_ONLY_INSTRUCTION, EventKind, EventStreamDecoder,
    FunctionCallRequest, InputAudioTranscription, RealtimeError, RealtimeErrorCallback,
    RealtimeResult, ResponseConfig, ServerEvent, SessionConfig, StatusCallback, ToolDef,
    TranscriptRole, Turn, TurnCallback, VoicePreset,
};
use crate::core::tools::{HttpGetTool, ToolDispatcher, ToolHandler, ToolRegistry};
use crate::core::transcript::{ReconcilerConfig, TranscriptReconciler, is_english};
use crate::core::transport::{
    ConnectRequest, Connection, DataChannel, Negotiator, PeerConnectionFactory, SignalingClient,
    SignalingConfig, TransportEvent, TransportEventReceiver,
};

// =============================================================================
// Settings and Backend
// =============================================================================

/// Per-session behavior of the engine.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Voice preset id; unknown ids fall back to the default preset
    pub voice_preset: String,
    /// Extra instructions appended to the session instructions
    pub instructions: Option<String>,
    /// Ask the assistant to speak first once the channel opens
    pub greet_on_connect: bool,
    pub transcription_model: String,
    pub transcription_language: Option<String>,
    pub media: MediaConstraints,
    pub transcript: ReconcilerConfig,
    pub barge_in: BargeInConfig,
    /// Delay between preview completion and its teardown
    pub preview_linger_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            voice_preset: DEFAULT_VOICE_PRESET.to_string(),
            instructions: None,
            greet_on_connect: false,
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            transcription_language: Some(DEFAULT_TRANSCRIPTION_LANGUAGE.to_string()),
            media: MediaConstraints::default(),
            transcript: ReconcilerConfig::default(),
            barge_in: BargeInConfig::default(),
            preview_linger_ms: DEFAULT_PREVIEW_LINGER_MS,
        }
    }
}

impl SessionSettings {
    pub fn preset(&self) -> &'static VoicePreset {
        VoicePreset::find_or_default(&self.voice_preset)
    }

    /// Session instructions. English transcription prepends the
    /// English-only guard to any configured instructions.
    pub fn full_instructions(&self) -> String {
        let english = self
            .transcription_language
            .as_deref()
            .is_some_and(is_english);
        let extra = self
            .instructions
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match (english, extra) {
            (true, Some(extra)) => format!("{}\n\n{}", ENGLISH_ONLY_INSTRUCTION, extra),
            (true, None) => ENGLISH_ONLY_INSTRUCTION.to_string(),
            (false, Some(extra)) => extra.to_string(),
            (false, None) => String::new(),
        }
    }

    pub fn transcription(&self) -> InputAudioTranscription {
        InputAudioTranscription {
            model: self.transcription_model.clone(),
            language: self.transcription_language.clone(),
        }
    }

    /// `session.update` for a session speaking with `voice`.
    pub fn session_update(&self, voice: &str, tools: Vec<ToolDef>) -> ClientEvent {
        let instructions = self.full_instructions();
        let tool_choice = (!tools.is_empty()).then(|| "auto".to_string());
        ClientEvent::SessionUpdate {
            session: SessionConfig {
                instructions: (!instructions.is_empty()).then_some(instructions),
                voice: Some(voice.to_string()),
                input_audio_transcription: Some(self.transcription()),
                tools: (!tools.is_empty()).then_some(tools),
                tool_choice,
                ..Default::default()
            },
        }
    }
}

/// Media collaborators the engine drives.
#[derive(Clone)]
pub struct MediaBackend {
    pub peers: Arc<dyn PeerConnectionFactory>,
    pub microphone: Arc<dyn MicrophoneSource>,
    pub renderer: Arc<dyn AudioRenderer>,
}

impl MediaBackend {
    pub fn new(
        peers: Arc<dyn PeerConnectionFactory>,
        microphone: Arc<dyn MicrophoneSource>,
        renderer: Arc<dyn AudioRenderer>,
    ) -> Self {
        Self {
            peers,
            microphone,
            renderer,
        }
    }

    /// webrtc-rs transport with the default input and output devices.
    #[cfg(all(feature = "native-webrtc", feature = "native-audio"))]
    pub fn native(ice_servers: Vec<String>) -> Self {
        use crate::core::audio::{CpalMicrophone, CpalRenderer};
        use crate::core::transport::WebRtcPeerFactory;

        Self::new(
            Arc::new(WebRtcPeerFactory::new(ice_servers)),
            Arc::new(CpalMicrophone::new()),
            Arc::new(CpalRenderer::new()),
        )
    }
}

// =============================================================================
// Shared State
// =============================================================================

#[derive(Default, Clone)]
struct Callbacks {
    turn: Option<TurnCallback>,
    status: Option<StatusCallback>,
    error: Option<RealtimeErrorCallback>,
}

/// Bookkeeping of the live call.
#[derive(Debug)]
struct SessionInfo {
    started_at: OffsetDateTime,
    /// Single in-flight response targeted by barge-in
    active_response_id: Option<String>,
    /// call_id -> function name from output items
    function_names: HashMap<String, String>,
    inbound_track: bool,
}

impl SessionInfo {
    fn new() -> Self {
        Self {
            started_at: OffsetDateTime::now_utc(),
            active_response_id: None,
            function_names: HashMap::new(),
            inbound_track: false,
        }
    }
}

pub(super) struct EngineState {
    pub(super) status: CallStatus,
    pub(super) last_error: Option<RealtimeError>,
    reconciler: TranscriptReconciler,
    resources: ResourceRegistry,
    /// Negotiation in flight for the current epoch
    connecting: Option<ConnectAttempt>,
    /// Bumped by every start and teardown; stale tasks compare against it
    epoch: u64,
    session: Option<SessionInfo>,
    pub(super) preview_resources: ResourceRegistry,
    pub(super) preview_connecting: Option<ConnectAttempt>,
    pub(super) preview_epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub(super) struct EngineShared {
    pub(super) settings: SessionSettings,
    pub(super) negotiator: Negotiator,
    pub(super) renderer: Arc<dyn AudioRenderer>,
    dispatcher: ToolDispatcher,
    pub(super) state: Mutex<EngineState>,
    callbacks: RwLock<Callbacks>,
}

pub(super) fn stopped_while_connecting() -> RealtimeError {
    RealtimeError::InvalidState("Stopped while connecting".to_string())
}

/// Serialize and send one client event.
pub(super) async fn send_event(channel: &dyn DataChannel, event: &ClientEvent) -> RealtimeResult<()> {
    trace!("Sending {} on {}", event.type_tag(), channel.label());
    channel.send_text(event.to_json()?).await
}

impl EngineShared {
    pub(super) fn status(&self) -> CallStatus {
        self.state.lock().status
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.state.lock().epoch == epoch
    }

    /// Apply a legal transition. Returns false when nothing changed.
    pub(super) fn apply_status(&self, next: CallStatus) -> bool {
        let mut st = self.state.lock();
        if !st.status.can_transition_to(next) {
            if st.status != next {
                debug!("Ignoring status change {} -> {}", st.status, next);
            }
            return false;
        }
        info!("Call status {} -> {}", st.status, next);
        st.status = next;
        true
    }

    pub(super) async fn set_status(&self, next: CallStatus) {
        if self.apply_status(next) {
            self.notify_status(next).await;
        }
    }

    pub(super) async fn notify_status(&self, status: CallStatus) {
        let callback = self.callbacks.read().status.clone();
        if let Some(cb) = callback {
            cb(status).await;
        }
    }

    async fn notify_error(&self, err: RealtimeError) {
        let callback = self.callbacks.read().error.clone();
        if let Some(cb) = callback {
            cb(err).await;
        }
    }

    /// Store an error in the last-error slot.
    pub(super) async fn record_error(&self, err: RealtimeError) {
        warn!("Recording error: {}", err);
        self.state.lock().last_error = Some(err.clone());
        self.notify_error(err).await;
    }

    /// Store an error only when the slot is empty.
    pub(super) async fn record_error_if_empty(&self, err: RealtimeError) {
        let stored = {
            let mut st = self.state.lock();
            if st.last_error.is_none() {
                st.last_error = Some(err.clone());
                true
            } else {
                false
            }
        };
        if stored {
            warn!("Recording error: {}", err);
            self.notify_error(err).await;
        } else {
            debug!("Error slot occupied, dropping: {}", err);
        }
    }

    async fn emit_turn(&self, turn: Option<Turn>) {
        let Some(turn) = turn else {
            return;
        };
        let callback = self.callbacks.read().turn.clone();
        if let Some(cb) = callback {
            cb(turn).await;
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    async fn start(self: &Arc<Self>) -> RealtimeResult<()> {
        if self.status().is_call_active() {
            return Err(RealtimeError::InvalidState(
                "A call is already active".to_string(),
            ));
        }
        self.stop_preview().await;

        let attempt = ConnectAttempt::new();
        let epoch = {
            let mut st = self.state.lock();
            if !st.status.can_transition_to(CallStatus::Connecting) {
                return Err(RealtimeError::InvalidState(format!(
                    "Cannot start a call while {}",
                    st.status
                )));
            }
            info!("Call status {} -> {}", st.status, CallStatus::Connecting);
            st.status = CallStatus::Connecting;
            st.epoch += 1;
            st.connecting = Some(attempt.clone());
            st.epoch
        };
        let _settled = attempt.settle_guard();
        self.notify_status(CallStatus::Connecting).await;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let request = ConnectRequest {
            channel_label: DATA_CHANNEL_LABEL.to_string(),
            voice: Some(self.settings.preset().voice.as_str().to_string()),
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
                    if st.epoch == epoch {
                        st.connecting = None;
                        true
                    } else {
                        false
                    }
                };
                if !current {
                    debug!("Connect abandoned after stop: {}", e);
                    return Err(stopped_while_connecting());
                }
                error!("Failed to start call: {}", e);
                self.record_error(e.clone()).await;
                self.set_status(CallStatus::Error).await;
                self.teardown().await;
                return Err(e);
            }
        };

        let Connection {
            channel,
            audio_context,
            mut resources,
            ..
        } = connection;
        let cancel = resources.cancel_token();
        let meter = audio_context.meter();

        let adopted = {
            let mut st = self.state.lock();
            if st.epoch == epoch {
                st.connecting = None;
                st.resources = std::mem::take(&mut resources);
                st.last_error = None;
                st.session = Some(SessionInfo::new());
                true
            } else {
                false
            }
        };
        if !adopted {
            info!("Call stopped while connecting, releasing transport");
            resources.detach_handlers();
            resources.release().await;
            return Err(stopped_while_connecting());
        }

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            shared
                .run_session(epoch, events_rx, channel, meter, cancel)
                .await;
        });
        info!("Call started");
        Ok(())
    }

    async fn stop(&self) {
        self.stop_preview().await;
        self.teardown().await;
    }

    /// The single teardown path. Detaches every handler before closing
    /// anything, then releases the registry and resets buffers. A
    /// negotiation still in flight is aborted and awaited so nothing it
    /// created outlives the call.
    async fn teardown(&self) {
        let (mut registry, attempt) = {
            let mut st = self.state.lock();
            st.epoch += 1;
            st.resources.detach_handlers();
            st.reconciler.reset_buffers();
            if let Some(session) = st.session.take() {
                let elapsed = OffsetDateTime::now_utc() - session.started_at;
                info!("Call ended after {:.1}s", elapsed.as_seconds_f64());
            }
            (std::mem::take(&mut st.resources), st.connecting.take())
        };
        if let Some(attempt) = attempt {
            info!("Call stopped while connecting, aborting negotiation");
            attempt.abort().await;
        }
        registry.release().await;
        self.set_status(CallStatus::Idle).await;
    }

    async fn connection_lost(&self, detail: &str) {
        warn!("Voice connection lost: {}", detail);
        self.record_error(RealtimeError::Transport("Voice connection lost".to_string()))
            .await;
        self.set_status(CallStatus::Error).await;
        self.teardown().await;
    }

    // -------------------------------------------------------------------------
    // Session Loop
    // -------------------------------------------------------------------------

    async fn run_session(
        self: Arc<Self>,
        epoch: u64,
        mut events: TransportEventReceiver,
        channel: Arc<dyn DataChannel>,
        meter: LevelMeter,
        cancel: CancellationToken,
    ) {
        let mut decoder = EventStreamDecoder::new();
        let mut barge_in = BargeInController::new(self.settings.barge_in.clone());
        let sampling = barge_in.enabled();
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.settings.barge_in.interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    if self.handle_transport_event(epoch, event, &channel, &mut decoder).await == Flow::Stop {
                        break;
                    }
                }
                _ = ticker.tick(), if sampling => {
                    self.sample_barge_in(epoch, &meter, &mut barge_in, channel.as_ref()).await;
                }
            }
        }
        debug!(
            "Session loop ended: {} events decoded, {} lines skipped",
            decoder.decoded(),
            decoder.skipped()
        );
    }

    async fn handle_transport_event(
        self: &Arc<Self>,
        epoch: u64,
        event: TransportEvent,
        channel: &Arc<dyn DataChannel>,
        decoder: &mut EventStreamDecoder,
    ) -> Flow {
        if !self.is_current(epoch) {
            return Flow::Stop;
        }
        match event {
            TransportEvent::ConnectionState(state) => {
                debug!("Peer connection state: {}", state);
                if state.is_fatal() {
                    self.connection_lost(&format!("peer connection {}", state))
                        .await;
                    return Flow::Stop;
                }
            }
            TransportEvent::ChannelOpen { label } => {
                if label == channel.label() {
                    self.on_channel_open(channel.as_ref()).await;
                }
            }
            TransportEvent::ChannelMessage { label, text } => {
                if label != channel.label() {
                    trace!("Ignoring message on channel {}", label);
                    return Flow::Continue;
                }
                for event in decoder.decode(&text) {
                    if !self.is_current(epoch) {
                        return Flow::Stop;
                    }
                    self.handle_server_event(epoch, event, channel).await;
                }
            }
            TransportEvent::ChannelClosed { label } => {
                if label == channel.label() {
                    self.connection_lost("control channel closed").await;
                    return Flow::Stop;
                }
            }
            TransportEvent::RemoteTrack(track) => self.on_remote_track(track).await,
        }
        Flow::Continue
    }

    async fn on_channel_open(&self, channel: &dyn DataChannel) {
        info!("Control channel {} open", channel.label());
        self.set_status(CallStatus::Listening).await;

        let update = self.settings.session_update(
            self.settings.preset().voice.as_str(),
            self.dispatcher.registry().definitions(),
        );
        if let Err(e) = send_event(channel, &update).await {
            warn!("Failed to send session.update: {}", e);
        }
        if self.settings.greet_on_connect {
            let greet = ClientEvent::create_response(Some(ResponseConfig::audio_and_text(None)));
            if let Err(e) = send_event(channel, &greet).await {
                warn!("Failed to request greeting: {}", e);
            }
        }
    }

    async fn on_remote_track(&self, track: RemoteAudioTrack) {
        info!("Remote audio track {} received", track.id());
        let handle = match self.renderer.play(track) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to play remote audio: {}", e);
                self.record_error(e).await;
                return;
            }
        };
        let responding = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            st.resources.add_playback(handle);
            match st.session.as_mut() {
                Some(session) => {
                    session.inbound_track = true;
                    session.active_response_id.is_some()
                }
                None => false,
            }
        };
        if responding {
            self.set_status(CallStatus::Speaking).await;
        }
    }

    async fn handle_server_event(
        self: &Arc<Self>,
        epoch: u64,
        event: ServerEvent,
        channel: &Arc<dyn DataChannel>,
    ) {
        let now = Instant::now();
        match event.kind {
            EventKind::SessionCreated | EventKind::SessionUpdated => {
                debug!("Session event {}", event.tag);
            }
            EventKind::UserTranscriptDelta => {
                self.state
                    .lock()
                    .reconciler
                    .append_delta(TranscriptRole::User, event.delta_text());
            }
            EventKind::UserTranscriptFinal => {
                let turn = self.state.lock().reconciler.finalize(
                    TranscriptRole::User,
                    event.final_text(),
                    now,
                );
                self.emit_turn(turn).await;
            }
            EventKind::UserTranscriptFailed => {
                warn!(
                    "User transcription failed: {}",
                    event.error_message().unwrap_or_default()
                );
            }
            EventKind::AssistantTranscriptDelta => {
                self.state
                    .lock()
                    .reconciler
                    .append_delta(TranscriptRole::Assistant, event.delta_text());
            }
            EventKind::AssistantTranscriptFinal => {
                let turn = self.state.lock().reconciler.finalize_assistant(
                    event.response_id(),
                    event.final_text(),
                    now,
                );
                self.emit_turn(turn).await;
            }
            EventKind::ResponseCompleted => {
                let turn = self.state.lock().reconciler.finalize_assistant(
                    event.response_id(),
                    event.final_text(),
                    now,
                );
                self.emit_turn(turn).await;
                self.end_response().await;
            }
            EventKind::ItemCreated => {
                if let Some((role, text)) = event.item_role_and_text() {
                    let turn = self.state.lock().reconciler.complete_item(role, &text, now);
                    self.emit_turn(turn).await;
                }
            }
            EventKind::SpeechStarted => {
                debug!("Remote VAD: speech started");
                self.set_status(CallStatus::Listening).await;
            }
            EventKind::SpeechStopped => debug!("Remote VAD: speech stopped"),
            EventKind::ResponseCreated | EventKind::OutputAudioStarted => {
                self.begin_response(event.response_id()).await;
            }
            EventKind::ResponseDone | EventKind::OutputAudioStopped => {
                self.end_response().await;
            }
            EventKind::AudioChunk => trace!("Ignoring audio chunk on control channel"),
            EventKind::AudioDone => debug!("Response audio done"),
            EventKind::OutputItemAdded => {
                if let Some((call_id, name)) = event.function_call_item() {
                    debug!("Function call {} -> {}", call_id, name);
                    if let Some(session) = self.state.lock().session.as_mut() {
                        session.function_names.insert(call_id, name);
                    }
                }
            }
            EventKind::FunctionCallArgumentsDone => {
                self.dispatch_function_call(epoch, &event, channel);
            }
            EventKind::ServerError => {
                let message = event
                    .error_message()
                    .unwrap_or_else(|| format!("{} received", event.tag));
                self.record_error(RealtimeError::ServerReported(message))
                    .await;
            }
            EventKind::ResponseFailed => {
                let message = event
                    .error_message()
                    .unwrap_or_else(|| format!("{} received", event.tag));
                self.record_error(RealtimeError::ServerReported(message))
                    .await;
                self.end_response().await;
            }
            EventKind::Unrecognized => debug!("Ignoring unrecognized event {}", event.tag),
        }
    }

    async fn begin_response(&self, response_id: Option<&str>) {
        let speaking = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let Some(session) = st.session.as_mut() else {
                return;
            };
            if let Some(id) = response_id {
                session.active_response_id = Some(id.to_string());
            }
            session.inbound_track
        };
        if speaking {
            self.set_status(CallStatus::Speaking).await;
        }
    }

    async fn end_response(&self) {
        if let Some(session) = self.state.lock().session.as_mut() {
            session.active_response_id = None;
        }
        self.set_status(CallStatus::Listening).await;
    }

    fn dispatch_function_call(
        &self,
        epoch: u64,
        event: &ServerEvent,
        channel: &Arc<dyn DataChannel>,
    ) {
        let Some(call_id) = event.call_id().map(str::to_string) else {
            warn!("Function call arguments without call_id");
            return;
        };

        let mut guard = self.state.lock();
        let st = &mut *guard;
        if st.epoch != epoch {
            return;
        }
        let tracked = st
            .session
            .as_mut()
            .and_then(|session| session.function_names.remove(&call_id));
        let Some(name) = event.function_name().map(str::to_string).or(tracked) else {
            warn!("Function call {} has no name", call_id);
            return;
        };

        let request = FunctionCallRequest {
            call_id,
            name,
            arguments: event.arguments().to_string(),
            item_id: event.item_id().map(str::to_string),
        };
        let dispatcher = self.dispatcher.clone();
        let channel = Arc::clone(channel);
        let task = tokio::spawn(async move {
            if let Err(e) = dispatcher.handle(&request, channel.as_ref()).await {
                warn!("Failed to deliver result for call {}: {}", request.call_id, e);
            }
        });
        st.resources.track_task(task);
    }

    async fn sample_barge_in(
        &self,
        epoch: u64,
        meter: &LevelMeter,
        controller: &mut BargeInController,
        channel: &dyn DataChannel,
    ) {
        let level = meter.peak_deviation();
        let active = {
            let st = self.state.lock();
            if st.epoch != epoch {
                return;
            }
            st.session
                .as_ref()
                .and_then(|session| session.active_response_id.clone())
        };
        if let Some(cancel) = controller.sample(level, active.as_deref(), channel.is_open())
            && let Err(e) = send_event(channel, &cancel).await
        {
            warn!("Failed to send barge-in cancel: {}", e);
        }
    }

    async fn send_text(&self, text: &str) -> RealtimeResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let channel = self.state.lock().resources.channel().cloned();
        let Some(channel) = channel.filter(|c| c.is_open()) else {
            return Err(RealtimeError::NotConnected);
        };
        send_event(channel.as_ref(), &ClientEvent::user_text(text)).await?;
        send_event(channel.as_ref(), &ClientEvent::create_response(None)).await?;
        debug!("Sent text input ({} chars)", text.len());
        Ok(())
    }
}

// =============================================================================
// Public Engine
// =============================================================================

/// Realtime voice conversation engine.
///
/// Cheap to clone; clones share one session. Call [`stop`](Self::stop)
/// before dropping the last handle, the session task keeps its resources
/// alive until then.
#[derive(Clone)]
pub struct VoiceEngine {
    shared: Arc<EngineShared>,
}

impl VoiceEngine {
    pub fn new(
        settings: SessionSettings,
        signaling: SignalingConfig,
        backend: MediaBackend,
    ) -> RealtimeResult<Self> {
        let reconciler = TranscriptReconciler::new(&settings.transcript)?;
        let signaling = Arc::new(SignalingClient::new(signaling)?);
        let negotiator = Negotiator::new(backend.peers, backend.microphone, signaling);

        Ok(Self {
            shared: Arc::new(EngineShared {
                settings,
                negotiator,
                renderer: backend.renderer,
                dispatcher: ToolDispatcher::new(Arc::new(ToolRegistry::new())),
                state: Mutex::new(EngineState {
                    status: CallStatus::Idle,
                    last_error: None,
                    reconciler,
                    resources: ResourceRegistry::new(),
                    connecting: None,
                    epoch: 0,
                    session: None,
                    preview_resources: ResourceRegistry::new(),
                    preview_connecting: None,
                    preview_epoch: 0,
                }),
                callbacks: RwLock::new(Callbacks::default()),
            }),
        })
    }

    /// Build an engine and register the configured HTTP tools.
    pub fn from_config(config: &EngineConfig, backend: MediaBackend) -> RealtimeResult<Self> {
        let engine = Self::new(config.session_settings(), config.signaling_config(), backend)?;
        for tool in &config.tools {
            engine.register_tool(Arc::new(HttpGetTool::new(tool.clone())?));
        }
        Ok(engine)
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.shared.settings
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    pub fn status(&self) -> CallStatus {
        self.shared.status()
    }

    /// True from start until teardown of a main call.
    pub fn is_listening(&self) -> bool {
        self.status().is_call_active()
    }

    /// True while assistant audio is playing.
    pub fn is_speaking(&self) -> bool {
        self.status() == CallStatus::Speaking
    }

    /// Finalized turns in order.
    pub fn turns(&self) -> Vec<Turn> {
        self.shared.state.lock().reconciler.turns().to_vec()
    }

    /// Partial text not yet finalized for a role.
    pub fn pending_text(&self, role: TranscriptRole) -> String {
        self.shared.state.lock().reconciler.pending(role).to_string()
    }

    pub fn clear_turns(&self) {
        self.shared.state.lock().reconciler.clear();
    }

    pub fn last_error(&self) -> Option<RealtimeError> {
        self.shared.state.lock().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.shared.state.lock().last_error = None;
    }

    /// Response currently targeted by barge-in.
    pub fn active_response_id(&self) -> Option<String> {
        self.shared
            .state
            .lock()
            .session
            .as_ref()
            .and_then(|session| session.active_response_id.clone())
    }

    pub fn on_turn(&self, callback: TurnCallback) {
        self.shared.callbacks.write().turn = Some(callback);
    }

    pub fn on_status(&self, callback: StatusCallback) {
        self.shared.callbacks.write().status = Some(callback);
    }

    pub fn on_error(&self, callback: RealtimeErrorCallback) {
        self.shared.callbacks.write().error = Some(callback);
    }

    // -------------------------------------------------------------------------
    // Tools
    // -------------------------------------------------------------------------

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        self.shared.dispatcher.registry()
    }

    /// Register a tool. Takes effect on the next `session.update`.
    pub fn register_tool(&self, handler: Arc<dyn ToolHandler>) {
        self.shared.dispatcher.register(handler);
    }

    // -------------------------------------------------------------------------
    // Control
    // -------------------------------------------------------------------------

    /// Open a call.
    ///
    /// Returns once the transport is negotiated; the session then runs in
    /// the background until [`stop`](Self::stop) or a fatal transport loss.
    ///
    /// # Errors
    /// `InvalidState` when a call is active or [`stop`](Self::stop) ran
    /// before negotiation finished. `MediaAccess`, `Signaling` or
    /// `Transport` when negotiation fails; the error is also recorded and
    /// the engine returns to idle.
    pub async fn start(&self) -> RealtimeResult<()> {
        self.shared.start().await
    }

    /// Tear down any call or preview. Idempotent.
    pub async fn stop(&self) {
        self.shared.stop().await;
    }

    /// Send typed user text and request a reply.
    pub async fn send_text(&self, text: &str) -> RealtimeResult<()> {
        self.shared.send_text(text).await
    }

    /// Speak a preset's sample line on a throwaway session.
    pub async fn preview_voice(&self, preset_id: &str) -> RealtimeResult<()> {
        self.shared.preview_voice(preset_id).await
    }

    pub async fn stop_preview(&self) {
        self.shared.stop_preview().await;
    }
}

impl std::fmt::Debug for VoiceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceEngine")
            .field("status", &self.status())
            .field("voice_preset", &self.shared.settings.voice_preset)
            .finish()
    }
}
