//! Transport abstractions: peer connection, control data channel and the
//! events they report back to the engine.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::audio::{MediaTrack, RemoteAudioTrack};
use crate::core::realtime::RealtimeResult;

/// Default public STUN server.
pub const DEFAULT_ICE_SERVER: &str = "stun:stun.l.google.com:19302";

// =============================================================================
// States
// =============================================================================

/// Aggregate peer connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerConnectionState {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }

    /// Whether this state ends an established session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

impl fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data channel ready state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataChannelState {
    #[default]
    Connecting,
    Open,
    Closing,
    Closed,
}

// =============================================================================
// Events
// =============================================================================

/// Events raised by transport handlers, delivered to the session loop in
/// order.
#[derive(Debug)]
pub enum TransportEvent {
    ConnectionState(PeerConnectionState),
    ChannelOpen { label: String },
    ChannelMessage { label: String, text: String },
    ChannelClosed { label: String },
    RemoteTrack(RemoteAudioTrack),
}

/// Sender half handed to transport handlers.
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half drained by the session loop.
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

// =============================================================================
// Traits
// =============================================================================

/// Control data channel.
#[async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;

    fn ready_state(&self) -> DataChannelState;

    fn is_open(&self) -> bool {
        self.ready_state() == DataChannelState::Open
    }

    /// Send one text message.
    ///
    /// # Errors
    /// `RealtimeError::NotConnected` when the channel is not open.
    async fn send_text(&self, text: String) -> RealtimeResult<()>;

    /// Stop forwarding channel events. Synchronous so teardown can detach
    /// before anything is closed.
    fn detach(&self);

    async fn close(&self) -> RealtimeResult<()>;
}

/// Peer-to-peer media and data session.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Attach a local track for transmission.
    async fn add_local_track(&self, track: &MediaTrack) -> RealtimeResult<()>;

    /// Ensure an inbound audio lane exists for the assistant's voice.
    async fn request_inbound_audio(&self) -> RealtimeResult<()>;

    async fn create_data_channel(&self, label: &str) -> RealtimeResult<Arc<dyn DataChannel>>;

    /// Build a local offer and return its SDP.
    async fn create_offer(&self) -> RealtimeResult<String>;

    /// Apply the offer locally and return the description to send, which
    /// may carry gathered candidates the raw offer lacks.
    async fn set_local_description(&self, sdp: &str) -> RealtimeResult<String>;

    /// Apply the signaling answer.
    async fn set_remote_description(&self, sdp: &str) -> RealtimeResult<()>;

    fn connection_state(&self) -> PeerConnectionState;

    /// Stop forwarding connection and track events.
    fn detach_handlers(&self);

    async fn close(&self) -> RealtimeResult<()>;
}

/// Creates peer connections wired to an event sender.
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(&self, events: TransportEventSender) -> RealtimeResult<Arc<dyn PeerConnection>>;
}
