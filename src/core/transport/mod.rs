//! Transport negotiation.
//!
//! Opens the peer-to-peer media and control session through a one-shot
//! offer/answer exchange with the signaling endpoint.
//!
//! # Feature Flag
//!
//! The webrtc-rs backend requires the `native-webrtc` feature. Without it,
//! callers supply their own [`PeerConnectionFactory`].

mod base;
mod negotiator;
mod signaling;
#[cfg(feature = "native-webrtc")]
mod rtc;

pub use base::{
    DEFAULT_ICE_SERVER, DataChannel, DataChannelState, PeerConnection, PeerConnectionFactory,
    PeerConnectionState, TransportEvent, TransportEventReceiver, TransportEventSender,
};
pub use negotiator::{ConnectRequest, Connection, Negotiator};
pub use signaling::{
    DEFAULT_SIGNALING_TIMEOUT_SECS, SDP_CONTENT_TYPE, SignalingClient, SignalingConfig,
    validate_answer,
};

#[cfg(feature = "native-webrtc")]
pub use rtc::WebRtcPeerFactory;
