//! Call lifecycle.
//!
//! [`VoiceEngine`] owns one session at a time: it negotiates the transport,
//! drives the [`CallStatus`] state machine from inbound events, feeds the
//! transcript reconciler, dispatches tool calls, watches the local level for
//! barge-in and tears everything down through a per-session
//! [`ResourceRegistry`].

mod barge_in;
mod engine;
mod preview;
mod resources;
mod state;

pub use barge_in::{
    BargeInConfig, BargeInController, DEFAULT_BARGE_IN_INTERVAL_MS, DEFAULT_BARGE_IN_THRESHOLD,
};
pub use engine::{MediaBackend, SessionSettings, VoiceEngine};
pub use preview::DEFAULT_PREVIEW_LINGER_MS;
pub use resources::{ConnectAttempt, ResourceRegistry};
pub use state::CallStatus;
