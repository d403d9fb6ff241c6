use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// No session
    #[default]
    Idle,
    /// Negotiating the transport
    Connecting,
    /// Control channel open, waiting for the user
    Listening,
    /// Assistant audio is playing
    Speaking,
    /// Throwaway session synthesizing a voice sample
    Previewing,
    /// Fatal failure, teardown in progress
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Idle => "idle",
            CallStatus::Connecting => "connecting",
            CallStatus::Listening => "listening",
            CallStatus::Speaking => "speaking",
            CallStatus::Previewing => "previewing",
            CallStatus::Error => "error",
        }
    }

    pub fn all() -> &'static [Self] {
        &[
            CallStatus::Idle,
            CallStatus::Connecting,
            CallStatus::Listening,
            CallStatus::Speaking,
            CallStatus::Previewing,
            CallStatus::Error,
        ]
    }

    /// Whether a main call is in progress.
    pub fn is_call_active(&self) -> bool {
        matches!(
            self,
            CallStatus::Connecting | CallStatus::Listening | CallStatus::Speaking
        )
    }

    /// Whether moving to `next` is a legal transition.
    ///
    /// Any state may fall to idle (explicit stop) or error (fatal transport
    /// loss). Self transitions are not transitions.
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        use CallStatus::*;
        if *self == next {
            return false;
        }
        match (self, next) {
            (_, Idle) | (_, Error) => true,
            (Idle, Connecting) | (Idle, Previewing) => true,
            (Connecting, Listening) => true,
            (Listening, Speaking) | (Speaking, Listening) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
