//! Base types for the realtime voice engine.
//!
//! This module defines the error taxonomy, conversation roles, finalized turns,
//! function-call requests and the callback types shared by every subsystem of
//! the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during a realtime voice session.
///
/// Errors are `Clone` so the engine can keep the most recent one in its
/// last-error slot while also handing it to callbacks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RealtimeError {
    /// Microphone could not be acquired (permission denied, no device)
    #[error("Microphone access failed: {0}")]
    MediaAccess(String),

    /// Offer/answer exchange rejected or answer malformed
    #[error("Signaling failed: {0}")]
    Signaling(String),

    /// Peer connection or data channel failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Inbound control message could not be parsed
    #[error("Event parse error: {0}")]
    EventParse(String),

    /// A tool handler's external call failed
    #[error("Tool handler error: {0}")]
    ToolHandler(String),

    /// The remote service reported an error event
    #[error("Server error: {0}")]
    ServerReported(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Operation not allowed in the current call state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Control channel is not open
    #[error("Not connected")]
    NotConnected,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RealtimeError {
    /// Whether this error ends the current session.
    ///
    /// Errors isolable to a single event or tool call are recovered locally.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RealtimeError::MediaAccess(_)
                | RealtimeError::Signaling(_)
                | RealtimeError::Transport(_)
        )
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        RealtimeError::Serialization(err.to_string())
    }
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Conversation Types
// =============================================================================

/// Role of the speaker in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    /// User speech transcript
    User,
    /// Assistant speech transcript
    Assistant,
}

impl TranscriptRole {
    /// Parse a wire role string. Roles other than user/assistant are ignored.
    pub fn from_wire(role: &str) -> Option<Self> {
        match role {
            "user" => Some(TranscriptRole::User),
            "assistant" => Some(TranscriptRole::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptRole::User => write!(f, "user"),
            TranscriptRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One finalized, role-tagged utterance in the conversation log.
///
/// Turns are created only by the transcript reconciler and never mutated
/// after they are appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn identifier
    pub id: Uuid,
    /// Who spoke
    pub role: TranscriptRole,
    /// Normalized utterance text
    pub text: String,
    /// When the turn was finalized
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Turn {
    pub fn new(role: TranscriptRole, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Function call request from the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallRequest {
    /// Call ID for the function call
    pub call_id: String,
    /// Function name
    pub name: String,
    /// JSON arguments (raw, unparsed)
    pub arguments: String,
    /// Item ID
    pub item_id: Option<String>,
}

// =============================================================================
// Callback Types
// =============================================================================

/// Callback type for finalized turns.
pub type TurnCallback =
    Arc<dyn Fn(Turn) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for call status changes.
pub type StatusCallback = Arc<
    dyn Fn(crate::core::call::CallStatus) -> Pin<Box<dyn Future<Output = ()> + Send>>
        + Send
        + Sync,
>;

/// Callback type for errors recorded in the last-error slot.
pub type RealtimeErrorCallback =
    Arc<dyn Fn(RealtimeError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;
