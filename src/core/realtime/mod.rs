//! Realtime wire protocol: shared types, control-channel messages and the
//! inbound event stream decoder.
//!
//! # Example
//!
//! ```rust,ignore
//! use waav_voice_engine::core::realtime::{EventKind, EventStreamDecoder};
//!
//! let mut decoder = EventStreamDecoder::new();
//! for event in decoder.decode(message) {
//!     match event.kind {
//!         EventKind::UserTranscriptDelta => println!("user: {}", event.delta_text()),
//!         _ => {}
//!     }
//! }
//! ```

pub mod base;
pub mod config;
pub mod decoder;
pub mod messages;

pub use base::{
    FunctionCallRequest, RealtimeError, RealtimeErrorCallback, RealtimeResult, StatusCallback,
    TranscriptRole, Turn, TurnCallback,
};
pub use config::{
    DATA_CHANNEL_LABEL, DEFAULT_SIGNALING_URL, DEFAULT_TRANSCRIPTION_LANGUAGE,
    DEFAULT_TRANSCRIPTION_MODEL, DEFAULT_VOICE_HEADER, DEFAULT_VOICE_PRESET,
    ENGLISH_ONLY_INSTRUCTION, PREVIEW_CHANNEL_LABEL, RealtimeVoice, VOICE_PRESETS, VoicePreset,
};
pub use decoder::{EventKind, EventStreamDecoder, decode_line};
pub use messages::{
    ClientEvent, ConversationItem, InputAudioTranscription, ResponseConfig, ServerEvent,
    SessionConfig, ToolDef, extract_text_from_content,
};
