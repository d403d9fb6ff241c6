//! Event stream decoder for the control channel.
//!
//! A single inbound message may bundle several newline-separated JSON objects.
//! Each line is parsed on its own; a malformed line is logged and skipped and
//! never aborts the rest of the message. Every parsed event is classified by
//! [`EventKind::from_tag`], a total mapping from the wire `type` tag to the
//! handler category, with [`EventKind::Unrecognized`] as the explicit default.

use serde_json::Value;
use tracing::{debug, warn};

use super::base::{RealtimeError, RealtimeResult};
use super::messages::ServerEvent;

/// Handler category for an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionCreated,
    SessionUpdated,
    /// Incremental user transcription
    UserTranscriptDelta,
    /// Finalized user transcription
    UserTranscriptFinal,
    UserTranscriptFailed,
    /// Incremental assistant text or audio transcript
    AssistantTranscriptDelta,
    /// Finalized assistant text or audio transcript
    AssistantTranscriptFinal,
    /// Assistant finalization that also ends the response
    ResponseCompleted,
    /// Complete conversation item delivered directly
    ItemCreated,
    SpeechStarted,
    SpeechStopped,
    ResponseCreated,
    /// Response finished, cancelled or otherwise ended
    ResponseDone,
    OutputAudioStarted,
    OutputAudioStopped,
    /// Synthesized audio on the control channel, never played
    AudioChunk,
    AudioDone,
    OutputItemAdded,
    FunctionCallArgumentsDone,
    /// Service error that leaves the response untouched
    ServerError,
    /// Response ended with an error
    ResponseFailed,
    /// Anything else: logged and ignored
    Unrecognized,
}

impl EventKind {
    /// Classify a wire `type` tag. Unknown tags map to `Unrecognized`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "session.created" => Self::SessionCreated,
            "session.updated" => Self::SessionUpdated,

            "input_audio_transcription.delta"
            | "conversation.item.input_audio_transcription.delta" => Self::UserTranscriptDelta,
            "input_audio_transcription.final"
            | "input_audio_transcription.done"
            | "conversation.item.input_audio_transcription.completed" => Self::UserTranscriptFinal,
            "conversation.item.input_audio_transcription.failed" => Self::UserTranscriptFailed,

            "response.audio_transcript.delta"
            | "response.output_audio_transcript.delta"
            | "response.output_text.delta"
            | "response.text.delta" => Self::AssistantTranscriptDelta,
            "response.audio_transcript.done"
            | "response.output_audio_transcript.done"
            | "response.output_text.done"
            | "response.text.done"
            | "conversation.item.output_audio_transcription.completed" => {
                Self::AssistantTranscriptFinal
            }
            "response.completed" => Self::ResponseCompleted,

            "conversation.item.created" => Self::ItemCreated,

            "input_audio_buffer.speech_started" => Self::SpeechStarted,
            "input_audio_buffer.speech_stopped" => Self::SpeechStopped,

            "response.created" => Self::ResponseCreated,
            "response.done" | "response.cancelled" | "response.canceled" => Self::ResponseDone,
            "output_audio_buffer.started" => Self::OutputAudioStarted,
            "output_audio_buffer.stopped" | "output_audio_buffer.cleared" => {
                Self::OutputAudioStopped
            }

            "response.audio.delta" | "response.output_audio.delta" => Self::AudioChunk,
            "response.audio.done" | "response.output_audio.done" => Self::AudioDone,

            "response.output_item.added" => Self::OutputItemAdded,
            "response.function_call_arguments.done" => Self::FunctionCallArgumentsDone,

            "error" => Self::ServerError,
            "response.error" | "response.failed" => Self::ResponseFailed,

            _ => Self::Unrecognized,
        }
    }

    /// Whether this event ends the in-flight response.
    pub fn ends_response(&self) -> bool {
        matches!(
            self,
            Self::ResponseDone | Self::ResponseCompleted | Self::ResponseFailed
        )
    }
}

/// Splits inbound control messages into discrete events.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    decoded: u64,
    skipped: u64,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every line of a message, in order, skipping malformed lines.
    pub fn decode(&mut self, message: &str) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        for line in message.split('\n').map(str::trim).filter(|l| !l.is_empty()) {
            match decode_line(line) {
                Ok(event) => {
                    self.decoded += 1;
                    events.push(event);
                }
                Err(e) => {
                    self.skipped += 1;
                    warn!("Skipping inbound event: {}", e);
                }
            }
        }
        events
    }

    /// Number of events decoded so far.
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Number of lines skipped as malformed.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

/// Parse a single JSON line into a classified event.
pub fn decode_line(line: &str) -> RealtimeResult<ServerEvent> {
    let payload: Value = serde_json::from_str(line)
        .map_err(|e| RealtimeError::EventParse(format!("{e} - {}", truncate(line, 120))))?;

    let tag = payload
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| RealtimeError::EventParse("missing string `type` tag".to_string()))?
        .to_string();

    debug!("Decoded event: {}", tag);
    Ok(ServerEvent::new(tag, payload))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
