//! Control-channel message types.
//!
//! Outbound client events are strongly typed and serialized with a `type`
//! discriminator. Inbound server events are kept as a tag plus the raw JSON
//! payload: the remote vocabulary is unstable, so fields are read leniently
//! through accessor helpers instead of rigid structs.
//!
//! # Protocol Overview
//!
//! Client events (sent to server):
//! - session.update - Update session configuration
//! - conversation.item.create - Add item to conversation (text input, tool result)
//! - response.create - Generate a response
//! - response.cancel - Cancel a specific in-flight response
//!
//! Server events are classified by [`EventKind`](super::decoder::EventKind).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::base::TranscriptRole;
use super::config::RESPONSE_MODALITIES;
use super::decoder::EventKind;

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration sent with `session.update`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Response modalities (text, audio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    /// System instructions for the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Voice for audio output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Input audio transcription configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,

    /// Tool definitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,

    /// Tool choice strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g., "gpt-4o-mini-transcribe")
    pub model: String,
    /// Expected spoken language (ISO-639-1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Tool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool type (always "function")
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function name
    pub name: String,
    /// Function description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Function parameters JSON schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ToolDef {
    pub fn function(name: impl Into<String>, description: Option<String>, parameters: Option<Value>) -> Self {
        Self {
            tool_type: "function".to_string(),
            name: name.into(),
            description,
            parameters,
        }
    }
}

// =============================================================================
// Conversation Items
// =============================================================================

/// Conversation item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationItem {
    /// Item ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Item type
    #[serde(rename = "type")]
    pub item_type: String,
    /// Item role (user, assistant, system)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content parts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentPart>>,
    /// Call ID for function call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Function output for function call result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Content part within a conversation item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    /// Content type (input_text, text)
    #[serde(rename = "type")]
    pub content_type: String,
    /// Text content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Response configuration for creating responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// Response modalities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,
    /// Per-response instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl ResponseConfig {
    /// Audio + text response, optionally with per-response instructions.
    pub fn audio_and_text(instructions: Option<String>) -> Self {
        Self {
            modalities: Some(RESPONSE_MODALITIES.iter().map(|m| m.to_string()).collect()),
            instructions,
        }
    }
}

// =============================================================================
// Client Events (sent to server)
// =============================================================================

/// Client events sent over the control channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration
        session: SessionConfig,
    },

    /// Create a conversation item
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        /// Item to create
        item: ConversationItem,
        /// Previous item ID to insert after
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_item_id: Option<String>,
    },

    /// Create a response
    #[serde(rename = "response.create")]
    ResponseCreate {
        /// Response configuration
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<ResponseConfig>,
    },

    /// Cancel an in-flight response
    #[serde(rename = "response.cancel")]
    ResponseCancel {
        /// Response to cancel
        #[serde(skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
    },
}

impl ClientEvent {
    /// Tool result delivered back to the model.
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem {
                item_type: "function_call_output".to_string(),
                call_id: Some(call_id.into()),
                output: Some(output.into()),
                ..Default::default()
            },
            previous_item_id: None,
        }
    }

    /// Typed user message.
    pub fn user_text(text: impl Into<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem {
                item_type: "message".to_string(),
                role: Some("user".to_string()),
                content: Some(vec![ContentPart {
                    content_type: "input_text".to_string(),
                    text: Some(text.into()),
                }]),
                ..Default::default()
            },
            previous_item_id: None,
        }
    }

    /// Request continued generation.
    pub fn create_response(response: Option<ResponseConfig>) -> Self {
        ClientEvent::ResponseCreate { response }
    }

    /// Cancel the given response.
    pub fn cancel_response(response_id: impl Into<String>) -> Self {
        ClientEvent::ResponseCancel {
            response_id: Some(response_id.into()),
        }
    }

    /// Wire type tag of this event.
    pub fn type_tag(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::ConversationItemCreate { .. } => "conversation.item.create",
            ClientEvent::ResponseCreate { .. } => "response.create",
            ClientEvent::ResponseCancel { .. } => "response.cancel",
        }
    }

    /// Serialize to a single JSON line.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

/// One decoded inbound event.
#[derive(Debug, Clone)]
pub struct ServerEvent {
    /// Raw `type` tag
    pub tag: String,
    /// Classified kind
    pub kind: EventKind,
    /// Full JSON payload
    pub payload: Value,
}

impl ServerEvent {
    pub fn new(tag: impl Into<String>, payload: Value) -> Self {
        let tag = tag.into();
        let kind = EventKind::from_tag(&tag);
        Self { tag, kind, payload }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Incremental text: `delta`, then `text`, then `transcript`.
    pub fn delta_text(&self) -> &str {
        self.str_field("delta")
            .or_else(|| self.str_field("text"))
            .or_else(|| self.str_field("transcript"))
            .unwrap_or_default()
    }

    /// Finalized text: `transcript`, then `text`, then `delta`.
    pub fn final_text(&self) -> &str {
        self.str_field("transcript")
            .or_else(|| self.str_field("text"))
            .or_else(|| self.str_field("delta"))
            .unwrap_or_default()
    }

    /// Response id from `response_id` or the nested `response.id`.
    pub fn response_id(&self) -> Option<&str> {
        self.str_field("response_id").or_else(|| {
            self.payload
                .get("response")
                .and_then(|r| r.get("id"))
                .and_then(Value::as_str)
        })
    }

    /// Role and complete text of a delivered conversation item.
    pub fn item_role_and_text(&self) -> Option<(TranscriptRole, String)> {
        let item = self.payload.get("item")?;
        let role = TranscriptRole::from_wire(item.get("role")?.as_str()?)?;
        let text = extract_text_from_content(item.get("content").unwrap_or(&Value::Null));
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some((role, text.to_string()))
    }

    /// `(call_id, name)` of a function-call output item.
    pub fn function_call_item(&self) -> Option<(String, String)> {
        let item = self.payload.get("item")?;
        if item.get("type").and_then(Value::as_str) != Some("function_call") {
            return None;
        }
        let call_id = item.get("call_id")?.as_str()?;
        let name = item.get("name")?.as_str()?;
        Some((call_id.to_string(), name.to_string()))
    }

    pub fn call_id(&self) -> Option<&str> {
        self.str_field("call_id")
    }

    pub fn function_name(&self) -> Option<&str> {
        self.str_field("name")
    }

    pub fn arguments(&self) -> &str {
        self.str_field("arguments").unwrap_or_default()
    }

    pub fn item_id(&self) -> Option<&str> {
        self.str_field("item_id")
    }

    /// Error message from `error.message`, `response.status_details.error.message`
    /// or a top-level `message`.
    pub fn error_message(&self) -> Option<String> {
        let nested = self
            .payload
            .get("error")
            .and_then(|e| e.get("message"))
            .or_else(|| {
                self.payload
                    .get("response")
                    .and_then(|r| r.get("status_details"))
                    .and_then(|d| d.get("error"))
                    .and_then(|e| e.get("message"))
            })
            .or_else(|| self.payload.get("message"));
        nested.and_then(Value::as_str).map(str::to_string)
    }
}

/// Extract readable text from an item's `content`.
///
/// Accepts a plain string, objects with `text` or `transcript`, arrays of
/// either, and objects holding a `parts` array. Pieces are joined with spaces.
pub fn extract_text_from_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(entries) => join_non_empty(entries.iter().map(extract_text_from_content)),
        Value::Object(map) => {
            if let Some(text) = map.get("text").and_then(Value::as_str) {
                return text.to_string();
            }
            if let Some(transcript) = map.get("transcript").and_then(Value::as_str) {
                return transcript.to_string();
            }
            match map.get("parts") {
                Some(Value::Array(parts)) => {
                    join_non_empty(parts.iter().map(extract_text_from_content))
                }
                _ => String::new(),
            }
        }
        _ => String::new(),
    }
}

fn join_non_empty(pieces: impl Iterator<Item = String>) -> String {
    pieces
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Tests
// =============================================================================
