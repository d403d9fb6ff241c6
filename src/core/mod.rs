pub mod audio;
pub mod call;
pub mod realtime;
pub mod tools;
pub mod transcript;
pub mod transport;

// Re-export commonly used types for convenience
pub use call::{CallStatus, MediaBackend, SessionSettings, VoiceEngine};

pub use realtime::{
    FunctionCallRequest, RealtimeError, RealtimeResult, TranscriptRole, Turn, VoicePreset,
};

pub use tools::{HttpGetTool, HttpToolConfig, ToolHandler, ToolRegistry};

pub use transcript::{ReconcilerConfig, TranscriptReconciler};
