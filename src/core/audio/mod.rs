//! Audio pipeline.
//!
//! Captures the local microphone, exposes it to the transport and to the
//! level meter used for barge-in, and renders the single inbound assistant
//! track.
//!
//! # Feature Flag
//!
//! Device capture and playback require the `native-audio` feature. Without
//! it only the trait seams and [`NullRenderer`] are available, which is
//! enough for embedding with custom sources and for tests.

mod base;
#[cfg(feature = "native-audio")]
mod capture;
#[cfg(feature = "native-audio")]
mod playback;

pub use base::{
    AudioContext, AudioFrame, AudioRenderer, FRAME_DURATION_MS, FRAME_SAMPLES, LevelMeter,
    LocalStream, MediaConstraints, MediaTrack, MicrophoneSource, NullRenderer, PlaybackHandle,
    RemoteAudioTrack, SAMPLE_RATE,
};

#[cfg(feature = "native-audio")]
pub use capture::CpalMicrophone;
#[cfg(feature = "native-audio")]
pub use playback::CpalRenderer;
