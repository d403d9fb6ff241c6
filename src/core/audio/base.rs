//! Base audio types: capture constraints, local and remote tracks, the level
//! meter used for voice-activity sensing, and the capture/playback traits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::core::realtime::RealtimeResult;

/// Sample rate of every frame moved through the pipeline.
pub const SAMPLE_RATE: u32 = 48_000;

/// Duration of one capture frame in milliseconds.
pub const FRAME_DURATION_MS: u64 = 20;

/// Mono samples per capture frame.
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE as usize / 1000) * FRAME_DURATION_MS as usize;

/// Buffered frames per local track subscriber.
const TRACK_FRAME_BUFFER: usize = 64;

// =============================================================================
// Capture Constraints
// =============================================================================

/// Microphone acquisition constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate: SAMPLE_RATE,
            channels: 1,
        }
    }
}

// =============================================================================
// Frames and Tracks
// =============================================================================

/// A block of PCM samples normalized to `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFrame {
    pub fn mono(samples: impl Into<Arc<[f32]>>) -> Self {
        Self {
            samples: samples.into(),
            sample_rate: SAMPLE_RATE,
            channels: 1,
        }
    }

    /// Convert to 16-bit PCM.
    pub fn to_i16(&self) -> Vec<i16> {
        self.samples
            .iter()
            .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect()
    }

    /// Build a frame from 16-bit PCM.
    pub fn from_i16(samples: &[i16], sample_rate: u32, channels: u16) -> Self {
        let floats: Vec<f32> = samples.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
        Self {
            samples: floats.into(),
            sample_rate,
            channels,
        }
    }
}

type StopHook = Box<dyn FnOnce() + Send>;

struct TrackInner {
    id: String,
    label: String,
    stopped: AtomicBool,
    frames: broadcast::Sender<AudioFrame>,
    on_stop: Mutex<Option<StopHook>>,
}

/// A local media track. Clones share the same underlying track.
///
/// Producers publish frames with [`push_frame`](Self::push_frame); the
/// transport and the level meter subscribe independently. Stopping is
/// idempotent and runs the producer's stop hook exactly once.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(label: impl Into<String>) -> Self {
        let (frames, _) = broadcast::channel(TRACK_FRAME_BUFFER);
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4().to_string(),
                label: label.into(),
                stopped: AtomicBool::new(false),
                frames,
                on_stop: Mutex::new(None),
            }),
        }
    }

    /// Install the hook that releases the underlying device on stop.
    pub fn set_stop_hook(&self, hook: impl FnOnce() + Send + 'static) {
        *self.inner.on_stop.lock() = Some(Box::new(hook));
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Publish a frame. Returns false once the track is stopped.
    pub fn push_frame(&self, frame: AudioFrame) -> bool {
        if self.is_stopped() {
            return false;
        }
        // No subscribers is not an error
        let _ = self.inner.frames.send(frame);
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AudioFrame> {
        self.inner.frames.subscribe()
    }

    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(hook) = self.inner.on_stop.lock().take() {
            hook();
        }
        debug!("Stopped track {} ({})", self.inner.label, self.inner.id);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// The acquired microphone stream.
#[derive(Debug, Clone, Default)]
pub struct LocalStream {
    tracks: Vec<MediaTrack>,
}

impl LocalStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn audio_track(&self) -> Option<&MediaTrack> {
        self.tracks.first()
    }

    /// Stop every track.
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// The single inbound assistant audio track.
#[derive(Debug)]
pub struct RemoteAudioTrack {
    id: String,
    frames: mpsc::Receiver<AudioFrame>,
}

impl RemoteAudioTrack {
    pub fn new(id: impl Into<String>, frames: mpsc::Receiver<AudioFrame>) -> Self {
        Self {
            id: id.into(),
            frames,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next decoded frame, or `None` once the remote side ends the track.
    pub async fn recv(&mut self) -> Option<AudioFrame> {
        self.frames.recv().await
    }
}

// =============================================================================
// Level Metering
// =============================================================================

/// Holds the latest time-domain frame of the local microphone.
#[derive(Debug, Clone, Default)]
pub struct LevelMeter {
    latest: Arc<Mutex<Vec<f32>>>,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, samples: &[f32]) {
        let mut latest = self.latest.lock();
        latest.clear();
        latest.extend_from_slice(samples);
    }

    /// Peak deviation from silence on an unsigned byte scale (0..=128).
    ///
    /// Samples are mapped to `128 + s * 128` and the largest distance from
    /// the 128 midpoint is returned.
    pub fn peak_deviation(&self) -> u8 {
        self.latest
            .lock()
            .iter()
            .map(|s| {
                let byte = (128.0 + s.clamp(-1.0, 1.0) * 128.0).round().clamp(0.0, 255.0);
                (byte - 128.0).abs() as u8
            })
            .max()
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        self.latest.lock().clear();
    }
}

/// Analysis graph for local audio. Owns the tap tasks feeding the meter.
#[derive(Debug, Default)]
pub struct AudioContext {
    meter: LevelMeter,
    taps: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl AudioContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn meter(&self) -> LevelMeter {
        self.meter.clone()
    }

    /// Route a local track into the level meter.
    pub fn connect_source(&self, track: &MediaTrack) {
        if self.is_closed() {
            return;
        }
        let mut frames = track.subscribe();
        let meter = self.meter.clone();
        let handle = tokio::spawn(async move {
            loop {
                match frames.recv().await {
                    Ok(frame) => meter.update(&frame.samples),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        trace!("Level meter skipped {} frames", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.taps.lock().push(handle);
    }

    /// Stop all taps. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for tap in self.taps.lock().drain(..) {
            tap.abort();
        }
        self.meter.clear();
        debug!("Audio context closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Capture and Playback Traits
// =============================================================================

/// Source of the local microphone stream.
#[async_trait]
pub trait MicrophoneSource: Send + Sync {
    /// Acquire the microphone.
    ///
    /// # Errors
    /// `RealtimeError::MediaAccess` when permission is denied or no device is
    /// available. Acquisition is never retried automatically.
    async fn acquire(&self, constraints: &MediaConstraints) -> RealtimeResult<LocalStream>;
}

struct PlaybackInner {
    stopped: AtomicBool,
    on_stop: Mutex<Option<StopHook>>,
}

/// Handle to an active playback of the remote track.
#[derive(Clone)]
pub struct PlaybackHandle {
    inner: Arc<PlaybackInner>,
}

impl PlaybackHandle {
    pub fn new(on_stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(PlaybackInner {
                stopped: AtomicBool::new(false),
                on_stop: Mutex::new(Some(Box::new(on_stop))),
            }),
        }
    }

    /// Playback driven by a task; stopping aborts it.
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self::new(move || task.abort())
    }

    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(hook) = self.inner.on_stop.lock().take() {
            hook();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Renders the inbound assistant track. This is the only assistant audio
/// output; audio chunks on the control channel are never played.
pub trait AudioRenderer: Send + Sync {
    fn play(&self, track: RemoteAudioTrack) -> RealtimeResult<PlaybackHandle>;
}

/// Renderer that consumes and discards inbound audio.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl AudioRenderer for NullRenderer {
    fn play(&self, mut track: RemoteAudioTrack) -> RealtimeResult<PlaybackHandle> {
        debug!("Discarding remote track {}", track.id());
        let task = tokio::spawn(async move { while track.recv().await.is_some() {} });
        Ok(PlaybackHandle::from_task(task))
    }
}
