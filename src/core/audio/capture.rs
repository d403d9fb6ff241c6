//! Microphone capture on cpal.
//!
//! `cpal::Stream` is not `Send`, so each acquisition owns its stream on a
//! dedicated thread that lives until the track is stopped.

use std::sync::mpsc as std_mpsc;
use std::thread;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::base::{
    AudioFrame, FRAME_SAMPLES, LocalStream, MediaConstraints, MediaTrack, MicrophoneSource,
};
use crate::core::realtime::{RealtimeError, RealtimeResult};

/// Default input device of the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MicrophoneSource for CpalMicrophone {
    async fn acquire(&self, constraints: &MediaConstraints) -> RealtimeResult<LocalStream> {
        let track = MediaTrack::new("microphone");
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let capture_track = track.clone();
        let constraints = constraints.clone();
        thread::Builder::new()
            .name("waav-mic".to_string())
            .spawn(move || run_capture(capture_track, constraints, ready_tx, stop_rx))
            .map_err(|e| RealtimeError::MediaAccess(format!("Failed to start capture thread: {e}")))?;

        ready_rx
            .await
            .map_err(|_| RealtimeError::MediaAccess("Capture thread exited".to_string()))??;

        track.set_stop_hook(move || {
            let _ = stop_tx.send(());
        });
        info!("Microphone acquired");
        Ok(LocalStream::new(vec![track]))
    }
}

fn run_capture(
    track: MediaTrack,
    constraints: MediaConstraints,
    ready: oneshot::Sender<RealtimeResult<()>>,
    stop: std_mpsc::Receiver<()>,
) {
    let stream = match open_input_stream(&track, &constraints) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }
    // Blocks until the track is stopped or its hook is dropped
    let _ = stop.recv();
    drop(stream);
    debug!("Capture stream closed");
}

fn open_input_stream(
    track: &MediaTrack,
    constraints: &MediaConstraints,
) -> RealtimeResult<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| RealtimeError::MediaAccess("No input device available".to_string()))?;

    // cpal exposes no processing controls; these are left to the OS stack
    debug!(
        "Capture constraints: echo_cancellation={} noise_suppression={} auto_gain_control={}",
        constraints.echo_cancellation, constraints.noise_suppression, constraints.auto_gain_control
    );

    let stream_config = StreamConfig {
        channels: constraints.channels.max(1),
        sample_rate: cpal::SampleRate(constraints.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let sample_format = device
        .supported_input_configs()
        .map_err(|e| RealtimeError::MediaAccess(e.to_string()))?
        .find(|c| {
            c.min_sample_rate().0 <= constraints.sample_rate
                && c.max_sample_rate().0 >= constraints.sample_rate
                && c.channels() >= stream_config.channels
        })
        .map(|c| c.sample_format())
        .unwrap_or(SampleFormat::F32);

    let channels = stream_config.channels as usize;
    let sample_rate = constraints.sample_rate;
    let err_fn = |err| error!("Capture error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => {
            let mut framer = Framer::new(track.clone(), channels, sample_rate);
            device.build_input_stream(
                &stream_config,
                move |data: &[f32], _| framer.push(data.iter().copied()),
                err_fn,
                None,
            )
        }
        SampleFormat::I16 => {
            let mut framer = Framer::new(track.clone(), channels, sample_rate);
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _| {
                    framer.push(data.iter().map(|&s| s as f32 / i16::MAX as f32))
                },
                err_fn,
                None,
            )
        }
        SampleFormat::U8 => {
            let mut framer = Framer::new(track.clone(), channels, sample_rate);
            device.build_input_stream(
                &stream_config,
                move |data: &[u8], _| framer.push(data.iter().map(|&s| (s as f32 - 128.0) / 128.0)),
                err_fn,
                None,
            )
        }
        other => {
            return Err(RealtimeError::MediaAccess(format!(
                "Unsupported sample format: {other:?}"
            )));
        }
    }
    .map_err(|e| RealtimeError::MediaAccess(e.to_string()))?;

    stream
        .play()
        .map_err(|e| RealtimeError::MediaAccess(e.to_string()))?;

    debug!("Capture stream opened: {}Hz {}ch", sample_rate, channels);
    Ok(stream)
}

/// Downmixes interleaved samples to mono and publishes fixed-size frames.
struct Framer {
    track: MediaTrack,
    channels: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    acc: f32,
    idx: usize,
}

impl Framer {
    fn new(track: MediaTrack, channels: usize, sample_rate: u32) -> Self {
        Self {
            track,
            channels: channels.max(1),
            sample_rate,
            pending: Vec::with_capacity(FRAME_SAMPLES),
            acc: 0.0,
            idx: 0,
        }
    }

    fn push(&mut self, samples: impl Iterator<Item = f32>) {
        for s in samples {
            self.acc += s;
            self.idx += 1;
            if self.idx == self.channels {
                self.pending.push(self.acc / self.channels as f32);
                self.acc = 0.0;
                self.idx = 0;
            }
            if self.pending.len() == FRAME_SAMPLES {
                let frame = AudioFrame {
                    samples: std::mem::take(&mut self.pending).into(),
                    sample_rate: self.sample_rate,
                    channels: 1,
                };
                self.pending.reserve(FRAME_SAMPLES);
                if !self.track.push_frame(frame) {
                    warn!("Dropping capture frame for stopped track");
                }
            }
        }
    }
}
