//! Speaker playback on cpal.
//!
//! A tokio task moves decoded frames from the remote track into a shared
//! sample queue; the output stream, owned by its own thread, drains it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use super::base::{AudioRenderer, PlaybackHandle, RemoteAudioTrack, SAMPLE_RATE};
use crate::core::realtime::{RealtimeError, RealtimeResult};

/// Two seconds of queued audio at most; older samples are dropped.
const MAX_QUEUED_SAMPLES: usize = SAMPLE_RATE as usize * 2;

type SampleQueue = Arc<Mutex<VecDeque<f32>>>;

/// Default output device of the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalRenderer;

impl CpalRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl AudioRenderer for CpalRenderer {
    fn play(&self, mut track: RemoteAudioTrack) -> RealtimeResult<PlaybackHandle> {
        let queue: SampleQueue = Arc::new(Mutex::new(VecDeque::with_capacity(MAX_QUEUED_SAMPLES)));
        let (ready_tx, ready_rx) = std_mpsc::channel::<RealtimeResult<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let output_queue = queue.clone();
        thread::Builder::new()
            .name("waav-speaker".to_string())
            .spawn(move || {
                let stream = match open_output_stream(output_queue) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Playback stream closed");
            })
            .map_err(|e| RealtimeError::Transport(format!("Failed to start playback thread: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| RealtimeError::Transport("Playback thread exited".to_string()))??;

        let track_id = track.id().to_string();
        let feeder = tokio::spawn(async move {
            while let Some(frame) = track.recv().await {
                let mut queue = queue.lock();
                queue.extend(frame.samples.iter().copied());
                let overflow = queue.len().saturating_sub(MAX_QUEUED_SAMPLES);
                queue.drain(..overflow);
            }
        });

        info!("Playing remote track {}", track_id);
        Ok(PlaybackHandle::new(move || {
            feeder.abort();
            let _ = stop_tx.send(());
        }))
    }
}

fn open_output_stream(queue: SampleQueue) -> RealtimeResult<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| RealtimeError::Transport("No output device available".to_string()))?;

    let stream_config = StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let sample_format = device
        .supported_output_configs()
        .map_err(|e| RealtimeError::Transport(e.to_string()))?
        .find(|c| c.min_sample_rate().0 <= SAMPLE_RATE && c.max_sample_rate().0 >= SAMPLE_RATE)
        .map(|c| c.sample_format())
        .unwrap_or(SampleFormat::F32);

    let err_fn = |err| error!("Playback error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _| {
                let mut queue = queue.lock();
                for out in data.iter_mut() {
                    *out = queue.pop_front().unwrap_or(0.0);
                }
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &stream_config,
            move |data: &mut [i16], _| {
                let mut queue = queue.lock();
                for out in data.iter_mut() {
                    let s = queue.pop_front().unwrap_or(0.0);
                    *out = (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                }
            },
            err_fn,
            None,
        ),
        other => {
            return Err(RealtimeError::Transport(format!(
                "Unsupported sample format: {other:?}"
            )));
        }
    }
    .map_err(|e| RealtimeError::Transport(e.to_string()))?;

    stream
        .play()
        .map_err(|e| RealtimeError::Transport(e.to_string()))?;

    debug!("Playback stream opened: {}Hz", SAMPLE_RATE);
    Ok(stream)
}
