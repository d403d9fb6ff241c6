//! Per-session resource ownership.
//!
//! Every resource a session creates is registered here the moment it exists.
//! Teardown iterates only this registry, so two engines never touch each
//! other's media.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::core::audio::{AudioContext, LocalStream, PlaybackHandle};
use crate::core::transport::{DataChannel, PeerConnection};

/// Resources owned by one session.
#[derive(Default)]
pub struct ResourceRegistry {
    peer: Option<Arc<dyn PeerConnection>>,
    channel: Option<Arc<dyn DataChannel>>,
    local_stream: Option<LocalStream>,
    audio_context: Option<Arc<AudioContext>>,
    playback: Vec<PlaybackHandle>,
    tasks: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_peer(&mut self, peer: Arc<dyn PeerConnection>) {
        self.peer = Some(peer);
    }

    pub fn set_channel(&mut self, channel: Arc<dyn DataChannel>) {
        self.channel = Some(channel);
    }

    pub fn set_local_stream(&mut self, stream: LocalStream) {
        self.local_stream = Some(stream);
    }

    pub fn set_audio_context(&mut self, context: Arc<AudioContext>) {
        self.audio_context = Some(context);
    }

    pub fn add_playback(&mut self, handle: PlaybackHandle) {
        self.playback.push(handle);
    }

    /// Track a background task so teardown aborts it.
    pub fn track_task(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }

    /// Token cancelled when the registry is released.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn peer(&self) -> Option<&Arc<dyn PeerConnection>> {
        self.peer.as_ref()
    }

    pub fn channel(&self) -> Option<&Arc<dyn DataChannel>> {
        self.channel.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.peer.is_none()
            && self.channel.is_none()
            && self.local_stream.is_none()
            && self.audio_context.is_none()
            && self.playback.is_empty()
            && self.tasks.is_empty()
    }

    /// Silence every transport callback. Runs before anything is closed so
    /// no late event reaches half torn down state.
    pub fn detach_handlers(&self) {
        if let Some(peer) = &self.peer {
            peer.detach_handlers();
        }
        if let Some(channel) = &self.channel {
            channel.detach();
        }
    }

    /// Close, stop and abort everything, leaving the registry empty.
    /// Safe to call repeatedly.
    pub async fn release(&mut self) {
        if let Some(channel) = self.channel.take()
            && let Err(e) = channel.close().await
        {
            warn!("Failed to close data channel: {}", e);
        }
        if let Some(peer) = self.peer.take()
            && let Err(e) = peer.close().await
        {
            warn!("Failed to close peer connection: {}", e);
        }
        if let Some(stream) = self.local_stream.take() {
            stream.stop();
        }
        for handle in self.playback.drain(..) {
            handle.stop();
        }
        if let Some(context) = self.audio_context.take() {
            context.close();
        }
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!("Session resources released");
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("peer", &self.peer.is_some())
            .field("channel", &self.channel.is_some())
            .field("local_stream", &self.local_stream.is_some())
            .field("audio_context", &self.audio_context.is_some())
            .field("playback", &self.playback.len())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

/// A connection attempt that has not yet handed its resources to a session.
///
/// The attempt owns whatever it created until it either hands off or
/// releases; `settled` fires at that point.
#[derive(Debug, Clone)]
pub struct ConnectAttempt {
    cancel: CancellationToken,
    settled: CancellationToken,
}

impl ConnectAttempt {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            settled: CancellationToken::new(),
        }
    }

    /// Token the negotiation races against.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Guard held by the connecting task; dropping it marks the attempt
    /// settled.
    pub fn settle_guard(&self) -> DropGuard {
        self.settled.clone().drop_guard()
    }

    /// Cancel the attempt and wait until it has released or handed off
    /// every resource it created.
    pub async fn abort(self) {
        self.cancel.cancel();
        self.settled.cancelled().await;
    }
}

impl Default for ConnectAttempt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::MediaTrack;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_new_registry_is_empty() {
        let registry = ResourceRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.peer().is_none());
        assert!(registry.channel().is_none());
    }

    #[tokio::test]
    async fn test_release_stops_everything() {
        let mut registry = ResourceRegistry::new();
        let track = MediaTrack::new("microphone");
        registry.set_local_stream(LocalStream::new(vec![track.clone()]));

        let context = Arc::new(AudioContext::new());
        context.connect_source(&track);
        registry.set_audio_context(context.clone());

        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        registry.add_playback(PlaybackHandle::new(move || flag.store(true, Ordering::SeqCst)));

        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        registry.track_task(task);
        let token = registry.cancel_token();
        assert!(!registry.is_empty());

        registry.release().await;

        assert!(track.is_stopped());
        assert!(context.is_closed());
        assert!(stopped.load(Ordering::SeqCst));
        assert!(token.is_cancelled());
        assert!(registry.is_empty());

        // Second release is a no-op
        registry.release().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_track_task_prunes_finished() {
        let mut registry = ResourceRegistry::new();
        let done = tokio::spawn(async {});
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.track_task(done);
        registry.track_task(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }));
        assert_eq!(registry.tasks.len(), 1);
        registry.release().await;
    }

    #[tokio::test]
    async fn test_abort_waits_for_settle() {
        let attempt = ConnectAttempt::new();
        let guard = attempt.settle_guard();
        let token = attempt.cancel_token().clone();
        let released = Arc::new(AtomicBool::new(false));

        let flag = released.clone();
        let connecting = tokio::spawn(async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
            drop(guard);
        });

        attempt.abort().await;
        assert!(released.load(Ordering::SeqCst));
        connecting.await.unwrap();
    }

    #[tokio::test]
    async fn test_abort_after_settle_returns_immediately() {
        let attempt = ConnectAttempt::new();
        drop(attempt.settle_guard());
        tokio::time::timeout(Duration::from_millis(100), attempt.abort())
            .await
            .unwrap();
    }
}
