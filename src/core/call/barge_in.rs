//! Local barge-in detection.
//!
//! The local microphone level is sampled on a short cadence. When the user
//! starts speaking while the assistant has an in-flight response, that
//! response is cancelled.
//!
//! Only one active response id is tracked. This is correct only while the
//! service runs one response at a time; overlapping responses would make
//! the cancel target the wrong one.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core::realtime::ClientEvent;

/// Default peak deviation (byte scale) above which the user is speaking.
pub const DEFAULT_BARGE_IN_THRESHOLD: u8 = 10;

/// Default sampling period, roughly one display frame.
pub const DEFAULT_BARGE_IN_INTERVAL_MS: u64 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BargeInConfig {
    pub enabled: bool,
    /// Peak deviation from silence on a 0..=128 scale
    pub threshold: u8,
    pub interval_ms: u64,
}

impl Default for BargeInConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: DEFAULT_BARGE_IN_THRESHOLD,
            interval_ms: DEFAULT_BARGE_IN_INTERVAL_MS,
        }
    }
}

/// Speaking/not-speaking tracker that emits a cancel on the rising edge.
#[derive(Debug, Clone)]
pub struct BargeInController {
    config: BargeInConfig,
    speaking: bool,
}

impl BargeInController {
    pub fn new(config: BargeInConfig) -> Self {
        Self {
            config,
            speaking: false,
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &BargeInConfig {
        &self.config
    }

    /// Whether the user is currently considered speaking.
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Feed one level sample.
    ///
    /// Returns a cancel for `active_response_id` only on a not-speaking to
    /// speaking transition, and only when a response is in flight and the
    /// control channel is open.
    pub fn sample(
        &mut self,
        level: u8,
        active_response_id: Option<&str>,
        channel_open: bool,
    ) -> Option<ClientEvent> {
        let now_speaking = level > self.config.threshold;
        let rising = now_speaking && !self.speaking;
        self.speaking = now_speaking;

        if !rising || !self.config.enabled {
            return None;
        }
        trace!("Local speech onset at level {}", level);

        let Some(response_id) = active_response_id else {
            return None;
        };
        if !channel_open {
            debug!("Barge-in suppressed: control channel not open");
            return None;
        }
        debug!("Barge-in: cancelling response {}", response_id);
        Some(ClientEvent::cancel_response(response_id))
    }

    pub fn reset(&mut self) {
        self.speaking = false;
    }
}
