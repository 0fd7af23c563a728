//! Gesture stabilization
//!
//! Turns the noisy per-frame finger stream into discrete gesture events.
//! A gesture is accepted once the same finger vector has been seen for
//! `stable_frames` consecutive frames, at least `debounce` after the
//! previous acceptance, and (optionally) after the hand has left the view
//! for `no_hand_frames` consecutive frames.
//!
//! Finger vectors are compared as exact symbols. Landmark jitter is
//! absorbed by the margins applied when the vector is built, not here.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::types::{FingerVector, GestureCode, Observation};
use crate::{DEFAULT_DEBOUNCE_MS, DEFAULT_NO_HAND_FRAMES, DEFAULT_STABLE_FRAMES};

/// Stabilizer thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct StabilizerConfig {
    /// Consecutive identical frames needed to accept a gesture
    pub stable_frames: u32,
    /// Minimum time between two accepted gestures
    pub debounce: Duration,
    /// Require the hand to leave the view between gestures
    pub require_no_hand: bool,
    /// Consecutive "no hand" frames that count as leaving the view
    pub no_hand_frames: u32,
    /// Treat a closed fist as "no candidate" instead of a gesture
    pub ignore_closed_fist: bool,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            stable_frames: DEFAULT_STABLE_FRAMES,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            require_no_hand: true,
            no_hand_frames: DEFAULT_NO_HAND_FRAMES,
            ignore_closed_fist: false,
        }
    }
}

/// A stabilized gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureEvent {
    /// The accepted gesture
    pub code: GestureCode,
    /// Frame time at which it was accepted
    pub at: Instant,
}

/// Per-session stabilization state
///
/// Owned by exactly one capture session and discarded with it.
#[derive(Debug, Clone)]
pub struct GestureStabilizer {
    config: StabilizerConfig,
    /// Vector currently being held
    candidate: Option<FingerVector>,
    /// Consecutive frames the candidate has been seen
    match_count: u32,
    /// When the last event was emitted
    last_event_at: Option<Instant>,
    /// Waiting for the hand to leave before the next gesture
    awaiting_release: bool,
    /// Consecutive no-hand frames while waiting
    no_hand_run: u32,
}

impl GestureStabilizer {
    /// Create a stabilizer; zero frame counts are raised to one
    pub fn new(mut config: StabilizerConfig) -> Self {
        config.stable_frames = config.stable_frames.max(1);
        config.no_hand_frames = config.no_hand_frames.max(1);
        Self {
            config,
            candidate: None,
            match_count: 0,
            last_event_at: None,
            awaiting_release: false,
            no_hand_run: 0,
        }
    }

    /// Feed one frame. Returns an event when a gesture is accepted.
    pub fn observe(&mut self, observation: Observation, now: Instant) -> Option<GestureEvent> {
        let vector = match observation {
            Observation::NoHand => {
                self.drop_candidate();
                if self.awaiting_release {
                    self.no_hand_run += 1;
                    if self.no_hand_run >= self.config.no_hand_frames {
                        debug!(frames = self.no_hand_run, "Hand released, ready for next gesture");
                        self.awaiting_release = false;
                        self.no_hand_run = 0;
                    }
                }
                return None;
            }
            Observation::Hand(vector) => vector,
        };

        if self.awaiting_release {
            // A hand in view restarts the release count
            self.no_hand_run = 0;
            self.drop_candidate();
            return None;
        }

        if self.config.ignore_closed_fist && vector == FingerVector::CLOSED {
            self.drop_candidate();
            return None;
        }

        if self.candidate == Some(vector) {
            self.match_count = self.match_count.saturating_add(1);
        } else {
            self.candidate = Some(vector);
            self.match_count = 1;
        }

        if self.match_count < self.config.stable_frames {
            return None;
        }

        if let Some(last) = self.last_event_at {
            if now.saturating_duration_since(last) < self.config.debounce {
                // Hold stays pending until the debounce window has passed
                return None;
            }
        }

        let code = GestureCode::from_vector(&vector);
        debug!(%code, held = self.match_count, "Gesture accepted");

        self.last_event_at = Some(now);
        self.drop_candidate();
        if self.config.require_no_hand {
            self.awaiting_release = true;
            self.no_hand_run = 0;
        }

        Some(GestureEvent { code, at: now })
    }

    /// Vector currently being held, if any
    pub fn candidate(&self) -> Option<FingerVector> {
        self.candidate
    }

    /// Consecutive frames the current candidate has been seen
    pub fn match_count(&self) -> u32 {
        self.match_count
    }

    /// Whether the hand must leave the view before the next gesture
    pub fn awaiting_release(&self) -> bool {
        self.awaiting_release
    }

    /// Consecutive no-hand frames counted toward the release
    pub fn no_hand_run(&self) -> u32 {
        self.no_hand_run
    }

    /// Time of the last accepted gesture
    pub fn last_event_at(&self) -> Option<Instant> {
        self.last_event_at
    }

    /// Get the configuration
    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    /// Forget all state, as if the session had just started
    pub fn reset(&mut self) {
        self.drop_candidate();
        self.last_event_at = None;
        self.awaiting_release = false;
        self.no_hand_run = 0;
    }

    fn drop_candidate(&mut self) {
        self.candidate = None;
        self.match_count = 0;
    }
}
