//! Finger-state sources
//!
//! The landmark model is an external collaborator. Whatever drives it
//! (a camera pipeline, a recorded session, a test script) implements
//! [`FingerStateSource`] and yields one [`Observation`] per frame.

pub mod landmarks;
pub mod replay;

use std::collections::VecDeque;

use async_trait::async_trait;
use thiserror::Error;

use handgate_core::{FingerVector, GestureCode, Observation};

pub use landmarks::{FingerExtractor, HandLandmarks, Handedness, Landmark};
pub use replay::ReplaySource;

/// Frame source failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    /// Camera or model cannot deliver frames at all
    #[error("sensor unavailable: {0}")]
    Unavailable(String),

    /// One frame could not be read; the next may succeed
    #[error("frame dropped: {0}")]
    FrameDropped(String),

    /// A finite source has no more frames
    #[error("frame source exhausted")]
    Exhausted,
}

/// Produces one observation per frame
///
/// Implementations must not block longer than one frame interval.
#[async_trait]
pub trait FingerStateSource: Send {
    /// Wait for the next frame
    async fn next_observation(&mut self) -> Result<Observation, SensorError>;

    /// Short description for logs
    fn describe(&self) -> String {
        "finger-state source".to_string()
    }
}

#[async_trait]
impl<S: FingerStateSource + ?Sized> FingerStateSource for Box<S> {
    async fn next_observation(&mut self) -> Result<Observation, SensorError> {
        (**self).next_observation().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// In-memory frame script
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    frames: VecDeque<Result<Observation, SensorError>>,
    idle_when_done: bool,
    served: u64,
}

impl ScriptedSource {
    /// Empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Script from observations
    pub fn from_observations(observations: impl IntoIterator<Item = Observation>) -> Self {
        Self {
            frames: observations.into_iter().map(Ok).collect(),
            ..Self::default()
        }
    }

    /// Holds of each gesture for `hold` frames, each followed by `gap`
    /// no-hand frames
    pub fn gestures(masks: &[u8], hold: usize, gap: usize) -> Self {
        let mut source = Self::new();
        for mask in masks {
            let vector = GestureCode::try_from(*mask)
                .map(GestureCode::to_vector)
                .unwrap_or(FingerVector::CLOSED);
            source = source.hand(vector, hold).no_hand(gap);
        }
        source
    }

    /// Append `frames` frames of a hand
    pub fn hand(mut self, vector: FingerVector, frames: usize) -> Self {
        self.frames
            .extend(std::iter::repeat(Ok(Observation::Hand(vector))).take(frames));
        self
    }

    /// Append `frames` frames with no hand
    pub fn no_hand(mut self, frames: usize) -> Self {
        self.frames
            .extend(std::iter::repeat(Ok(Observation::NoHand)).take(frames));
        self
    }

    /// Append a failure
    pub fn error(mut self, error: SensorError) -> Self {
        self.frames.push_back(Err(error));
        self
    }

    /// Append another script
    pub fn then(mut self, other: ScriptedSource) -> Self {
        self.frames.extend(other.frames);
        self
    }

    /// Keep reporting "no hand" once the script runs out instead of
    /// [`SensorError::Exhausted`]
    pub fn idle_when_done(mut self) -> Self {
        self.idle_when_done = true;
        self
    }

    /// Frames not yet served
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    /// Frames served so far
    pub fn served(&self) -> u64 {
        self.served
    }
}

#[async_trait]
impl FingerStateSource for ScriptedSource {
    async fn next_observation(&mut self) -> Result<Observation, SensorError> {
        match self.frames.pop_front() {
            Some(frame) => {
                self.served += 1;
                frame
            }
            None if self.idle_when_done => {
                self.served += 1;
                Ok(Observation::NoHand)
            }
            None => Err(SensorError::Exhausted),
        }
    }

    fn describe(&self) -> String {
        format!("scripted source ({} frames left)", self.frames.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_source_serves_in_order() {
        let thumb = FingerVector::from_bits([1, 0, 0, 0, 0]).unwrap();
        let mut source = ScriptedSource::new().hand(thumb, 2).no_hand(1);

        assert_eq!(source.next_observation().await, Ok(Observation::Hand(thumb)));
        assert_eq!(source.next_observation().await, Ok(Observation::Hand(thumb)));
        assert_eq!(source.next_observation().await, Ok(Observation::NoHand));
        assert_eq!(source.next_observation().await, Err(SensorError::Exhausted));
        assert_eq!(source.served(), 3);
    }

    #[tokio::test]
    async fn test_idle_when_done() {
        let mut source = ScriptedSource::new().idle_when_done();
        for _ in 0..5 {
            assert_eq!(source.next_observation().await, Ok(Observation::NoHand));
        }
    }

    #[tokio::test]
    async fn test_gestures_builder() {
        let source = ScriptedSource::gestures(&[1, 3], 10, 6);
        assert_eq!(source.remaining(), 32);
    }
}
