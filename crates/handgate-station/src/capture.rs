//! Capture sessions
//!
//! One session reads frames until a full PIN or pattern has been
//! recorded, the time budget runs out, or the closing gesture is shown.
//! Each frame goes through the stabilizer and, when it yields a gesture,
//! into the recorder. The LED board mirrors the hand on every frame and is
//! switched off when the session ends, whatever the outcome.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use handgate_core::{
    FingerVector, GestureCode, GestureKind, GestureSequence, GestureStabilizer, LedStatus,
    SequenceRecorder, SessionStatus, SubjectId,
};

use crate::clock::Clock;
use crate::config::StationConfig;
use crate::error::{Result, StationError};
use crate::led::{BestEffortLed, LedReflector};
use crate::sensor::{FingerStateSource, SensorError};

/// Why a sequence is being captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Recording a new credential
    Enroll,
    /// Checking against an enrolled credential
    Verify,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Enroll => write!(f, "enroll"),
            SessionMode::Verify => write!(f, "verify"),
        }
    }
}

/// How a capture session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A full sequence was recorded
    Complete {
        sequence: GestureSequence,
        /// Time between consecutive accepted gestures
        intervals: Vec<Duration>,
    },
    /// The time budget ran out; everything captured was discarded
    TimedOut,
    /// The closing gesture was shown
    Cancelled { captured: usize },
}

impl CaptureOutcome {
    /// The recorded sequence, if complete
    pub fn sequence(&self) -> Option<&GestureSequence> {
        match self {
            CaptureOutcome::Complete { sequence, .. } => Some(sequence),
            _ => None,
        }
    }
}

/// One capture of a PIN or pattern
pub struct CaptureSession {
    kind: GestureKind,
    mode: SessionMode,
    stabilizer: GestureStabilizer,
    recorder: SequenceRecorder,
    closing: Option<GestureCode>,
    max_failed_reads: u32,
    clock: Arc<dyn Clock>,
}

impl CaptureSession {
    /// Start a session now
    pub fn new(
        kind: GestureKind,
        owner: SubjectId,
        mode: SessionMode,
        config: &StationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let started_at = clock.now();
        Self {
            kind,
            mode,
            stabilizer: GestureStabilizer::new(config.stabilizer_config(kind)),
            recorder: SequenceRecorder::new(
                kind,
                owner,
                started_at,
                config.recorder_config(kind, mode),
            ),
            closing: config.closing_gesture(mode),
            max_failed_reads: config.max_failed_reads.max(1),
            clock,
        }
    }

    /// Read frames until the session ends.
    ///
    /// Returns an error only when the sensor cannot deliver frames; every
    /// other ending is a [`CaptureOutcome`].
    pub async fn run<S, L>(
        mut self,
        source: &mut S,
        leds: &mut BestEffortLed<L>,
    ) -> Result<CaptureOutcome>
    where
        S: FingerStateSource + ?Sized,
        L: LedReflector,
    {
        info!(
            kind = %self.kind,
            mode = %self.mode,
            source = %source.describe(),
            "Capture started"
        );

        let result = self.read_frames(source, leds).await;
        leds.clear();

        match &result {
            Ok(CaptureOutcome::Complete { .. }) => info!(kind = %self.kind, "Capture complete"),
            Ok(CaptureOutcome::TimedOut) => info!(kind = %self.kind, "Capture timed out"),
            Ok(CaptureOutcome::Cancelled { captured }) => {
                info!(kind = %self.kind, captured, "Capture cancelled by closing gesture")
            }
            Err(e) => warn!(kind = %self.kind, "Capture aborted: {}", e),
        }
        result
    }

    async fn read_frames<S, L>(
        &mut self,
        source: &mut S,
        leds: &mut BestEffortLed<L>,
    ) -> Result<CaptureOutcome>
    where
        S: FingerStateSource + ?Sized,
        L: LedReflector,
    {
        let mut failed_reads = 0u32;
        loop {
            let observation = match source.next_observation().await {
                Ok(observation) => {
                    failed_reads = 0;
                    observation
                }
                Err(SensorError::FrameDropped(reason)) => {
                    failed_reads += 1;
                    debug!(failed_reads, %reason, "Frame dropped");
                    if failed_reads >= self.max_failed_reads {
                        return Err(StationError::SensorUnavailable(format!(
                            "{} consecutive frames dropped, last: {}",
                            failed_reads, reason
                        )));
                    }
                    if self.recorder.poll(self.clock.now()) == SessionStatus::TimedOut {
                        return Ok(CaptureOutcome::TimedOut);
                    }
                    continue;
                }
                Err(e) => return Err(StationError::SensorUnavailable(e.to_string())),
            };

            let now = self.clock.now();
            let fingers = observation.fingers().unwrap_or(FingerVector::CLOSED);
            leds.reflect(&fingers, LedStatus::Reflect);

            if let Some(event) = self.stabilizer.observe(observation, now) {
                if Some(event.code) == self.closing {
                    return Ok(CaptureOutcome::Cancelled {
                        captured: self.recorder.captured().len(),
                    });
                }
                self.recorder.push(event);
            }

            match self.recorder.poll(now) {
                SessionStatus::AwaitingMore => {}
                SessionStatus::TimedOut => return Ok(CaptureOutcome::TimedOut),
                SessionStatus::Complete => {
                    let intervals = self.recorder.intervals();
                    let recorder = self.recorder.clone();
                    let sequence = recorder.finish()?;
                    return Ok(CaptureOutcome::Complete {
                        sequence,
                        intervals,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SteppingClock;
    use crate::led::RecordingLed;
    use crate::sensor::ScriptedSource;
    use handgate_core::LedProtocol;

    fn clock(config: &StationConfig) -> Arc<dyn Clock> {
        Arc::new(SteppingClock::new(config.frame_interval()))
    }

    fn owner() -> SubjectId {
        SubjectId::new("0102030405").unwrap()
    }

    fn leds() -> BestEffortLed<RecordingLed> {
        BestEffortLed::new(RecordingLed::new(LedProtocol::Framed))
    }

    #[tokio::test]
    async fn test_pin_capture_completes() {
        let config = StationConfig::default();
        let session = CaptureSession::new(
            GestureKind::Pin,
            owner(),
            SessionMode::Verify,
            &config,
            clock(&config),
        );
        let mut source = ScriptedSource::gestures(&[1, 3, 7, 15], 10, 20);
        let mut leds = leds();

        let (sequence, intervals) = match session.run(&mut source, &mut leds).await.unwrap() {
            CaptureOutcome::Complete {
                sequence,
                intervals,
            } => (sequence, intervals),
            other => panic!("expected a complete capture, got {:?}", other),
        };
        assert_eq!(sequence.masks(), vec![1, 3, 7, 15]);
        assert_eq!(intervals.len(), 3);
        assert!(intervals.iter().all(|i| *i >= Duration::from_millis(900)));

        let led = leds.into_inner();
        assert!(led.frames().len() > 100);
        assert_eq!(led.last(), Some((FingerVector::CLOSED, LedStatus::Reflect)));
    }

    #[tokio::test]
    async fn test_closing_gesture_cancels_enrollment() {
        let config = StationConfig::default();
        let session = CaptureSession::new(
            GestureKind::Pattern,
            owner(),
            SessionMode::Enroll,
            &config,
            clock(&config),
        );
        let mut source = ScriptedSource::gestures(&[1, 2, 19], 10, 20);

        let outcome = session.run(&mut source, &mut leds()).await.unwrap();
        assert_eq!(outcome, CaptureOutcome::Cancelled { captured: 2 });
    }

    #[tokio::test]
    async fn test_idle_capture_times_out() {
        let config = StationConfig {
            pin_timeout_secs: 2,
            ..StationConfig::default()
        };
        let session = CaptureSession::new(
            GestureKind::Pin,
            owner(),
            SessionMode::Verify,
            &config,
            clock(&config),
        );
        let mut source = ScriptedSource::gestures(&[1, 3], 10, 20).idle_when_done();

        let outcome = session.run(&mut source, &mut leds()).await.unwrap();
        assert_eq!(outcome, CaptureOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_dropped_frames_exhaust_sensor() {
        let config = StationConfig {
            max_failed_reads: 3,
            ..StationConfig::default()
        };
        let session = CaptureSession::new(
            GestureKind::Pin,
            owner(),
            SessionMode::Verify,
            &config,
            clock(&config),
        );
        let dropped = || SensorError::FrameDropped("blur".into());
        let mut source = ScriptedSource::new()
            .error(dropped())
            .error(dropped())
            .no_hand(1)
            .error(dropped())
            .error(dropped())
            .error(dropped());
        let mut leds = leds();

        let err = session.run(&mut source, &mut leds).await.unwrap_err();
        assert!(matches!(err, StationError::SensorUnavailable(_)));
        // one mirrored frame, then the final clear
        assert_eq!(leds.inner().frames().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_source_is_unavailable() {
        let config = StationConfig::default();
        let session = CaptureSession::new(
            GestureKind::Pin,
            owner(),
            SessionMode::Verify,
            &config,
            clock(&config),
        );
        let mut source = ScriptedSource::gestures(&[1], 10, 20);
        let err = session.run(&mut source, &mut leds()).await.unwrap_err();
        assert!(matches!(err, StationError::SensorUnavailable(_)));
    }
}
