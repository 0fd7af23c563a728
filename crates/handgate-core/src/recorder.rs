//! Gesture sequence recording
//!
//! Collects stabilized gestures until the sequence for its kind is complete
//! or the time budget runs out. The recorder does not know whether it is
//! enrolling or verifying; the capture session decides what happens with the
//! finished sequence.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::sequence::GestureSequence;
use crate::stabilizer::GestureEvent;
use crate::types::{GestureCode, GestureKind, SubjectId};

/// What the recorder timeout is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Total time since the session started
    #[default]
    SinceStart,
    /// Time since the last accepted gesture (or the start, before the first)
    SinceLastEvent,
}

/// Recorder time budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecorderConfig {
    /// Ceiling before the session times out (`None` waits forever)
    pub timeout: Option<Duration>,
    /// Reference point of the ceiling
    pub policy: TimeoutPolicy,
}

impl RecorderConfig {
    /// Budget measured from session start
    pub fn since_start(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            policy: TimeoutPolicy::SinceStart,
        }
    }
}

/// Recorder state after a push or poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// More gestures are needed
    AwaitingMore,
    /// The sequence has its full length
    Complete,
    /// The budget ran out; the buffer was discarded
    TimedOut,
}

impl SessionStatus {
    /// Whether no further gestures will be accepted
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::AwaitingMore)
    }
}

/// Accumulates gesture events into one sequence
#[derive(Debug, Clone)]
pub struct SequenceRecorder {
    kind: GestureKind,
    owner: SubjectId,
    started_at: Instant,
    config: RecorderConfig,
    codes: Vec<GestureCode>,
    accepted_at: Vec<Instant>,
    status: SessionStatus,
}

impl SequenceRecorder {
    /// Start recording a sequence of `kind` at `started_at`
    pub fn new(
        kind: GestureKind,
        owner: SubjectId,
        started_at: Instant,
        config: RecorderConfig,
    ) -> Self {
        Self {
            kind,
            owner,
            started_at,
            config,
            codes: Vec::with_capacity(kind.required_len()),
            accepted_at: Vec::with_capacity(kind.required_len()),
            status: SessionStatus::AwaitingMore,
        }
    }

    /// Append a stabilized gesture
    pub fn push(&mut self, event: GestureEvent) -> SessionStatus {
        if self.status.is_terminal() {
            return self.status;
        }

        if self.poll(event.at) == SessionStatus::TimedOut {
            return self.status;
        }

        self.codes.push(event.code);
        self.accepted_at.push(event.at);
        debug!(
            kind = %self.kind,
            captured = self.codes.len(),
            required = self.kind.required_len(),
            "Gesture recorded"
        );

        if self.codes.len() == self.kind.required_len() {
            self.status = SessionStatus::Complete;
        }
        self.status
    }

    /// Check the time budget without a new gesture (called every frame)
    pub fn poll(&mut self, now: Instant) -> SessionStatus {
        if self.status == SessionStatus::AwaitingMore && self.is_expired(now) {
            debug!(kind = %self.kind, captured = self.codes.len(), "Capture timed out");
            self.codes.clear();
            self.accepted_at.clear();
            self.status = SessionStatus::TimedOut;
        }
        self.status
    }

    /// Current state
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Kind being recorded
    pub fn kind(&self) -> GestureKind {
        self.kind
    }

    /// Gestures recorded so far
    pub fn captured(&self) -> &[GestureCode] {
        &self.codes
    }

    /// Time between consecutive accepted gestures
    pub fn intervals(&self) -> Vec<Duration> {
        self.accepted_at
            .windows(2)
            .map(|w| w[1].saturating_duration_since(w[0]))
            .collect()
    }

    /// Time left before the budget runs out
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.config
            .timeout
            .map(|t| t.saturating_sub(now.saturating_duration_since(self.reference())))
    }

    /// Consume the recorder, yielding the finished sequence
    pub fn finish(self) -> Result<GestureSequence> {
        match self.status {
            SessionStatus::Complete => GestureSequence::new(self.kind, self.owner, self.codes),
            SessionStatus::TimedOut => Err(Error::CaptureTimedOut),
            SessionStatus::AwaitingMore => Err(Error::IncompleteCapture {
                captured: self.codes.len(),
                required: self.kind.required_len(),
            }),
        }
    }

    fn reference(&self) -> Instant {
        match self.config.policy {
            TimeoutPolicy::SinceStart => self.started_at,
            TimeoutPolicy::SinceLastEvent => {
                self.accepted_at.last().copied().unwrap_or(self.started_at)
            }
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        match self.config.timeout {
            Some(timeout) => now.saturating_duration_since(self.reference()) > timeout,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> SubjectId {
        SubjectId::new("0102030405").unwrap()
    }

    fn event(mask: u8, at: Instant) -> GestureEvent {
        GestureEvent {
            code: GestureCode::try_from(mask).unwrap(),
            at,
        }
    }

    #[test]
    fn test_pin_completes_after_four() {
        let t0 = Instant::now();
        let mut rec = SequenceRecorder::new(
            GestureKind::Pin,
            owner(),
            t0,
            RecorderConfig::since_start(Duration::from_secs(60)),
        );

        for (i, mask) in [1u8, 3, 7].into_iter().enumerate() {
            let at = t0 + Duration::from_secs(i as u64 + 1);
            assert_eq!(rec.push(event(mask, at)), SessionStatus::AwaitingMore);
        }
        assert_eq!(
            rec.push(event(15, t0 + Duration::from_secs(4))),
            SessionStatus::Complete
        );
        assert_eq!(rec.intervals(), vec![Duration::from_secs(1); 3]);

        let seq = rec.finish().unwrap();
        assert_eq!(seq.masks(), vec![1, 3, 7, 15]);
    }

    #[test]
    fn test_pattern_completes_after_ten() {
        let t0 = Instant::now();
        let mut rec = SequenceRecorder::new(
            GestureKind::Pattern,
            owner(),
            t0,
            RecorderConfig::since_start(Duration::from_secs(120)),
        );
        let mut status = SessionStatus::AwaitingMore;
        for i in 0..10u64 {
            status = rec.push(event((i % 31) as u8, t0 + Duration::from_secs(i + 1)));
        }
        assert_eq!(status, SessionStatus::Complete);
        assert_eq!(rec.finish().unwrap().len(), 10);
    }

    #[test]
    fn test_timeout_since_start_discards_buffer() {
        let t0 = Instant::now();
        let mut rec = SequenceRecorder::new(
            GestureKind::Pin,
            owner(),
            t0,
            RecorderConfig::since_start(Duration::from_secs(5)),
        );
        rec.push(event(1, t0 + Duration::from_secs(1)));
        rec.push(event(2, t0 + Duration::from_secs(2)));

        assert_eq!(rec.poll(t0 + Duration::from_secs(5)), SessionStatus::AwaitingMore);
        assert_eq!(rec.poll(t0 + Duration::from_secs(6)), SessionStatus::TimedOut);
        assert!(rec.captured().is_empty());

        // Terminal: further gestures are ignored
        assert_eq!(
            rec.push(event(4, t0 + Duration::from_secs(7))),
            SessionStatus::TimedOut
        );
        assert_eq!(rec.finish(), Err(Error::CaptureTimedOut));
    }

    #[test]
    fn test_late_event_times_out() {
        let t0 = Instant::now();
        let mut rec = SequenceRecorder::new(
            GestureKind::Pin,
            owner(),
            t0,
            RecorderConfig::since_start(Duration::from_secs(5)),
        );
        assert_eq!(
            rec.push(event(1, t0 + Duration::from_secs(10))),
            SessionStatus::TimedOut
        );
    }

    #[test]
    fn test_timeout_since_last_event() {
        let t0 = Instant::now();
        let config = RecorderConfig {
            timeout: Some(Duration::from_secs(5)),
            policy: TimeoutPolicy::SinceLastEvent,
        };
        let mut rec = SequenceRecorder::new(GestureKind::Pin, owner(), t0, config);

        rec.push(event(1, t0 + Duration::from_secs(4)));
        rec.push(event(2, t0 + Duration::from_secs(8)));
        assert_eq!(rec.poll(t0 + Duration::from_secs(12)), SessionStatus::AwaitingMore);
        assert_eq!(rec.remaining(t0 + Duration::from_secs(12)), Some(Duration::from_secs(1)));
        assert_eq!(rec.poll(t0 + Duration::from_secs(14)), SessionStatus::TimedOut);
    }

    #[test]
    fn test_no_timeout_waits_forever() {
        let t0 = Instant::now();
        let mut rec =
            SequenceRecorder::new(GestureKind::Pin, owner(), t0, RecorderConfig::default());
        assert_eq!(
            rec.poll(t0 + Duration::from_secs(86_400)),
            SessionStatus::AwaitingMore
        );
    }

    #[test]
    fn test_finish_incomplete() {
        let t0 = Instant::now();
        let mut rec =
            SequenceRecorder::new(GestureKind::Pin, owner(), t0, RecorderConfig::default());
        rec.push(event(1, t0));
        assert_eq!(
            rec.finish(),
            Err(Error::IncompleteCapture {
                captured: 1,
                required: 4
            })
        );
    }
}
