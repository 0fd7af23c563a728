//! Handgate Core - Gesture factor engine
//!
//! This crate turns a stream of per-frame finger states into debounced
//! gesture events, collects them into PIN / pattern sequences, verifies
//! captured sequences against enrolled ones and records every
//! authentication attempt.
//!
//! It performs no I/O of its own. Cameras, serial links and storage are
//! reached through the seams defined here (`AuditSink`) or in
//! `handgate-station`.

pub mod attempt;
pub mod audit;
pub mod error;
pub mod protocol;
pub mod recorder;
pub mod sequence;
pub mod stabilizer;
pub mod types;
pub mod verifier;

pub use attempt::{FactorAttempt, FactorPhase};
pub use audit::{
    AttemptAuditor, AuditSink, AuthAttempt, FactorChecks, FactorOutcome, FailureReason,
    MemoryAuditLog,
};
pub use error::{Error, Result};
pub use protocol::{FramedDecoder, LedCommand, LedProtocol, LedStatus, SimpleDecoder};
pub use recorder::{RecorderConfig, SequenceRecorder, SessionStatus, TimeoutPolicy};
pub use sequence::GestureSequence;
pub use stabilizer::{GestureEvent, GestureStabilizer, StabilizerConfig};
pub use types::{
    AreaId, FactorKind, Finger, FingerVector, GestureCode, GestureKind, Observation, SubjectId,
};
pub use verifier::verify;

/// Number of fingers tracked per hand
pub const FINGER_COUNT: usize = 5;

/// Number of gestures in a PIN
pub const PIN_LENGTH: usize = 4;

/// Number of gestures in a pattern
pub const PATTERN_LENGTH: usize = 10;

/// Default consecutive identical frames before a gesture is accepted
pub const DEFAULT_STABLE_FRAMES: u32 = 10;

/// Default minimum spacing between accepted gestures (milliseconds)
pub const DEFAULT_DEBOUNCE_MS: u64 = 900;

/// Default consecutive "no hand" frames required between gestures
pub const DEFAULT_NO_HAND_FRAMES: u32 = 6;
