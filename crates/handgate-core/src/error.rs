//! Error types for the gesture factor engine

use thiserror::Error;

use crate::types::GestureKind;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the core.
///
/// None of these describe a rejected user. A wrong gesture is a `false`
/// from the verifier and a `FailureReason` in the audit log; these variants
/// are for malformed input and contract violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Sequence length does not match its kind
    #[error("{kind} sequence requires {expected} gestures, got {actual}")]
    InvalidSequenceLength {
        kind: GestureKind,
        expected: usize,
        actual: usize,
    },

    /// Gesture code outside the 5-bit range
    #[error("Gesture code out of range: {0} (must be 0-31)")]
    InvalidGestureCode(u8),

    /// Finger bit that is neither 0 nor 1
    #[error("Finger state must be 0 or 1, got {0}")]
    InvalidFingerBit(u8),

    /// Verifier was asked to compare sequences of different kinds
    #[error("Cannot compare a {captured} sequence against an enrolled {enrolled} sequence")]
    KindMismatch {
        captured: GestureKind,
        enrolled: GestureKind,
    },

    /// Recorder was finished before it completed
    #[error("Capture is not complete ({captured}/{required} gestures)")]
    IncompleteCapture { captured: usize, required: usize },

    /// Recorder timed out and discarded its buffer
    #[error("Capture timed out")]
    CaptureTimedOut,

    /// Factor state machine received an event not valid in its phase
    #[error("Invalid factor transition: {event} while {phase}")]
    InvalidTransition {
        phase: &'static str,
        event: &'static str,
    },

    /// Identifier failed validation
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Malformed LED frame
    #[error("Invalid LED frame: {0}")]
    InvalidLedFrame(String),
}
