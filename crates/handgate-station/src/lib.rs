//! Handgate Station - Access point around the gesture engine
//!
//! This crate provides:
//! - Configuration from file and environment
//! - Finger-state sources (scripted, replayed, landmark quantization)
//! - LED feedback over a serial link
//! - Capture sessions driving the stabilizer and recorder per frame
//! - The student, area and credential registry with JSON storage
//! - Enrollment and access use cases with auditing

pub mod access;
pub mod capture;
pub mod clock;
pub mod config;
pub mod error;
pub mod led;
pub mod lockout;
pub mod registry;
pub mod sensor;
pub mod storage;
pub mod validation;

pub use access::{AccessDecision, AccessRequest, AccessService};
pub use capture::{CaptureOutcome, CaptureSession, SessionMode};
pub use clock::{Clock, SteppingClock, SystemClock};
pub use config::StationConfig;
pub use error::{Result, StationError};
pub use led::{open_reflector, BestEffortLed, LedReflector, NullLed, RecordingLed, SerialLed};
pub use lockout::{LockoutPolicy, LockoutState};
pub use registry::{
    AccessGrant, AccessRegistry, Area, AreaKind, CredentialStatus, PatternCredential, Permission,
    PermissionStatus, PinCredential, RfidCredential, RfidVerdict, Student,
};
pub use sensor::{FingerExtractor, FingerStateSource, ReplaySource, ScriptedSource, SensorError};
pub use storage::{FileAuditLog, StationStorage};
