//! Per-factor attempt state machine
//!
//! ```text
//! Idle -> Capturing -> Verifying -> Passed | Failed
//!                   \-> TimedOut
//! ```
//!
//! `Passed`, `Failed` and `TimedOut` are terminal. An abort from any
//! non-terminal phase fails the factor.

use std::fmt;

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::FactorKind;

/// Phase of one factor inside an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorPhase {
    Idle,
    Capturing,
    Verifying,
    Passed,
    Failed,
    TimedOut,
}

impl FactorPhase {
    /// Whether the phase ends the factor
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FactorPhase::Passed | FactorPhase::Failed | FactorPhase::TimedOut
        )
    }

    fn name(self) -> &'static str {
        match self {
            FactorPhase::Idle => "idle",
            FactorPhase::Capturing => "capturing",
            FactorPhase::Verifying => "verifying",
            FactorPhase::Passed => "passed",
            FactorPhase::Failed => "failed",
            FactorPhase::TimedOut => "timed out",
        }
    }
}

impl fmt::Display for FactorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tracks one factor through its phases
#[derive(Debug, Clone)]
pub struct FactorAttempt {
    factor: FactorKind,
    phase: FactorPhase,
}

impl FactorAttempt {
    /// Start in `Idle`
    pub fn new(factor: FactorKind) -> Self {
        Self {
            factor,
            phase: FactorPhase::Idle,
        }
    }

    /// Factor being tracked
    pub fn factor(&self) -> FactorKind {
        self.factor
    }

    /// Current phase
    pub fn phase(&self) -> FactorPhase {
        self.phase
    }

    /// `Idle -> Capturing`
    pub fn begin_capture(&mut self) -> Result<()> {
        self.transition(FactorPhase::Idle, FactorPhase::Capturing, "begin capture")
    }

    /// `Capturing -> Verifying`
    pub fn capture_complete(&mut self) -> Result<()> {
        self.transition(FactorPhase::Capturing, FactorPhase::Verifying, "capture complete")
    }

    /// `Capturing -> TimedOut`
    pub fn capture_timed_out(&mut self) -> Result<()> {
        self.transition(FactorPhase::Capturing, FactorPhase::TimedOut, "capture timed out")
    }

    /// `Verifying -> Passed | Failed`; factors without a capture step
    /// (RFID) may be judged straight from `Idle`
    pub fn verdict(&mut self, passed: bool) -> Result<FactorPhase> {
        let target = if passed {
            FactorPhase::Passed
        } else {
            FactorPhase::Failed
        };
        match self.phase {
            FactorPhase::Verifying | FactorPhase::Idle => {
                self.set(target);
                Ok(target)
            }
            phase => Err(Error::InvalidTransition {
                phase: phase.name(),
                event: "verdict",
            }),
        }
    }

    /// Any non-terminal phase -> `Failed`
    pub fn abort(&mut self) -> Result<()> {
        if self.phase.is_terminal() {
            return Err(Error::InvalidTransition {
                phase: self.phase.name(),
                event: "abort",
            });
        }
        self.set(FactorPhase::Failed);
        Ok(())
    }

    fn transition(
        &mut self,
        from: FactorPhase,
        to: FactorPhase,
        event: &'static str,
    ) -> Result<()> {
        if self.phase != from {
            return Err(Error::InvalidTransition {
                phase: self.phase.name(),
                event,
            });
        }
        self.set(to);
        Ok(())
    }

    fn set(&mut self, to: FactorPhase) {
        debug!(factor = %self.factor, from = %self.phase, %to, "Factor phase");
        self.phase = to;
    }
}
