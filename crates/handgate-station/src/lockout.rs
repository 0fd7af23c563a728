//! Progressive PIN lockout
//!
//! Area PINs are short, so repeated wrong PINs lock the PIN for an
//! increasing time:
//!
//! - 1-2 failures: no lockout
//! - 3 failures: 30 seconds
//! - 4 failures: 5 minutes
//! - 5 failures: 30 minutes
//! - 6+ failures: 24 hours
//!
//! A correct PIN resets the count.

use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Progressive lockout policy
#[derive(Clone, Debug, PartialEq)]
pub struct LockoutPolicy {
    /// Failures before the first lockout
    pub threshold: u32,
    /// Lockout durations for each level (in seconds)
    pub lockout_durations: Vec<u64>,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: 3,
            lockout_durations: vec![
                30,    // 3 failures: 30 seconds
                300,   // 4 failures: 5 minutes
                1800,  // 5 failures: 30 minutes
                86400, // 6+ failures: 24 hours
            ],
        }
    }
}

impl LockoutPolicy {
    /// Lockout for the given number of consecutive failures, `None` below
    /// the threshold
    pub fn lockout_duration(&self, failed_attempts: u32) -> Option<Duration> {
        if failed_attempts < self.threshold || self.lockout_durations.is_empty() {
            return None;
        }

        let level = (failed_attempts - self.threshold) as usize;
        let index = level.min(self.lockout_durations.len() - 1);

        Some(Duration::from_secs(self.lockout_durations[index]))
    }

    /// Human-readable lockout state
    pub fn describe(&self, failed_attempts: u32) -> String {
        match self.lockout_duration(failed_attempts) {
            Some(duration) => {
                let secs = duration.as_secs();
                if secs < 60 {
                    format!("locked for {} seconds", secs)
                } else if secs < 3600 {
                    format!("locked for {} minutes", secs / 60)
                } else if secs < 86400 {
                    format!("locked for {} hours", secs / 3600)
                } else {
                    format!("locked for {} days", secs / 86400)
                }
            }
            None => format!(
                "{} attempts remaining",
                self.threshold.saturating_sub(failed_attempts)
            ),
        }
    }
}

/// Failure bookkeeping stored with a credential
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutState {
    /// Consecutive failed verifications
    pub failed_attempts: u32,
    /// Locked until this local time
    pub locked_until: Option<NaiveDateTime>,
}

impl LockoutState {
    /// Whether the credential is locked at `now`
    pub fn is_locked_at(&self, now: NaiveDateTime) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// Count a failure, locking if the policy says so. Returns the new
    /// lock expiry, if any.
    pub fn record_failure(
        &mut self,
        policy: &LockoutPolicy,
        now: NaiveDateTime,
    ) -> Option<NaiveDateTime> {
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        let duration = policy.lockout_duration(self.failed_attempts)?;
        let until = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(NaiveDateTime::MAX);
        warn!(
            failures = self.failed_attempts,
            %until,
            "Credential {}",
            policy.describe(self.failed_attempts)
        );
        self.locked_until = Some(until);
        self.locked_until
    }

    /// Clear failures after a success
    pub fn record_success(&mut self) {
        self.failed_attempts = 0;
        self.locked_until = None;
    }
}
