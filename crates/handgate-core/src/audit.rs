//! Authentication attempt auditing
//!
//! Every attempt produces exactly one [`AuthAttempt`], whatever happened
//! during it. The auditor only records; decisions are made by the caller.
//! Records are append-only and handed to the sink with non-decreasing
//! timestamps.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::types::{AreaId, FactorKind, SubjectId};

/// Result of one factor within an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FactorOutcome {
    Passed,
    Failed,
    /// The attempt ended before this factor was checked
    NotEvaluated,
}

/// Outcome of each factor, ordered RFID, PIN, pattern
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactorChecks(BTreeMap<FactorKind, FactorOutcome>);

impl FactorChecks {
    /// No factors
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// The given factors, all `NotEvaluated`
    pub fn required(factors: impl IntoIterator<Item = FactorKind>) -> Self {
        Self(
            factors
                .into_iter()
                .map(|f| (f, FactorOutcome::NotEvaluated))
                .collect(),
        )
    }

    /// Set a factor's outcome
    pub fn set(&mut self, factor: FactorKind, outcome: FactorOutcome) {
        self.0.insert(factor, outcome);
    }

    /// Record a pass/fail verdict
    pub fn record(&mut self, factor: FactorKind, passed: bool) {
        let outcome = if passed {
            FactorOutcome::Passed
        } else {
            FactorOutcome::Failed
        };
        self.set(factor, outcome);
    }

    /// Outcome of a factor, if it is part of the attempt
    pub fn get(&self, factor: FactorKind) -> Option<FactorOutcome> {
        self.0.get(&factor).copied()
    }

    /// True when there is at least one factor and every factor passed
    pub fn all_passed(&self) -> bool {
        !self.0.is_empty() && self.0.values().all(|o| *o == FactorOutcome::Passed)
    }

    /// First factor (in evaluation order) that failed
    pub fn first_failed(&self) -> Option<FactorKind> {
        self.0
            .iter()
            .find(|(_, o)| **o == FactorOutcome::Failed)
            .map(|(f, _)| *f)
    }

    /// Factors that passed, in evaluation order
    pub fn passed(&self) -> Vec<FactorKind> {
        self.0
            .iter()
            .filter(|(_, o)| **o == FactorOutcome::Passed)
            .map(|(f, _)| *f)
            .collect()
    }

    /// Iterate factors and outcomes in evaluation order
    pub fn iter(&self) -> impl Iterator<Item = (FactorKind, FactorOutcome)> + '_ {
        self.0.iter().map(|(f, o)| (*f, *o))
    }

    /// Number of factors in the attempt
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the attempt has no factors
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Why an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// Camera or landmark model could not deliver frames
    SensorUnavailable,
    /// No complete gesture sequence within the time budget
    SessionTimeout,
    /// Captured sequence differs from the enrolled one
    FactorMismatch,
    /// Pattern gestures match but their rhythm differs from enrollment
    TimingMismatch,
    /// The factor has no enrolled credential
    FactorNotEnrolled,
    /// The credential is locked after repeated failures
    FactorLocked,
    /// The attempt ended before a verdict (cancelled or aborted)
    CaptureCancelled,
    /// RFID card is not registered
    RfidUnknown,
    /// RFID card is blocked, lost, expired or belongs to someone else
    RfidRejected,
    /// Subject has no valid permission for the area
    NoPermission,
    /// Area is closed at this time
    OutsideSchedule,
    /// Area does not exist
    UnknownArea,
}

impl FailureReason {
    /// Stable code used in reports
    pub fn code(self) -> &'static str {
        match self {
            FailureReason::SensorUnavailable => "SENSOR_UNAVAILABLE",
            FailureReason::SessionTimeout => "SESSION_TIMEOUT",
            FailureReason::FactorMismatch => "FACTOR_MISMATCH",
            FailureReason::TimingMismatch => "TIMING_MISMATCH",
            FailureReason::FactorNotEnrolled => "FACTOR_NOT_ENROLLED",
            FailureReason::FactorLocked => "FACTOR_LOCKED",
            FailureReason::CaptureCancelled => "CAPTURE_CANCELLED",
            FailureReason::RfidUnknown => "RFID_UNKNOWN",
            FailureReason::RfidRejected => "RFID_REJECTED",
            FailureReason::NoPermission => "NO_PERMISSION",
            FailureReason::OutsideSchedule => "OUTSIDE_SCHEDULE",
            FailureReason::UnknownArea => "UNKNOWN_AREA",
        }
    }

    /// Whether retrying the same attempt can succeed
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureReason::SessionTimeout
                | FailureReason::FactorMismatch
                | FailureReason::TimingMismatch
                | FailureReason::CaptureCancelled
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Immutable record of one authentication attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthAttempt {
    id: Uuid,
    timestamp: DateTime<Utc>,
    subject: SubjectId,
    area: Option<AreaId>,
    checks: FactorChecks,
    success: bool,
    reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    detail: String,
}

impl AuthAttempt {
    /// Unique id of the record
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// When the attempt was recorded
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Who attempted
    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    /// Where, if known
    pub fn area(&self) -> Option<&AreaId> {
        self.area.as_ref()
    }

    /// Per-factor outcomes
    pub fn checks(&self) -> &FactorChecks {
        &self.checks
    }

    /// Overall result
    pub fn success(&self) -> bool {
        self.success
    }

    /// Failure reason (`None` on success)
    pub fn reason(&self) -> Option<FailureReason> {
        self.reason
    }

    /// Human-readable context
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// What the caller knows when an attempt ends
#[derive(Debug, Clone)]
pub struct AttemptDraft {
    pub subject: SubjectId,
    pub area: Option<AreaId>,
    pub checks: FactorChecks,
    pub overall: bool,
    pub reason: Option<FailureReason>,
    pub detail: String,
}

impl AttemptDraft {
    /// Draft without area or detail
    pub fn new(
        subject: SubjectId,
        checks: FactorChecks,
        overall: bool,
        reason: Option<FailureReason>,
    ) -> Self {
        Self {
            subject,
            area: None,
            checks,
            overall,
            reason,
            detail: String::new(),
        }
    }

    /// Attach the area
    pub fn in_area(mut self, area: AreaId) -> Self {
        self.area = Some(area);
        self
    }

    /// Attach a human-readable explanation
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

/// Append-only destination for attempt records
pub trait AuditSink {
    /// Persist one record. Must never modify earlier records.
    fn append(&mut self, attempt: &AuthAttempt) -> std::io::Result<()>;
}

/// In-memory audit log
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    entries: Vec<AuthAttempt>,
}

impl MemoryAuditLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, oldest first
    pub fn entries(&self) -> &[AuthAttempt] {
        &self.entries
    }

    /// Records for one subject
    pub fn by_subject(&self, subject: &SubjectId) -> Vec<&AuthAttempt> {
        self.entries.iter().filter(|a| a.subject() == subject).collect()
    }

    /// Records for one area
    pub fn by_area(&self, area: &AreaId) -> Vec<&AuthAttempt> {
        self.entries
            .iter()
            .filter(|a| a.area() == Some(area))
            .collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&mut self, attempt: &AuthAttempt) -> std::io::Result<()> {
        self.entries.push(attempt.clone());
        Ok(())
    }
}

/// Produces attempt records and hands them to a sink
#[derive(Debug)]
pub struct AttemptAuditor<S: AuditSink> {
    sink: S,
    last_timestamp: Option<DateTime<Utc>>,
}

impl<S: AuditSink> AttemptAuditor<S> {
    /// Create an auditor writing to `sink`
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            last_timestamp: None,
        }
    }

    /// Record an attempt now
    pub fn record(
        &mut self,
        subject: SubjectId,
        checks: FactorChecks,
        overall: bool,
        reason: Option<FailureReason>,
    ) -> AuthAttempt {
        self.submit(AttemptDraft::new(subject, checks, overall, reason))
    }

    /// Record a drafted attempt now
    pub fn submit(&mut self, draft: AttemptDraft) -> AuthAttempt {
        self.submit_at(draft, Utc::now())
    }

    /// Record a drafted attempt at `at`.
    ///
    /// Never fails. Timestamps are clamped so they never go backwards,
    /// success requires every listed factor to have passed, and a failure
    /// without a reason gets one. Sink errors are logged and dropped.
    pub fn submit_at(&mut self, draft: AttemptDraft, at: DateTime<Utc>) -> AuthAttempt {
        let timestamp = match self.last_timestamp {
            Some(last) if at < last => last,
            _ => at,
        };
        self.last_timestamp = Some(timestamp);

        let success = draft.overall && draft.checks.all_passed();
        if draft.overall && !success {
            warn!(subject = %draft.subject, "Attempt reported as success with unpassed factors, recording failure");
        }

        let reason = if success {
            None
        } else {
            Some(draft.reason.unwrap_or_else(|| match draft.checks.first_failed() {
                Some(FactorKind::Rfid) => FailureReason::RfidRejected,
                Some(FactorKind::Pin | FactorKind::Pattern) => FailureReason::FactorMismatch,
                None => FailureReason::CaptureCancelled,
            }))
        };

        let attempt = AuthAttempt {
            id: Uuid::new_v4(),
            timestamp,
            subject: draft.subject,
            area: draft.area,
            checks: draft.checks,
            success,
            reason,
            detail: draft.detail,
        };

        if let Err(e) = self.sink.append(&attempt) {
            error!(id = %attempt.id, "Failed to persist audit record: {}", e);
        }

        match attempt.reason {
            None => info!(subject = %attempt.subject, id = %attempt.id, "Access attempt succeeded"),
            Some(reason) => info!(
                subject = %attempt.subject,
                id = %attempt.id,
                %reason,
                "Access attempt failed"
            ),
        }

        attempt
    }

    /// Borrow the sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Take the sink back
    pub fn into_inner(self) -> S {
        self.sink
    }
}
