//! Access use cases
//!
//! Enrollment of area PINs and student patterns, and the access attempt
//! itself. An attempt checks, in order, that the area exists and is open,
//! that the student holds a valid permission, then the area's required
//! factors: RFID card, area PIN, personal pattern. The first failure ends
//! the attempt. Every call to [`AccessService::request_access`] produces
//! exactly one audit record, including when the sensor fails.

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use handgate_core::audit::AttemptDraft;
use handgate_core::{
    verify, AreaId, AttemptAuditor, AuditSink, AuthAttempt, FactorAttempt, FactorChecks,
    FactorKind, FailureReason, GestureKind, GestureSequence, LedStatus, SubjectId,
};

use crate::capture::{CaptureOutcome, CaptureSession, SessionMode};
use crate::clock::Clock;
use crate::config::StationConfig;
use crate::error::{Result, StationError};
use crate::led::{BestEffortLed, LedReflector};
use crate::registry::{AccessGrant, AccessRegistry, PatternCredential, PinCredential, RfidVerdict};
use crate::sensor::FingerStateSource;

/// Someone asking to enter an area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub subject: SubjectId,
    pub area: AreaId,
    /// Serial read from the presented card, if any
    pub rfid_serial: Option<String>,
}

/// Result of an access attempt
#[derive(Debug, Clone)]
pub struct AccessDecision {
    pub attempt: AuthAttempt,
    /// Entry recorded when access was granted
    pub grant: Option<AccessGrant>,
}

impl AccessDecision {
    pub fn granted(&self) -> bool {
        self.attempt.success()
    }

    pub fn reason(&self) -> Option<FailureReason> {
        self.attempt.reason()
    }
}

enum FactorResult {
    Passed,
    Denied(FailureReason, String),
}

/// Enrollment and access against one registry
pub struct AccessService<S: AuditSink> {
    config: StationConfig,
    registry: AccessRegistry,
    auditor: AttemptAuditor<S>,
    clock: Arc<dyn Clock>,
}

impl<S: AuditSink> AccessService<S> {
    pub fn new(
        config: StationConfig,
        registry: AccessRegistry,
        sink: S,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            registry,
            auditor: AttemptAuditor::new(sink),
            clock,
        }
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn registry(&self) -> &AccessRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut AccessRegistry {
        &mut self.registry
    }

    /// Audit sink
    pub fn audit(&self) -> &S {
        self.auditor.sink()
    }

    /// Take the registry and audit sink back
    pub fn into_parts(self) -> (AccessRegistry, S) {
        (self.registry, self.auditor.into_inner())
    }

    /// Capture and store a new PIN for `area`, replacing the old one
    pub async fn enroll_pin<Src, L>(
        &mut self,
        area: &AreaId,
        source: &mut Src,
        leds: &mut BestEffortLed<L>,
    ) -> Result<PinCredential>
    where
        Src: FingerStateSource + ?Sized,
        L: LedReflector,
    {
        self.registry.area(area)?;
        let owner = PinCredential::owner_for(area)?;
        let (sequence, _) = self
            .enroll(GestureKind::Pin, owner, source, leds)
            .await?;

        let pin = PinCredential::new(area.clone(), sequence, Utc::now())?;
        self.registry.set_pin(pin.clone())?;
        info!(%area, "Area PIN enrolled");
        leds.signal(LedStatus::Success, self.config.feedback_hold()).await;
        Ok(pin)
    }

    /// Capture and store a new pattern for `subject`, replacing the old one
    pub async fn enroll_pattern<Src, L>(
        &mut self,
        subject: &SubjectId,
        source: &mut Src,
        leds: &mut BestEffortLed<L>,
    ) -> Result<PatternCredential>
    where
        Src: FingerStateSource + ?Sized,
        L: LedReflector,
    {
        self.registry.student(subject)?;
        let (sequence, intervals) = self
            .enroll(GestureKind::Pattern, subject.clone(), source, leds)
            .await?;

        let intervals_secs = intervals.iter().map(|d| d.as_secs_f64()).collect();
        let pattern = PatternCredential::new(sequence, Utc::now(), intervals_secs)?;
        self.registry.set_pattern(pattern.clone())?;
        info!(%subject, "Pattern enrolled");
        leds.signal(LedStatus::Success, self.config.feedback_hold()).await;
        Ok(pattern)
    }

    async fn enroll<Src, L>(
        &self,
        kind: GestureKind,
        owner: SubjectId,
        source: &mut Src,
        leds: &mut BestEffortLed<L>,
    ) -> Result<(GestureSequence, Vec<std::time::Duration>)>
    where
        Src: FingerStateSource + ?Sized,
        L: LedReflector,
    {
        let session =
            CaptureSession::new(kind, owner, SessionMode::Enroll, &self.config, self.clock.clone());
        let detail = match session.run(source, leds).await? {
            CaptureOutcome::Complete {
                sequence,
                intervals,
            } => return Ok((sequence, intervals)),
            CaptureOutcome::TimedOut => format!("{} capture timed out", kind),
            CaptureOutcome::Cancelled { captured } => format!(
                "{} capture cancelled after {} of {} gestures",
                kind,
                captured,
                kind.required_len()
            ),
        };
        leds.signal(LedStatus::Failure, self.config.feedback_hold()).await;
        Err(StationError::EnrollmentIncomplete(detail))
    }

    /// Run one access attempt at local time `now`.
    ///
    /// A denial is an `Ok` decision. An error is returned only when the
    /// sensor fails mid-attempt, after the attempt has been audited.
    pub async fn request_access<Src, L>(
        &mut self,
        request: &AccessRequest,
        source: &mut Src,
        leds: &mut BestEffortLed<L>,
        now: NaiveDateTime,
    ) -> Result<AccessDecision>
    where
        Src: FingerStateSource + ?Sized,
        L: LedReflector,
    {
        info!(subject = %request.subject, area = %request.area, "Access requested");

        let area = match self.registry.area(&request.area) {
            Ok(area) => area.clone(),
            Err(e) => {
                let attempt = self
                    .conclude(
                        request,
                        FactorChecks::new(),
                        Some(FailureReason::UnknownArea),
                        e.to_string(),
                        leds,
                    )
                    .await;
                return Ok(AccessDecision {
                    attempt,
                    grant: None,
                });
            }
        };
        let mut checks = FactorChecks::required(area.required_factors.iter().copied());

        let gate = if !area.is_open_at(now.time()) {
            Some((
                FailureReason::OutsideSchedule,
                format!(
                    "{} is open {}-{}, attempted at {}",
                    area.id,
                    area.opens_at,
                    area.closes_at,
                    now.time()
                ),
            ))
        } else {
            self.permission_gate(request, now)
        };
        if let Some((reason, detail)) = gate {
            let attempt = self.conclude(request, checks, Some(reason), detail, leds).await;
            return Ok(AccessDecision {
                attempt,
                grant: None,
            });
        }

        for factor in area.required_factors.iter().copied() {
            let mut attempt = FactorAttempt::new(factor);
            let result = match factor {
                FactorKind::Rfid => self.check_rfid(request, now, &mut attempt),
                FactorKind::Pin => self.check_pin(request, now, &mut attempt, source, leds).await,
                FactorKind::Pattern => self.check_pattern(request, &mut attempt, source, leds).await,
            };

            match result {
                Ok(FactorResult::Passed) => {
                    debug!(%factor, "Factor passed");
                    checks.record(factor, true);
                }
                Ok(FactorResult::Denied(reason, detail)) => {
                    checks.record(factor, false);
                    let attempt = self.conclude(request, checks, Some(reason), detail, leds).await;
                    return Ok(AccessDecision {
                        attempt,
                        grant: None,
                    });
                }
                Err(e) => {
                    let reason = match &e {
                        StationError::SensorUnavailable(_) => Some(FailureReason::SensorUnavailable),
                        _ => None,
                    };
                    self.conclude(request, checks, reason, e.to_string(), leds).await;
                    return Err(e);
                }
            }
        }

        let draft = AttemptDraft::new(request.subject.clone(), checks, true, None)
            .in_area(request.area.clone());
        let attempt = self.auditor.submit(draft);
        leds.signal(LedStatus::Success, self.config.feedback_hold()).await;

        let grant = attempt.success().then(|| AccessGrant {
            id: Uuid::new_v4(),
            subject: request.subject.clone(),
            area: request.area.clone(),
            entered_at: now,
            attempt_id: attempt.id(),
        });
        if let Some(grant) = &grant {
            info!(subject = %grant.subject, area = %grant.area, "Access granted");
            self.registry.record_grant(grant.clone());
        }
        Ok(AccessDecision { attempt, grant })
    }

    fn permission_gate(
        &self,
        request: &AccessRequest,
        now: NaiveDateTime,
    ) -> Option<(FailureReason, String)> {
        let detail = match self.registry.student(&request.subject) {
            Err(e) => e.to_string(),
            Ok(student) if !student.active => format!("student {} is inactive", student.id),
            Ok(_) if !self
                .registry
                .is_permitted(&request.subject, &request.area, now.date()) =>
            {
                format!(
                    "no valid permission for {} in {}",
                    request.subject, request.area
                )
            }
            Ok(_) => return None,
        };
        Some((FailureReason::NoPermission, detail))
    }

    fn check_rfid(
        &mut self,
        request: &AccessRequest,
        now: NaiveDateTime,
        attempt: &mut FactorAttempt,
    ) -> Result<FactorResult> {
        let Some(serial) = request.rfid_serial.as_deref() else {
            attempt.verdict(false)?;
            return Ok(FactorResult::Denied(
                FailureReason::RfidUnknown,
                "no card presented".into(),
            ));
        };
        let max_failures = self.config.max_rfid_failures;
        let card = match self.registry.rfid_mut(serial) {
            Ok(card) => card,
            Err(e) => {
                attempt.verdict(false)?;
                return Ok(FactorResult::Denied(FailureReason::RfidUnknown, e.to_string()));
            }
        };

        match card.present(&request.subject, now, max_failures) {
            RfidVerdict::Accepted => {
                attempt.verdict(true)?;
                Ok(FactorResult::Passed)
            }
            RfidVerdict::Rejected(detail) => {
                attempt.verdict(false)?;
                Ok(FactorResult::Denied(
                    FailureReason::RfidRejected,
                    format!("{}: {}", serial, detail),
                ))
            }
        }
    }

    async fn check_pin<Src, L>(
        &mut self,
        request: &AccessRequest,
        now: NaiveDateTime,
        attempt: &mut FactorAttempt,
        source: &mut Src,
        leds: &mut BestEffortLed<L>,
    ) -> Result<FactorResult>
    where
        Src: FingerStateSource + ?Sized,
        L: LedReflector,
    {
        let enrolled = match self.registry.pin(&request.area) {
            None => {
                attempt.abort()?;
                return Ok(FactorResult::Denied(
                    FailureReason::FactorNotEnrolled,
                    format!("no PIN enrolled for {}", request.area),
                ));
            }
            Some(pin) if pin.lockout.is_locked_at(now) => {
                attempt.abort()?;
                let until = pin.lockout.locked_until.unwrap_or(now);
                return Ok(FactorResult::Denied(
                    FailureReason::FactorLocked,
                    format!("PIN for {} locked until {}", request.area, until),
                ));
            }
            Some(pin) => pin.sequence.clone(),
        };

        let owner = PinCredential::owner_for(&request.area)?;
        let result = self
            .capture_and_verify(GestureKind::Pin, owner, &enrolled, None, attempt, source, leds)
            .await?;

        let policy = self.config.pin_lockout();
        if let Some(pin) = self.registry.pin_mut(&request.area) {
            match &result {
                FactorResult::Passed => pin.lockout.record_success(),
                FactorResult::Denied(FailureReason::FactorMismatch, _) => {
                    pin.lockout.record_failure(&policy, now);
                }
                FactorResult::Denied(..) => {}
            }
        }
        Ok(result)
    }

    async fn check_pattern<Src, L>(
        &mut self,
        request: &AccessRequest,
        attempt: &mut FactorAttempt,
        source: &mut Src,
        leds: &mut BestEffortLed<L>,
    ) -> Result<FactorResult>
    where
        Src: FingerStateSource + ?Sized,
        L: LedReflector,
    {
        let Some(enrolled) = self.registry.pattern(&request.subject).cloned() else {
            attempt.abort()?;
            return Ok(FactorResult::Denied(
                FailureReason::FactorNotEnrolled,
                format!("no pattern enrolled for {}", request.subject),
            ));
        };

        let rhythm = self
            .config
            .pattern_timing_tolerance
            .map(|tolerance| (&enrolled, tolerance));
        self.capture_and_verify(
            GestureKind::Pattern,
            request.subject.clone(),
            &enrolled.sequence,
            rhythm,
            attempt,
            source,
            leds,
        )
        .await
    }

    async fn capture_and_verify<Src, L>(
        &self,
        kind: GestureKind,
        owner: SubjectId,
        enrolled: &GestureSequence,
        rhythm: Option<(&PatternCredential, f64)>,
        attempt: &mut FactorAttempt,
        source: &mut Src,
        leds: &mut BestEffortLed<L>,
    ) -> Result<FactorResult>
    where
        Src: FingerStateSource + ?Sized,
        L: LedReflector,
    {
        attempt.begin_capture()?;
        let session =
            CaptureSession::new(kind, owner, SessionMode::Verify, &self.config, self.clock.clone());
        let outcome = match session.run(source, leds).await {
            Ok(outcome) => outcome,
            Err(e) => {
                attempt.abort()?;
                return Err(e);
            }
        };

        let result = match outcome {
            CaptureOutcome::Complete {
                sequence,
                intervals,
            } => {
                attempt.capture_complete()?;
                if !verify(&sequence, enrolled)? {
                    attempt.verdict(false)?;
                    FactorResult::Denied(
                        FailureReason::FactorMismatch,
                        format!("{} does not match", kind),
                    )
                } else if let Some((pattern, tolerance)) =
                    rhythm.filter(|(p, t)| !p.timing_matches(&intervals, *t))
                {
                    attempt.verdict(false)?;
                    debug!(?intervals, enrolled = ?pattern.intervals_secs, "Pattern rhythm differs");
                    FactorResult::Denied(
                        FailureReason::TimingMismatch,
                        format!(
                            "{} gaps outside {:.0}% of enrollment",
                            kind,
                            tolerance * 100.0
                        ),
                    )
                } else {
                    attempt.verdict(true)?;
                    FactorResult::Passed
                }
            }
            CaptureOutcome::TimedOut => {
                attempt.capture_timed_out()?;
                FactorResult::Denied(
                    FailureReason::SessionTimeout,
                    format!("{} capture timed out", kind),
                )
            }
            CaptureOutcome::Cancelled { captured } => {
                attempt.abort()?;
                FactorResult::Denied(
                    FailureReason::CaptureCancelled,
                    format!("{} capture cancelled after {} gestures", kind, captured),
                )
            }
        };
        Ok(result)
    }

    async fn conclude<L: LedReflector>(
        &mut self,
        request: &AccessRequest,
        checks: FactorChecks,
        reason: Option<FailureReason>,
        detail: String,
        leds: &mut BestEffortLed<L>,
    ) -> AuthAttempt {
        let draft = AttemptDraft::new(request.subject.clone(), checks, false, reason)
            .in_area(request.area.clone())
            .with_detail(detail);
        let attempt = self.auditor.submit(draft);
        leds.signal(LedStatus::Failure, self.config.feedback_hold()).await;
        attempt
    }
}
