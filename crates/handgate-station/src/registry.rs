//! Access registry
//!
//! Students, areas, permissions and the three kinds of credentials, plus
//! the log of granted entries. The registry is plain data; persistence
//! lives in [`crate::storage`].

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use handgate_core::{AreaId, FactorKind, GestureKind, GestureSequence, SubjectId};

use crate::error::{Result, StationError};
use crate::lockout::LockoutState;
use crate::validation::{validate_banner_id, validate_email, validate_name, validate_national_id};

/// A registered student
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// National id (cédula)
    pub id: SubjectId,
    pub first_names: String,
    pub last_names: String,
    /// Institutional email
    pub email: String,
    /// Institutional id, `A` followed by 8 digits
    pub banner_id: String,
    pub career: String,
    #[serde(default = "active")]
    pub active: bool,
}

fn active() -> bool {
    true
}

impl Student {
    /// Build a student from raw input, validating every field
    pub fn new(
        national_id: &str,
        first_names: &str,
        last_names: &str,
        email: &str,
        banner_id: &str,
        career: &str,
    ) -> Result<Self> {
        let career = career.trim();
        if career.is_empty() {
            return Err(StationError::Validation("career cannot be empty".into()));
        }
        Ok(Self {
            id: SubjectId::new(validate_national_id(national_id)?)?,
            first_names: validate_name(first_names)?,
            last_names: validate_name(last_names)?,
            email: validate_email(email)?,
            banner_id: validate_banner_id(banner_id)?,
            career: career.to_string(),
            active: true,
        })
    }

    /// "First Last"
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_names, self.last_names)
    }
}

/// Kind of controlled area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaKind {
    Laboratory,
    Storage,
    Sensitive,
}

impl std::str::FromStr for AreaKind {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "laboratory" | "lab" => Ok(AreaKind::Laboratory),
            "storage" => Ok(AreaKind::Storage),
            "sensitive" => Ok(AreaKind::Sensitive),
            _ => Err(StationError::Validation(format!("unknown area kind {:?}", s))),
        }
    }
}

/// A controlled area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub id: AreaId,
    pub name: String,
    pub kind: AreaKind,
    pub location: String,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    /// Factors checked for this area, always in RFID, PIN, pattern order
    #[serde(default = "all_factors")]
    pub required_factors: Vec<FactorKind>,
}

fn all_factors() -> Vec<FactorKind> {
    FactorKind::ALL.to_vec()
}

impl Area {
    /// Build an area requiring all three factors
    pub fn new(
        id: &str,
        name: &str,
        kind: AreaKind,
        location: &str,
        opens_at: NaiveTime,
        closes_at: NaiveTime,
    ) -> Result<Self> {
        if opens_at > closes_at {
            return Err(StationError::Validation(format!(
                "area opens at {} but closes at {}",
                opens_at, closes_at
            )));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(StationError::Validation("area name cannot be empty".into()));
        }
        Ok(Self {
            id: AreaId::new(id)?,
            name: name.to_string(),
            kind,
            location: location.trim().to_string(),
            opens_at,
            closes_at,
            required_factors: all_factors(),
        })
    }

    /// Restrict the factors checked for this area
    pub fn with_factors(mut self, factors: impl IntoIterator<Item = FactorKind>) -> Result<Self> {
        let mut factors: Vec<FactorKind> = factors.into_iter().collect();
        factors.sort();
        factors.dedup();
        if factors.is_empty() {
            return Err(StationError::Validation(format!(
                "area {} must require at least one factor",
                self.id
            )));
        }
        self.required_factors = factors;
        Ok(self)
    }

    /// Whether `time` falls within opening hours (inclusive)
    pub fn is_open_at(&self, time: NaiveTime) -> bool {
        self.opens_at <= time && time <= self.closes_at
    }

    /// Whether this area checks `factor`
    pub fn requires(&self, factor: FactorKind) -> bool {
        self.required_factors.contains(&factor)
    }
}

/// State of a permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Active,
    Suspended,
    Expired,
}

/// Permission for a student to enter an area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub subject: SubjectId,
    pub area: AreaId,
    pub status: PermissionStatus,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
}

impl Permission {
    /// Whether the permission allows entry on `date`
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.status == PermissionStatus::Active
            && self.valid_from.map_or(true, |from| from <= date)
            && self.valid_until.map_or(true, |until| date <= until)
    }
}

/// State of an RFID card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    Blocked,
    Lost,
    Expired,
}

/// Result of presenting an RFID card
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RfidVerdict {
    Accepted,
    Rejected(String),
}

/// An RFID card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfidCredential {
    pub serial: String,
    pub owner: SubjectId,
    pub issued_on: NaiveDate,
    pub expires_on: NaiveDate,
    pub status: CredentialStatus,
    pub failed_attempts: u32,
    pub successful_attempts: u32,
    pub last_access: Option<NaiveDateTime>,
}

impl RfidCredential {
    /// A new active card
    pub fn new(serial: &str, owner: SubjectId, issued_on: NaiveDate, expires_on: NaiveDate) -> Result<Self> {
        let serial = serial.trim();
        if serial.is_empty() {
            return Err(StationError::Validation("RFID serial cannot be empty".into()));
        }
        if expires_on < issued_on {
            return Err(StationError::Validation(format!(
                "RFID {} expires before it is issued",
                serial
            )));
        }
        Ok(Self {
            serial: serial.to_string(),
            owner,
            issued_on,
            expires_on,
            status: CredentialStatus::Active,
            failed_attempts: 0,
            successful_attempts: 0,
            last_access: None,
        })
    }

    /// Whether `date` is within the card's validity
    pub fn is_current(&self, date: NaiveDate) -> bool {
        self.issued_on <= date && date <= self.expires_on
    }

    /// Check the card presented by `holder` at `now`, updating counters.
    ///
    /// Owner mismatches and out-of-validity reads count as failures; at
    /// `max_failures` the card is blocked. A card read after its expiry
    /// date is marked expired.
    pub fn present(&mut self, holder: &SubjectId, now: NaiveDateTime, max_failures: u32) -> RfidVerdict {
        let reason = match self.status {
            CredentialStatus::Active => None,
            CredentialStatus::Blocked => Some("card is blocked"),
            CredentialStatus::Lost => Some("card was reported lost"),
            CredentialStatus::Expired => Some("card has expired"),
        };
        if let Some(reason) = reason {
            return RfidVerdict::Rejected(reason.to_string());
        }

        let today = now.date();
        let rejection = if &self.owner != holder {
            "card belongs to another student"
        } else if !self.is_current(today) {
            if today > self.expires_on {
                self.status = CredentialStatus::Expired;
            }
            "card is outside its validity period"
        } else {
            self.successful_attempts = self.successful_attempts.saturating_add(1);
            self.failed_attempts = 0;
            self.last_access = Some(now);
            return RfidVerdict::Accepted;
        };

        self.failed_attempts = self.failed_attempts.saturating_add(1);
        if self.failed_attempts >= max_failures {
            warn!(serial = %self.serial, failures = self.failed_attempts, "RFID card blocked");
            self.status = CredentialStatus::Blocked;
        }
        RfidVerdict::Rejected(rejection.to_string())
    }
}

/// The PIN of an area, shared by everyone allowed in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinCredential {
    pub id: String,
    pub area: AreaId,
    pub sequence: GestureSequence,
    #[serde(default)]
    pub lockout: LockoutState,
    pub enrolled_at: DateTime<Utc>,
}

impl PinCredential {
    /// Owner recorded on area PIN sequences
    pub fn owner_for(area: &AreaId) -> Result<SubjectId> {
        Ok(SubjectId::new(format!("area:{}", area))?)
    }

    pub fn new(area: AreaId, sequence: GestureSequence, enrolled_at: DateTime<Utc>) -> Result<Self> {
        if sequence.kind() != GestureKind::Pin {
            return Err(StationError::Validation(format!(
                "area PIN must be a PIN sequence, got {}",
                sequence.kind()
            )));
        }
        Ok(Self {
            id: format!("PIN-{}", area),
            area,
            sequence,
            lockout: LockoutState::default(),
            enrolled_at,
        })
    }
}

/// A student's gesture pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternCredential {
    pub id: String,
    pub owner: SubjectId,
    pub sequence: GestureSequence,
    pub captured_at: DateTime<Utc>,
    /// Seconds between consecutive gestures during enrollment
    #[serde(default)]
    pub intervals_secs: Vec<f64>,
}

impl PatternCredential {
    pub fn new(
        sequence: GestureSequence,
        captured_at: DateTime<Utc>,
        intervals_secs: Vec<f64>,
    ) -> Result<Self> {
        if sequence.kind() != GestureKind::Pattern {
            return Err(StationError::Validation(format!(
                "pattern credential must be a pattern sequence, got {}",
                sequence.kind()
            )));
        }
        Ok(Self {
            id: format!("PAT-{}", sequence.owner()),
            owner: sequence.owner().clone(),
            sequence,
            captured_at,
            intervals_secs,
        })
    }

    /// Whether `intervals` keep the enrolled rhythm: every gap within
    /// `tolerance` (relative) of the enrolled gap.
    ///
    /// Patterns enrolled without timing, or with a different number of
    /// gaps, always match. Zero-length enrolled gaps are not checked.
    pub fn timing_matches(&self, intervals: &[Duration], tolerance: f64) -> bool {
        if self.intervals_secs.is_empty() || self.intervals_secs.len() != intervals.len() {
            return true;
        }
        self.intervals_secs
            .iter()
            .zip(intervals)
            .filter(|(enrolled, _)| **enrolled > 0.0)
            .all(|(enrolled, got)| {
                let got = got.as_secs_f64();
                got >= enrolled * (1.0 - tolerance) && got <= enrolled * (1.0 + tolerance)
            })
    }
}

/// A granted entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub id: Uuid,
    pub subject: SubjectId,
    pub area: AreaId,
    pub entered_at: NaiveDateTime,
    /// Audit record that granted the entry
    pub attempt_id: Uuid,
}

/// Everything the station knows about people, places and credentials
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessRegistry {
    students: BTreeMap<SubjectId, Student>,
    areas: BTreeMap<AreaId, Area>,
    permissions: Vec<Permission>,
    rfid: BTreeMap<String, RfidCredential>,
    pins: BTreeMap<AreaId, PinCredential>,
    patterns: BTreeMap<SubjectId, PatternCredential>,
    grants: Vec<AccessGrant>,
}

impl AccessRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a student
    pub fn add_student(&mut self, student: Student) -> Result<()> {
        if self.students.contains_key(&student.id) {
            return Err(StationError::AlreadyExists(format!("student {}", student.id)));
        }
        info!(student = %student.id, "Student registered");
        self.students.insert(student.id.clone(), student);
        Ok(())
    }

    /// Get a student by national id
    pub fn student(&self, id: &SubjectId) -> Result<&Student> {
        self.students
            .get(id)
            .ok_or_else(|| StationError::StudentNotFound(id.to_string()))
    }

    /// All students
    pub fn students(&self) -> impl Iterator<Item = &Student> {
        self.students.values()
    }

    /// Register an area
    pub fn add_area(&mut self, area: Area) -> Result<()> {
        if self.areas.contains_key(&area.id) {
            return Err(StationError::AlreadyExists(format!("area {}", area.id)));
        }
        info!(area = %area.id, "Area registered");
        self.areas.insert(area.id.clone(), area);
        Ok(())
    }

    /// Get an area by id
    pub fn area(&self, id: &AreaId) -> Result<&Area> {
        self.areas
            .get(id)
            .ok_or_else(|| StationError::AreaNotFound(id.to_string()))
    }

    /// All areas
    pub fn areas(&self) -> impl Iterator<Item = &Area> {
        self.areas.values()
    }

    /// Grant a student permission to enter an area
    pub fn add_permission(&mut self, permission: Permission) -> Result<()> {
        self.student(&permission.subject)?;
        self.area(&permission.area)?;
        if self.permissions.iter().any(|p| p.id == permission.id) {
            return Err(StationError::AlreadyExists(format!("permission {}", permission.id)));
        }
        if let (Some(from), Some(until)) = (permission.valid_from, permission.valid_until) {
            if until < from {
                return Err(StationError::Validation(format!(
                    "permission {} ends before it starts",
                    permission.id
                )));
            }
        }
        info!(permission = %permission.id, subject = %permission.subject, area = %permission.area, "Permission granted");
        self.permissions.push(permission);
        Ok(())
    }

    /// Permissions of a student for an area
    pub fn permissions_for<'a>(
        &'a self,
        subject: &'a SubjectId,
        area: &'a AreaId,
    ) -> impl Iterator<Item = &'a Permission> + 'a {
        self.permissions
            .iter()
            .filter(move |p| &p.subject == subject && &p.area == area)
    }

    /// All permissions
    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Whether the student may enter the area on `date`
    pub fn is_permitted(&self, subject: &SubjectId, area: &AreaId, date: NaiveDate) -> bool {
        self.permissions_for(subject, area).any(|p| p.is_valid_on(date))
    }

    /// Issue an RFID card to a registered student
    pub fn issue_rfid(&mut self, card: RfidCredential) -> Result<()> {
        self.student(&card.owner)?;
        if self.rfid.contains_key(&card.serial) {
            return Err(StationError::AlreadyExists(format!("RFID {}", card.serial)));
        }
        info!(serial = %card.serial, owner = %card.owner, "RFID card issued");
        self.rfid.insert(card.serial.clone(), card);
        Ok(())
    }

    /// Get an RFID card by serial
    pub fn rfid(&self, serial: &str) -> Result<&RfidCredential> {
        self.rfid
            .get(serial)
            .ok_or_else(|| StationError::RfidNotFound(serial.to_string()))
    }

    /// Get an RFID card for update
    pub fn rfid_mut(&mut self, serial: &str) -> Result<&mut RfidCredential> {
        self.rfid
            .get_mut(serial)
            .ok_or_else(|| StationError::RfidNotFound(serial.to_string()))
    }

    /// All RFID cards
    pub fn rfid_cards(&self) -> impl Iterator<Item = &RfidCredential> {
        self.rfid.values()
    }

    /// Store an area PIN, replacing any previous one
    pub fn set_pin(&mut self, pin: PinCredential) -> Result<()> {
        self.area(&pin.area)?;
        if self.pins.insert(pin.area.clone(), pin).is_some() {
            info!("Area PIN replaced");
        }
        Ok(())
    }

    /// PIN of an area, if enrolled
    pub fn pin(&self, area: &AreaId) -> Option<&PinCredential> {
        self.pins.get(area)
    }

    /// PIN of an area for update
    pub fn pin_mut(&mut self, area: &AreaId) -> Option<&mut PinCredential> {
        self.pins.get_mut(area)
    }

    /// Store a student's pattern, replacing any previous one
    pub fn set_pattern(&mut self, pattern: PatternCredential) -> Result<()> {
        self.student(&pattern.owner)?;
        if self.patterns.insert(pattern.owner.clone(), pattern).is_some() {
            info!("Pattern replaced");
        }
        Ok(())
    }

    /// Pattern of a student, if enrolled
    pub fn pattern(&self, subject: &SubjectId) -> Option<&PatternCredential> {
        self.patterns.get(subject)
    }

    /// Append a granted entry
    pub fn record_grant(&mut self, grant: AccessGrant) {
        self.grants.push(grant);
    }

    /// All granted entries, oldest first
    pub fn grants(&self) -> &[AccessGrant] {
        &self.grants
    }

    /// Insert the demo records that are not already present.
    ///
    /// The demo student's national id does not pass the check digit, so
    /// these records are inserted without field validation.
    pub fn seed(&mut self, today: NaiveDate, now: DateTime<Utc>) -> Result<()> {
        let subject = SubjectId::new("0102030405")?;
        let area_id = AreaId::new("LAB-101")?;
        let next_year = today.checked_add_months(Months::new(12)).unwrap_or(NaiveDate::MAX);
        let last_year = today.checked_sub_months(Months::new(12)).unwrap_or(NaiveDate::MIN);

        self.students.entry(subject.clone()).or_insert_with(|| Student {
            id: subject.clone(),
            first_names: "Estud Nombre1".into(),
            last_names: "Estud Apellido1".into(),
            email: "stud1@udla.edu.ec".into(),
            banner_id: "A00000001".into(),
            career: "Ciberseguridad".into(),
            active: true,
        });

        if !self.areas.contains_key(&area_id) {
            let opens = NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN);
            let closes = NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN);
            self.add_area(Area::new(
                area_id.as_str(),
                "Laboratorio Redes",
                AreaKind::Laboratory,
                "Bloque A",
                opens,
                closes,
            )?)?;
        }

        if !self.permissions.iter().any(|p| p.id == "PERM-001") {
            self.add_permission(Permission {
                id: "PERM-001".into(),
                subject: subject.clone(),
                area: area_id.clone(),
                status: PermissionStatus::Active,
                valid_from: Some(today),
                valid_until: Some(next_year),
            })?;
        }

        if !self.rfid.contains_key("RFID-12345") {
            self.issue_rfid(RfidCredential::new("RFID-12345", subject.clone(), last_year, next_year)?)?;
        }

        if !self.pins.contains_key(&area_id) {
            let sequence = GestureSequence::from_masks(
                GestureKind::Pin,
                PinCredential::owner_for(&area_id)?,
                &[1, 3, 7, 15],
            )?;
            let mut pin = PinCredential::new(area_id.clone(), sequence, now)?;
            pin.id = "PIN-001".into();
            self.set_pin(pin)?;
        }

        if !self.patterns.contains_key(&subject) {
            let sequence = GestureSequence::from_masks(
                GestureKind::Pattern,
                subject.clone(),
                &[1, 1, 2, 3, 5, 8, 13, 21, 3, 1],
            )?;
            let mut pattern = PatternCredential::new(sequence, now, Vec::new())?;
            pattern.id = "PAT-001".into();
            self.set_pattern(pattern)?;
        }

        info!("Demo records seeded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(date: NaiveDate, h: u32) -> NaiveDateTime {
        date.and_hms_opt(h, 0, 0).unwrap()
    }

    fn seeded() -> AccessRegistry {
        let mut registry = AccessRegistry::new();
        registry.seed(date(2026, 3, 2), Utc::now()).unwrap();
        registry
    }

    fn subject(id: &str) -> SubjectId {
        SubjectId::new(id).unwrap()
    }

    #[test]
    fn test_seed_is_idempotent() {
        let mut registry = seeded();
        let before = registry.clone();
        registry.seed(date(2026, 3, 2), Utc::now()).unwrap();
        assert_eq!(registry.students().count(), 1);
        assert_eq!(registry.permissions().len(), 1);
        assert_eq!(registry.rfid_cards().count(), 1);
        assert_eq!(registry.pin(&AreaId::new("LAB-101").unwrap()), before.pin(&AreaId::new("LAB-101").unwrap()));
    }

    #[test]
    fn test_seed_contents() {
        let registry = seeded();
        let lab = AreaId::new("LAB-101").unwrap();
        let student = subject("0102030405");

        assert_eq!(registry.area(&lab).unwrap().name, "Laboratorio Redes");
        assert!(registry.is_permitted(&student, &lab, date(2026, 3, 2)));
        assert!(registry.is_permitted(&student, &lab, date(2027, 3, 2)));
        assert!(!registry.is_permitted(&student, &lab, date(2027, 3, 3)));
        assert_eq!(registry.pin(&lab).unwrap().sequence.masks(), vec![1, 3, 7, 15]);
        assert_eq!(registry.pattern(&student).unwrap().id, "PAT-001");
        assert_eq!(registry.rfid("RFID-12345").unwrap().issued_on, date(2025, 3, 2));
    }

    #[test]
    fn test_duplicates_and_missing_records() {
        let mut registry = seeded();
        let student =
            Student::new("1710034065", "Ana", "Pérez", "ana@udla.edu.ec", "A00012345", "Software")
                .unwrap();
        registry.add_student(student.clone()).unwrap();
        assert!(matches!(
            registry.add_student(student),
            Err(StationError::AlreadyExists(_))
        ));
        assert!(matches!(
            registry.student(&subject("0999999999")),
            Err(StationError::StudentNotFound(_))
        ));
        assert!(matches!(
            registry.rfid("RFID-0"),
            Err(StationError::RfidNotFound(_))
        ));

        let orphan = RfidCredential::new(
            "RFID-9",
            subject("0999999999"),
            date(2026, 1, 1),
            date(2027, 1, 1),
        )
        .unwrap();
        assert!(matches!(
            registry.issue_rfid(orphan),
            Err(StationError::StudentNotFound(_))
        ));
    }

    #[test]
    fn test_area_schedule_is_inclusive() {
        let registry = seeded();
        let lab = registry.area(&AreaId::new("LAB-101").unwrap()).unwrap();
        assert!(lab.is_open_at(NaiveTime::from_hms_opt(7, 0, 0).unwrap()));
        assert!(lab.is_open_at(NaiveTime::from_hms_opt(20, 0, 0).unwrap()));
        assert!(!lab.is_open_at(NaiveTime::from_hms_opt(20, 0, 1).unwrap()));
        assert!(!lab.is_open_at(NaiveTime::from_hms_opt(6, 59, 59).unwrap()));
    }

    #[test]
    fn test_area_factors_are_ordered() {
        let area = Area::new(
            "BOD-1",
            "Bodega",
            AreaKind::Storage,
            "Bloque B",
            NaiveTime::MIN,
            NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
        )
        .unwrap()
        .with_factors([FactorKind::Pattern, FactorKind::Rfid, FactorKind::Pattern])
        .unwrap();
        assert_eq!(area.required_factors, vec![FactorKind::Rfid, FactorKind::Pattern]);
        assert!(!area.requires(FactorKind::Pin));
    }

    #[test]
    fn test_rfid_success_resets_failures() {
        let mut card =
            RfidCredential::new("RFID-1", subject("0102030405"), date(2026, 1, 1), date(2027, 1, 1))
                .unwrap();
        card.failed_attempts = 2;
        let now = at(date(2026, 3, 2), 9);
        assert_eq!(card.present(&subject("0102030405"), now, 3), RfidVerdict::Accepted);
        assert_eq!(card.failed_attempts, 0);
        assert_eq!(card.successful_attempts, 1);
        assert_eq!(card.last_access, Some(now));
    }

    #[test]
    fn test_rfid_owner_mismatch_blocks_at_limit() {
        let mut card =
            RfidCredential::new("RFID-1", subject("0102030405"), date(2026, 1, 1), date(2027, 1, 1))
                .unwrap();
        let intruder = subject("1710034065");
        let now = at(date(2026, 3, 2), 9);
        for _ in 0..3 {
            assert!(matches!(card.present(&intruder, now, 3), RfidVerdict::Rejected(_)));
        }
        assert_eq!(card.status, CredentialStatus::Blocked);
        // The owner is rejected too once blocked
        assert!(matches!(
            card.present(&subject("0102030405"), now, 3),
            RfidVerdict::Rejected(_)
        ));
        assert_eq!(card.failed_attempts, 3);
    }

    #[test]
    fn test_rfid_past_expiry_is_marked_expired() {
        let mut card =
            RfidCredential::new("RFID-1", subject("0102030405"), date(2025, 1, 1), date(2026, 1, 1))
                .unwrap();
        let verdict = card.present(&subject("0102030405"), at(date(2026, 3, 2), 9), 3);
        assert!(matches!(verdict, RfidVerdict::Rejected(_)));
        assert_eq!(card.status, CredentialStatus::Expired);
        assert_eq!(card.failed_attempts, 1);
    }

    #[test]
    fn test_permission_window() {
        let permission = Permission {
            id: "P".into(),
            subject: subject("0102030405"),
            area: AreaId::new("LAB-101").unwrap(),
            status: PermissionStatus::Active,
            valid_from: Some(date(2026, 1, 1)),
            valid_until: None,
        };
        assert!(!permission.is_valid_on(date(2025, 12, 31)));
        assert!(permission.is_valid_on(date(2030, 1, 1)));

        let suspended = Permission {
            status: PermissionStatus::Suspended,
            ..permission
        };
        assert!(!suspended.is_valid_on(date(2026, 6, 1)));
    }

    #[test]
    fn test_pattern_timing_tolerance() {
        let mut pattern = seeded().pattern(&subject("0102030405")).unwrap().clone();
        let secs = |values: &[f64]| -> Vec<Duration> {
            values.iter().map(|v| Duration::from_secs_f64(*v)).collect()
        };

        // Enrolled without timing: anything goes
        assert!(pattern.timing_matches(&secs(&[5.0; 9]), 0.4));

        pattern.intervals_secs = vec![1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0];
        assert!(pattern.timing_matches(
            &secs(&[1.3, 0.7, 9.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.5]),
            0.4
        ));
        assert!(!pattern.timing_matches(
            &secs(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 3.0]),
            0.4
        ));
        assert!(!pattern.timing_matches(&secs(&[0.5; 9]), 0.4));
        // Different gap count is not compared
        assert!(pattern.timing_matches(&secs(&[0.5; 3]), 0.4));
    }

    #[test]
    fn test_registry_serializes() {
        let registry = seeded();
        let json = serde_json::to_string(&registry).unwrap();
        let back: AccessRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, registry);
    }
}
