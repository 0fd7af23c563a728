//! Handgate - Operator CLI for the gesture access station
//!
//! The landmark model runs outside this process; gesture commands read
//! its output from a JSON Lines frame file and replay it at the
//! configured frame interval.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use handgate_core::{AreaId, AuthAttempt, FactorKind, GestureCode, LedStatus, SubjectId};
use handgate_station::{
    open_reflector, AccessRequest, AccessService, Area, AreaKind, BestEffortLed, FileAuditLog,
    FingerExtractor, Permission, PermissionStatus, ReplaySource, RfidCredential, StationConfig,
    StationStorage, SteppingClock, Student,
};

/// Handgate - Multi-factor access with RFID, gesture PIN and gesture pattern
#[derive(Parser)]
#[command(name = "handgate")]
#[command(about = "Gesture-based multi-factor access station")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file (defaults to $HANDGATE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert the demo student, area, permission and credentials
    Seed,

    /// Register a student
    AddStudent {
        /// National id (cédula, 10 digits)
        #[arg(long)]
        id: String,

        #[arg(long)]
        first_names: String,

        #[arg(long)]
        last_names: String,

        /// Institutional email
        #[arg(long)]
        email: String,

        /// Banner id (A followed by 8 digits)
        #[arg(long)]
        banner: String,

        #[arg(long)]
        career: String,
    },

    /// Register an area
    AddArea {
        #[arg(long)]
        id: String,

        #[arg(long)]
        name: String,

        /// laboratory, storage or sensitive
        #[arg(long, default_value = "laboratory")]
        kind: AreaKind,

        #[arg(long, default_value = "")]
        location: String,

        /// Opening time (HH:MM)
        #[arg(long, value_parser = parse_time)]
        opens: NaiveTime,

        /// Closing time (HH:MM)
        #[arg(long, value_parser = parse_time)]
        closes: NaiveTime,

        /// Factors to require (default: rfid,pin,pattern)
        #[arg(long, value_delimiter = ',', value_parser = parse_factor)]
        factors: Vec<FactorKind>,
    },

    /// Allow a student into an area
    Grant {
        /// Permission id
        #[arg(long)]
        id: String,

        #[arg(long)]
        student: String,

        #[arg(long)]
        area: String,

        /// First valid day (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last valid day (YYYY-MM-DD)
        #[arg(long)]
        until: Option<NaiveDate>,
    },

    /// Issue an RFID card to a student
    IssueRfid {
        #[arg(long)]
        serial: String,

        #[arg(long)]
        student: String,

        /// Issue date (default: today)
        #[arg(long)]
        issued: Option<NaiveDate>,

        /// Expiry date (default: one year after issue)
        #[arg(long)]
        expires: Option<NaiveDate>,
    },

    /// Capture a new PIN for an area
    EnrollPin {
        #[arg(long)]
        area: String,

        /// Frame file (JSON Lines)
        #[arg(long)]
        frames: PathBuf,
    },

    /// Capture a new pattern for a student
    EnrollPattern {
        #[arg(long)]
        student: String,

        /// Frame file (JSON Lines)
        #[arg(long)]
        frames: PathBuf,
    },

    /// Attempt to enter an area
    Access {
        #[arg(long)]
        student: String,

        #[arg(long)]
        area: String,

        /// Serial of the presented RFID card
        #[arg(long)]
        rfid: Option<String>,

        /// Frame file (JSON Lines) with the PIN followed by the pattern
        #[arg(long)]
        frames: PathBuf,

        /// Local time of the attempt (default: now)
        #[arg(long, value_parser = parse_datetime)]
        at: Option<NaiveDateTime>,
    },

    /// Show audit records
    Audits {
        #[arg(long)]
        student: Option<String>,

        #[arg(long)]
        area: Option<String>,

        /// Show only the most recent records
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Show granted entries
    Grants,

    /// List students, areas, permissions and credentials
    List,

    /// Cycle the LED board through some gestures and both statuses
    LedTest {
        /// Gesture masks to show
        #[arg(long, value_delimiter = ',', default_value = "1,2,4,8,16,31")]
        masks: Vec<u8>,
    },

    /// Print the resolved configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "handgate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = StationConfig::resolve(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    config.ensure_directories()?;
    let storage = StationStorage::new(config.data_dir.clone())?;

    match cli.command {
        Commands::Seed => {
            let mut registry = storage.load_registry()?;
            registry.seed(Local::now().date_naive(), Utc::now())?;
            storage.save_registry(&registry)?;
            println!("Demo records seeded in {}", storage.base_path().display());
        }

        Commands::AddStudent {
            id,
            first_names,
            last_names,
            email,
            banner,
            career,
        } => {
            let student = Student::new(&id, &first_names, &last_names, &email, &banner, &career)?;
            let mut registry = storage.load_registry()?;
            println!("Registered {} ({})", student.full_name(), student.id);
            registry.add_student(student)?;
            storage.save_registry(&registry)?;
        }

        Commands::AddArea {
            id,
            name,
            kind,
            location,
            opens,
            closes,
            factors,
        } => {
            let mut area = Area::new(&id, &name, kind, &location, opens, closes)?;
            if !factors.is_empty() {
                area = area.with_factors(factors)?;
            }
            let mut registry = storage.load_registry()?;
            println!("Registered area {} ({}-{})", area.id, area.opens_at, area.closes_at);
            registry.add_area(area)?;
            storage.save_registry(&registry)?;
        }

        Commands::Grant {
            id,
            student,
            area,
            from,
            until,
        } => {
            let mut registry = storage.load_registry()?;
            registry.add_permission(Permission {
                id: id.clone(),
                subject: SubjectId::new(student)?,
                area: AreaId::new(area)?,
                status: PermissionStatus::Active,
                valid_from: from,
                valid_until: until,
            })?;
            storage.save_registry(&registry)?;
            println!("Permission {} granted", id);
        }

        Commands::IssueRfid {
            serial,
            student,
            issued,
            expires,
        } => {
            let issued = issued.unwrap_or_else(|| Local::now().date_naive());
            let expires = match expires {
                Some(date) => date,
                None => issued
                    .checked_add_months(Months::new(12))
                    .context("expiry date out of range")?,
            };
            let card = RfidCredential::new(&serial, SubjectId::new(student)?, issued, expires)?;
            let mut registry = storage.load_registry()?;
            registry.issue_rfid(card)?;
            storage.save_registry(&registry)?;
            println!("RFID {} issued, valid {} to {}", serial, issued, expires);
        }

        Commands::EnrollPin { area, frames } => {
            let area = AreaId::new(area)?;
            let mut service = service(&config, &storage)?;
            let mut source = replay(&frames, &config)?;
            let mut leds = BestEffortLed::new(open_reflector(&config));

            let pin = service.enroll_pin(&area, &mut source, &mut leds).await?;
            storage.save_registry(service.registry())?;
            println!("PIN for {} enrolled: {}", area, format_codes(pin.sequence.codes()));
        }

        Commands::EnrollPattern { student, frames } => {
            let student = SubjectId::new(student)?;
            let mut service = service(&config, &storage)?;
            let mut source = replay(&frames, &config)?;
            let mut leds = BestEffortLed::new(open_reflector(&config));

            let pattern = service
                .enroll_pattern(&student, &mut source, &mut leds)
                .await?;
            storage.save_registry(service.registry())?;
            println!(
                "Pattern for {} enrolled: {}",
                student,
                format_codes(pattern.sequence.codes())
            );
        }

        Commands::Access {
            student,
            area,
            rfid,
            frames,
            at,
        } => {
            let request = AccessRequest {
                subject: SubjectId::new(student)?,
                area: AreaId::new(area)?,
                rfid_serial: rfid,
            };
            let now = at.unwrap_or_else(|| Local::now().naive_local());
            let mut service = service(&config, &storage)?;
            // An unreadable frame file fails the attempt when frames are
            // first needed, and is audited like a camera failure
            let mut source =
                ReplaySource::open_deferred(&frames, FingerExtractor::from_config(&config))
                    .idle_when_done();
            let mut leds = BestEffortLed::new(open_reflector(&config));

            let result = service
                .request_access(&request, &mut source, &mut leds, now)
                .await;
            // Card counters and PIN lockouts change even on failure
            storage.save_registry(service.registry())?;
            let decision = result?;

            println!("\n=== Access {} ===\n", if decision.granted() { "GRANTED" } else { "DENIED" });
            print_attempt(&decision.attempt);
            if let Some(grant) = &decision.grant {
                println!("Entry: {} at {}", grant.id, grant.entered_at);
            }
        }

        Commands::Audits {
            student,
            area,
            limit,
        } => {
            let entries = storage.audit_log().entries()?;
            let selected: Vec<&AuthAttempt> = entries
                .iter()
                .filter(|a| student.as_deref().map_or(true, |s| a.subject().as_str() == s))
                .filter(|a| {
                    area.as_deref()
                        .map_or(true, |id| a.area().is_some_and(|x| x.as_str() == id))
                })
                .collect();

            if selected.is_empty() {
                println!("No audit records.");
                return Ok(());
            }

            println!("\n=== Audit Records ===\n");
            let skip = selected.len().saturating_sub(limit);
            for attempt in &selected[skip..] {
                print_attempt(attempt);
                println!();
            }
        }

        Commands::Grants => {
            let registry = storage.load_registry()?;
            if registry.grants().is_empty() {
                println!("No entries granted.");
                return Ok(());
            }
            println!("\n=== Granted Entries ===\n");
            for grant in registry.grants() {
                println!(
                    "{} | {} | {} | audit {}",
                    grant.entered_at, grant.subject, grant.area, grant.attempt_id
                );
            }
        }

        Commands::List => {
            let registry = storage.load_registry()?;

            println!("\n=== Students ===\n");
            for s in registry.students() {
                println!(
                    "{} | {} | {} | {} | {}{}",
                    s.id,
                    s.full_name(),
                    s.email,
                    s.banner_id,
                    s.career,
                    if s.active { "" } else { " | inactive" }
                );
            }

            println!("\n=== Areas ===\n");
            for a in registry.areas() {
                let factors: Vec<String> = a.required_factors.iter().map(|f| f.to_string()).collect();
                let pin = if registry.pin(&a.id).is_some() { "PIN set" } else { "no PIN" };
                println!(
                    "{} | {} | {:?} | {} | {}-{} | {} | {}",
                    a.id,
                    a.name,
                    a.kind,
                    a.location,
                    a.opens_at,
                    a.closes_at,
                    factors.join("+"),
                    pin
                );
            }

            println!("\n=== Permissions ===\n");
            for p in registry.permissions() {
                println!(
                    "{} | {} -> {} | {:?} | {} to {}",
                    p.id,
                    p.subject,
                    p.area,
                    p.status,
                    p.valid_from.map_or("-".to_string(), |d| d.to_string()),
                    p.valid_until.map_or("-".to_string(), |d| d.to_string())
                );
            }

            println!("\n=== RFID Cards ===\n");
            for c in registry.rfid_cards() {
                println!(
                    "{} | {} | {:?} | {} to {} | {} ok / {} failed",
                    c.serial,
                    c.owner,
                    c.status,
                    c.issued_on,
                    c.expires_on,
                    c.successful_attempts,
                    c.failed_attempts
                );
            }

            println!("\n=== Patterns ===\n");
            for s in registry.students() {
                if let Some(p) = registry.pattern(&s.id) {
                    println!("{} | {} | captured {}", p.id, p.owner, p.captured_at);
                }
            }
        }

        Commands::LedTest { masks } => {
            let mut leds = BestEffortLed::new(open_reflector(&config));
            println!("Testing {}", leds.inner().describe());

            for mask in masks {
                let code = GestureCode::try_from(mask)?;
                println!("  {} ({})", code, mask);
                leds.reflect(&code.to_vector(), LedStatus::Reflect);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            println!("  success");
            leds.signal(LedStatus::Success, config.feedback_hold()).await;
            println!("  failure");
            leds.signal(LedStatus::Failure, config.feedback_hold()).await;
            leds.clear();

            if leds.failures() > 0 {
                warn!(failures = leds.failures(), "Some LED updates failed");
            } else {
                info!("LED test complete");
            }
        }

        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn service(config: &StationConfig, storage: &StationStorage) -> Result<AccessService<FileAuditLog>> {
    let registry = storage.load_registry()?;
    let clock = Arc::new(SteppingClock::new(config.frame_interval()));
    Ok(AccessService::new(
        config.clone(),
        registry,
        storage.audit_log(),
        clock,
    ))
}

/// Frames from a file; once they run out the hand is reported absent so
/// the capture ends on its own time budget
fn replay(path: &Path, config: &StationConfig) -> Result<ReplaySource> {
    let source = ReplaySource::open(path, FingerExtractor::from_config(config))
        .with_context(|| format!("cannot replay {}", path.display()))?;
    Ok(source.idle_when_done())
}

fn print_attempt(attempt: &AuthAttempt) {
    println!("Record:  {}", attempt.id());
    println!("Time:    {}", attempt.timestamp().format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Student: {}", attempt.subject());
    if let Some(area) = attempt.area() {
        println!("Area:    {}", area);
    }
    let checks: Vec<String> = attempt
        .checks()
        .iter()
        .map(|(factor, outcome)| format!("{}={:?}", factor, outcome))
        .collect();
    println!("Checks:  {}", checks.join(" "));
    match attempt.reason() {
        None => println!("Result:  success"),
        Some(reason) => println!("Result:  {}", reason),
    }
    if !attempt.detail().is_empty() {
        println!("Detail:  {}", attempt.detail());
    }
}

fn format_codes(codes: &[GestureCode]) -> String {
    codes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .with_context(|| format!("expected HH:MM, got {:?}", value))
}

fn parse_datetime(value: &str) -> Result<NaiveDateTime> {
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed);
        }
    }
    bail!("expected \"YYYY-MM-DD HH:MM\", got {:?}", value)
}

fn parse_factor(value: &str) -> Result<FactorKind> {
    match value.trim().to_ascii_lowercase().as_str() {
        "rfid" => Ok(FactorKind::Rfid),
        "pin" => Ok(FactorKind::Pin),
        "pattern" => Ok(FactorKind::Pattern),
        _ => bail!("unknown factor {:?} (rfid, pin, pattern)", value),
    }
}
