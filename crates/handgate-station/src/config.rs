//! Station configuration
//!
//! Read once at process start (defaults, then an optional JSON file, then
//! `HANDGATE_*` environment variables) and passed by reference into every
//! session. Nothing mutates it afterwards.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use handgate_core::{
    GestureCode, GestureKind, LedProtocol, RecorderConfig, StabilizerConfig, TimeoutPolicy,
    DEFAULT_DEBOUNCE_MS, DEFAULT_NO_HAND_FRAMES, DEFAULT_STABLE_FRAMES,
};

use crate::capture::SessionMode;
use crate::error::{Result, StationError};
use crate::lockout::LockoutPolicy;

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "HANDGATE_";

/// Environment variable naming a JSON config file
pub const CONFIG_PATH_ENV: &str = "HANDGATE_CONFIG";

/// Longest accepted debounce (seconds)
pub const MAX_DEBOUNCE_SECS: f64 = 86_400.0;

/// Station configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Camera device index
    pub camera_index: u32,

    /// Show the camera preview window
    pub preview: bool,

    /// Consecutive identical frames before a gesture is accepted
    pub stable_frames: u32,

    /// Minimum time between accepted gestures (seconds)
    pub debounce_secs: f64,

    /// Horizontal landmark margin for the thumb
    pub margin_x: f32,

    /// Vertical landmark margin for the other fingers
    pub margin_y: f32,

    /// Require the hand to leave the view between PIN gestures
    pub require_no_hand_between_digits: bool,

    /// Require the hand to leave the view between pattern gestures
    pub require_no_hand_between_pattern: bool,

    /// Consecutive "no hand" frames that count as leaving the view
    pub no_hand_frames: u32,

    /// Never accept a closed fist as a gesture
    pub ignore_closed_fist: bool,

    /// Serial port of the LED device (e.g. `/dev/ttyACM0`, `COM5`)
    pub serial_port: Option<String>,

    /// Serial baud rate
    pub serial_baud: u32,

    /// Drive the LED device at all
    pub serial_enabled: bool,

    /// Wire variant the LED device speaks
    pub led_protocol: LedProtocol,

    /// Wait after opening the port (the board resets on connect)
    pub serial_settle_ms: u64,

    /// How long success/failure feedback stays lit
    pub feedback_hold_ms: u64,

    /// PIN capture budget during an access attempt (0 disables)
    pub pin_timeout_secs: u64,

    /// Pattern capture budget during an access attempt (0 disables)
    pub pattern_timeout_secs: u64,

    /// PIN capture budget during enrollment (0 disables)
    pub enroll_pin_timeout_secs: u64,

    /// Pattern capture budget during enrollment (0 disables)
    pub enroll_pattern_timeout_secs: u64,

    /// What capture budgets are measured from
    pub timeout_policy: TimeoutPolicy,

    /// Gesture that cancels an access capture (off by default)
    pub closing_gesture: Option<u8>,

    /// Gesture that cancels an enrollment capture
    pub enroll_closing_gesture: Option<u8>,

    /// Allowed relative deviation of each pattern gap from the enrolled
    /// gap (0.4 = 40%). Timing is not checked when unset.
    pub pattern_timing_tolerance: Option<f64>,

    /// Owner mismatches or invalid reads before an RFID card is blocked
    pub max_rfid_failures: u32,

    /// Failed PIN verifications before the PIN locks
    pub pin_lockout_threshold: u32,

    /// Escalating PIN lockout durations (seconds)
    pub pin_lockout_secs: Vec<u64>,

    /// Frame spacing assumed for replayed frames (milliseconds)
    pub frame_interval_ms: u64,

    /// Consecutive dropped frames before the sensor is declared unavailable
    pub max_failed_reads: u32,

    /// Where the registry and audit log live
    pub data_dir: PathBuf,
}

impl Default for StationConfig {
    fn default() -> Self {
        let lockout = LockoutPolicy::default();
        Self {
            camera_index: 0,
            preview: true,
            stable_frames: DEFAULT_STABLE_FRAMES,
            debounce_secs: DEFAULT_DEBOUNCE_MS as f64 / 1000.0,
            margin_x: 0.03,
            margin_y: 0.04,
            require_no_hand_between_digits: true,
            require_no_hand_between_pattern: true,
            no_hand_frames: DEFAULT_NO_HAND_FRAMES,
            ignore_closed_fist: false,
            serial_port: None,
            serial_baud: 9600,
            serial_enabled: true,
            led_protocol: LedProtocol::Framed,
            serial_settle_ms: 2000,
            feedback_hold_ms: 1200,
            pin_timeout_secs: 60,
            pattern_timeout_secs: 120,
            enroll_pin_timeout_secs: 60,
            enroll_pattern_timeout_secs: 180,
            timeout_policy: TimeoutPolicy::SinceStart,
            closing_gesture: None,
            enroll_closing_gesture: Some(19),
            pattern_timing_tolerance: None,
            max_rfid_failures: 3,
            pin_lockout_threshold: lockout.threshold,
            pin_lockout_secs: lockout.lockout_durations,
            frame_interval_ms: 33,
            max_failed_reads: 60,
            data_dir: Self::default_data_dir(),
        }
    }
}

impl StationConfig {
    fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("handgate")
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults, then the config file (`explicit` or `HANDGATE_CONFIG`),
    /// then `HANDGATE_*` overrides from the process environment
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration file");
                Self::load(&path)?
            }
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HANDGATE_*` overrides. Unparseable values are an error.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.trim();
            match name {
                "CONFIG" => {}
                "CAMERA_INDEX" => self.camera_index = parse(&key, value)?,
                "PREVIEW" => self.preview = parse_bool(&key, value)?,
                "STABLE_FRAMES" => self.stable_frames = parse(&key, value)?,
                "DEBOUNCE_SECS" => self.debounce_secs = parse(&key, value)?,
                "MARGIN_X" => self.margin_x = parse(&key, value)?,
                "MARGIN_Y" => self.margin_y = parse(&key, value)?,
                "REQUIRE_NO_HAND_BETWEEN_DIGITS" => {
                    self.require_no_hand_between_digits = parse_bool(&key, value)?
                }
                "REQUIRE_NO_HAND_BETWEEN_PATTERN" => {
                    self.require_no_hand_between_pattern = parse_bool(&key, value)?
                }
                "NO_HAND_FRAMES" => self.no_hand_frames = parse(&key, value)?,
                "IGNORE_CLOSED_FIST" => self.ignore_closed_fist = parse_bool(&key, value)?,
                "SERIAL_PORT" => {
                    self.serial_port = (!value.is_empty()).then(|| value.to_string())
                }
                "SERIAL_BAUD" => self.serial_baud = parse(&key, value)?,
                "SERIAL_ENABLED" => self.serial_enabled = parse_bool(&key, value)?,
                "LED_PROTOCOL" => self.led_protocol = parse(&key, value)?,
                "SERIAL_SETTLE_MS" => self.serial_settle_ms = parse(&key, value)?,
                "FEEDBACK_HOLD_MS" => self.feedback_hold_ms = parse(&key, value)?,
                "PIN_TIMEOUT_SECS" => self.pin_timeout_secs = parse(&key, value)?,
                "PATTERN_TIMEOUT_SECS" => self.pattern_timeout_secs = parse(&key, value)?,
                "ENROLL_PIN_TIMEOUT_SECS" => self.enroll_pin_timeout_secs = parse(&key, value)?,
                "ENROLL_PATTERN_TIMEOUT_SECS" => {
                    self.enroll_pattern_timeout_secs = parse(&key, value)?
                }
                "TIMEOUT_POLICY" => self.timeout_policy = parse_policy(&key, value)?,
                "CLOSING_GESTURE" => self.closing_gesture = parse_optional(&key, value)?,
                "ENROLL_CLOSING_GESTURE" => {
                    self.enroll_closing_gesture = parse_optional(&key, value)?
                }
                "PATTERN_TIMING_TOLERANCE" => {
                    self.pattern_timing_tolerance = parse_optional(&key, value)?
                }
                "MAX_RFID_FAILURES" => self.max_rfid_failures = parse(&key, value)?,
                "PIN_LOCKOUT_THRESHOLD" => self.pin_lockout_threshold = parse(&key, value)?,
                "PIN_LOCKOUT_SECS" => self.pin_lockout_secs = parse_list(&key, value)?,
                "FRAME_INTERVAL_MS" => self.frame_interval_ms = parse(&key, value)?,
                "MAX_FAILED_READS" => self.max_failed_reads = parse(&key, value)?,
                "DATA_DIR" => self.data_dir = PathBuf::from(value),
                _ => warn!(%key, "Ignoring unknown configuration variable"),
            }
        }
        Ok(())
    }

    /// Reject values no session can run with
    pub fn validate(&self) -> Result<()> {
        if self.stable_frames == 0 {
            return Err(StationError::Config("stable_frames must be at least 1".into()));
        }
        if self.no_hand_frames == 0 {
            return Err(StationError::Config("no_hand_frames must be at least 1".into()));
        }
        if !(0.0..=MAX_DEBOUNCE_SECS).contains(&self.debounce_secs) {
            return Err(StationError::Config(format!(
                "debounce_secs must be between 0 and {}, got {}",
                MAX_DEBOUNCE_SECS, self.debounce_secs
            )));
        }
        if let Some(tolerance) = self.pattern_timing_tolerance {
            if !tolerance.is_finite() || tolerance <= 0.0 {
                return Err(StationError::Config(format!(
                    "pattern_timing_tolerance must be a positive number, got {}",
                    tolerance
                )));
            }
        }
        for (name, margin) in [("margin_x", self.margin_x), ("margin_y", self.margin_y)] {
            if !(0.0..=1.0).contains(&margin) {
                return Err(StationError::Config(format!(
                    "{} must be between 0 and 1, got {}",
                    name, margin
                )));
            }
        }
        for gesture in [self.closing_gesture, self.enroll_closing_gesture]
            .into_iter()
            .flatten()
        {
            GestureCode::try_from(gesture)
                .map_err(|e| StationError::Config(format!("closing gesture: {}", e)))?;
        }
        if self.serial_baud == 0 {
            return Err(StationError::Config("serial_baud must be positive".into()));
        }
        if self.max_rfid_failures == 0 {
            return Err(StationError::Config("max_rfid_failures must be at least 1".into()));
        }
        if self.pin_lockout_secs.is_empty() {
            return Err(StationError::Config("pin_lockout_secs cannot be empty".into()));
        }
        Ok(())
    }

    /// Stabilizer thresholds for a capture of `kind`
    pub fn stabilizer_config(&self, kind: GestureKind) -> StabilizerConfig {
        let require_no_hand = match kind {
            GestureKind::Pin => self.require_no_hand_between_digits,
            GestureKind::Pattern => self.require_no_hand_between_pattern,
        };
        StabilizerConfig {
            stable_frames: self.stable_frames,
            debounce: Duration::try_from_secs_f64(self.debounce_secs.clamp(0.0, MAX_DEBOUNCE_SECS))
                .unwrap_or(Duration::ZERO),
            require_no_hand,
            no_hand_frames: self.no_hand_frames,
            ignore_closed_fist: self.ignore_closed_fist,
        }
    }

    /// Time budget for a capture of `kind` in `mode`
    pub fn recorder_config(&self, kind: GestureKind, mode: SessionMode) -> RecorderConfig {
        let secs = match (mode, kind) {
            (SessionMode::Verify, GestureKind::Pin) => self.pin_timeout_secs,
            (SessionMode::Verify, GestureKind::Pattern) => self.pattern_timeout_secs,
            (SessionMode::Enroll, GestureKind::Pin) => self.enroll_pin_timeout_secs,
            (SessionMode::Enroll, GestureKind::Pattern) => self.enroll_pattern_timeout_secs,
        };
        RecorderConfig {
            timeout: (secs > 0).then(|| Duration::from_secs(secs)),
            policy: self.timeout_policy,
        }
    }

    /// Gesture that cancels a capture in `mode`, if any
    pub fn closing_gesture(&self, mode: SessionMode) -> Option<GestureCode> {
        let raw = match mode {
            SessionMode::Verify => self.closing_gesture,
            SessionMode::Enroll => self.enroll_closing_gesture,
        };
        raw.and_then(|g| GestureCode::try_from(g).ok())
    }

    /// PIN lockout policy
    pub fn pin_lockout(&self) -> LockoutPolicy {
        LockoutPolicy {
            threshold: self.pin_lockout_threshold,
            lockout_durations: self.pin_lockout_secs.clone(),
        }
    }

    /// Spacing of replayed frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    /// Success/failure LED hold
    pub fn feedback_hold(&self) -> Duration {
        Duration::from_millis(self.feedback_hold_ms)
    }

    /// Create the data directory if it doesn't exist
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| StationError::Config(format!("{}={:?}: {}", key, value, e)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(StationError::Config(format!(
            "{}={:?}: expected a boolean",
            key, value
        ))),
    }
}

fn parse_optional<T>(key: &str, value: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value.to_ascii_lowercase().as_str() {
        "" | "none" | "off" => Ok(None),
        _ => parse(key, value).map(Some),
    }
}

fn parse_list(key: &str, value: &str) -> Result<Vec<u64>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse(key, part))
        .collect()
}

fn parse_policy(key: &str, value: &str) -> Result<TimeoutPolicy> {
    match value.to_ascii_lowercase().as_str() {
        "since_start" | "start" => Ok(TimeoutPolicy::SinceStart),
        "since_last_event" | "last_event" => Ok(TimeoutPolicy::SinceLastEvent),
        _ => Err(StationError::Config(format!(
            "{}={:?}: expected since_start or since_last_event",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = StationConfig::default();
        assert_eq!(config.stable_frames, 10);
        assert_eq!(config.debounce_secs, 0.9);
        assert_eq!(config.no_hand_frames, 6);
        assert_eq!(config.serial_baud, 9600);
        assert_eq!(config.led_protocol, LedProtocol::Framed);
        assert_eq!(config.timeout_policy, TimeoutPolicy::SinceStart);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = StationConfig::default();
        config
            .apply_env(env(&[
                ("HANDGATE_STABLE_FRAMES", "5"),
                ("HANDGATE_DEBOUNCE_SECS", "0.6"),
                ("HANDGATE_REQUIRE_NO_HAND_BETWEEN_DIGITS", "0"),
                ("HANDGATE_SERIAL_PORT", "/dev/ttyACM0"),
                ("HANDGATE_LED_PROTOCOL", "simple"),
                ("HANDGATE_TIMEOUT_POLICY", "since_last_event"),
                ("HANDGATE_CLOSING_GESTURE", "19"),
                ("PATH", "/usr/bin"),
            ]))
            .unwrap();

        assert_eq!(config.stable_frames, 5);
        assert_eq!(config.debounce_secs, 0.6);
        assert!(!config.require_no_hand_between_digits);
        assert_eq!(config.serial_port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.led_protocol, LedProtocol::Simple);
        assert_eq!(config.timeout_policy, TimeoutPolicy::SinceLastEvent);
        assert_eq!(config.closing_gesture, Some(19));
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = StationConfig::default();
        assert!(config
            .apply_env(env(&[("HANDGATE_STABLE_FRAMES", "ten")]))
            .is_err());
        assert!(config
            .apply_env(env(&[("HANDGATE_PREVIEW", "maybe")]))
            .is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = StationConfig {
            stable_frames: 0,
            ..StationConfig::default()
        };
        assert!(config.validate().is_err());

        config.stable_frames = 10;
        config.margin_y = 1.5;
        assert!(config.validate().is_err());

        config.margin_y = 0.04;
        config.closing_gesture = Some(40);
        assert!(config.validate().is_err());

        config.closing_gesture = None;
        config.pattern_timing_tolerance = Some(-0.4);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_debounce_rejected() {
        let mut config = StationConfig::default();
        config
            .apply_env(env(&[("HANDGATE_DEBOUNCE_SECS", "1e20")]))
            .unwrap();
        assert!(matches!(config.validate(), Err(StationError::Config(_))));

        // Building the stabilizer never panics, even unvalidated
        let stabilizer = config.stabilizer_config(GestureKind::Pin);
        assert_eq!(stabilizer.debounce, Duration::from_secs(86_400));

        config.debounce_secs = f64::NAN;
        assert!(config.validate().is_err());
        assert_eq!(
            config.stabilizer_config(GestureKind::Pin).debounce,
            Duration::ZERO
        );
    }

    #[test]
    fn test_env_lockout_and_timing_overrides() {
        let mut config = StationConfig::default();
        config
            .apply_env(env(&[
                ("HANDGATE_PIN_LOCKOUT_SECS", "10, 60,600"),
                ("HANDGATE_PATTERN_TIMING_TOLERANCE", "0.4"),
            ]))
            .unwrap();
        assert_eq!(config.pin_lockout_secs, vec![10, 60, 600]);
        assert_eq!(config.pin_lockout().lockout_durations, vec![10, 60, 600]);
        assert_eq!(config.pattern_timing_tolerance, Some(0.4));
        assert!(config.validate().is_ok());

        config
            .apply_env(env(&[("HANDGATE_PATTERN_TIMING_TOLERANCE", "off")]))
            .unwrap();
        assert_eq!(config.pattern_timing_tolerance, None);
        assert!(config
            .apply_env(env(&[("HANDGATE_PIN_LOCKOUT_SECS", "10,soon")]))
            .is_err());
    }

    #[test]
    fn test_stabilizer_config_per_kind() {
        let config = StationConfig {
            require_no_hand_between_digits: false,
            ..StationConfig::default()
        };
        assert!(!config.stabilizer_config(GestureKind::Pin).require_no_hand);
        assert!(config.stabilizer_config(GestureKind::Pattern).require_no_hand);
        assert_eq!(
            config.stabilizer_config(GestureKind::Pin).debounce,
            Duration::from_millis(900)
        );
    }

    #[test]
    fn test_recorder_config_per_mode() {
        let config = StationConfig::default();
        let verify = config.recorder_config(GestureKind::Pattern, SessionMode::Verify);
        let enroll = config.recorder_config(GestureKind::Pattern, SessionMode::Enroll);
        assert_eq!(verify.timeout, Some(Duration::from_secs(120)));
        assert_eq!(enroll.timeout, Some(Duration::from_secs(180)));

        let unlimited = StationConfig {
            pin_timeout_secs: 0,
            ..StationConfig::default()
        };
        assert_eq!(
            unlimited
                .recorder_config(GestureKind::Pin, SessionMode::Verify)
                .timeout,
            None
        );
    }

    #[test]
    fn test_closing_gesture_per_mode() {
        let config = StationConfig::default();
        assert_eq!(config.closing_gesture(SessionMode::Verify), None);
        assert_eq!(
            config.closing_gesture(SessionMode::Enroll).map(|c| c.mask()),
            Some(19)
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handgate.json");
        let config = StationConfig {
            camera_index: 2,
            data_dir: dir.path().to_path_buf(),
            ..StationConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(StationConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: StationConfig = serde_json::from_str(r#"{"stable_frames": 7}"#).unwrap();
        assert_eq!(config.stable_frames, 7);
        assert_eq!(config.no_hand_frames, 6);
    }
}
