//! LED feedback
//!
//! The LED board mirrors the finger vector while a capture runs and shows
//! success or failure at the end. It is strictly best effort: a missing or
//! failing board never changes an authentication outcome.

pub mod serial;

use std::time::Duration;

use tracing::{debug, info, warn};

use handgate_core::protocol::encode;
use handgate_core::{FingerVector, LedProtocol, LedStatus};

use crate::config::StationConfig;
use crate::error::Result;

pub use serial::SerialLed;

/// Something that can show a finger vector and a status
pub trait LedReflector: Send {
    /// Show `fingers` with `status`
    fn reflect(&mut self, fingers: &FingerVector, status: LedStatus) -> Result<()>;

    /// Turn every LED off
    fn clear(&mut self) -> Result<()> {
        self.reflect(&FingerVector::CLOSED, LedStatus::Reflect)
    }

    /// Short description for logs
    fn describe(&self) -> String {
        "LED reflector".to_string()
    }
}

impl<L: LedReflector + ?Sized> LedReflector for &mut L {
    fn reflect(&mut self, fingers: &FingerVector, status: LedStatus) -> Result<()> {
        (**self).reflect(fingers, status)
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<L: LedReflector + ?Sized> LedReflector for Box<L> {
    fn reflect(&mut self, fingers: &FingerVector, status: LedStatus) -> Result<()> {
        (**self).reflect(fingers, status)
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// No LED board attached
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLed;

impl LedReflector for NullLed {
    fn reflect(&mut self, _fingers: &FingerVector, _status: LedStatus) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "no LED board".to_string()
    }
}

/// Keeps every update in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingLed {
    protocol: LedProtocol,
    frames: Vec<(FingerVector, LedStatus)>,
    bytes: Vec<u8>,
}

impl RecordingLed {
    /// Record updates as `protocol` would put them on the wire
    pub fn new(protocol: LedProtocol) -> Self {
        Self {
            protocol,
            ..Self::default()
        }
    }

    /// Updates in order
    pub fn frames(&self) -> &[(FingerVector, LedStatus)] {
        &self.frames
    }

    /// Wire bytes in order
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Last update, if any
    pub fn last(&self) -> Option<(FingerVector, LedStatus)> {
        self.frames.last().copied()
    }
}

impl LedReflector for RecordingLed {
    fn reflect(&mut self, fingers: &FingerVector, status: LedStatus) -> Result<()> {
        self.frames.push((*fingers, status));
        self.bytes.extend(encode(self.protocol, fingers, status));
        Ok(())
    }

    fn describe(&self) -> String {
        format!("recording LED ({})", self.protocol)
    }
}

/// Wraps a reflector so its failures are logged and swallowed
#[derive(Debug)]
pub struct BestEffortLed<L> {
    inner: L,
    failures: u64,
}

impl<L: LedReflector> BestEffortLed<L> {
    pub fn new(inner: L) -> Self {
        Self { inner, failures: 0 }
    }

    /// Mirror a finger vector
    pub fn reflect(&mut self, fingers: &FingerVector, status: LedStatus) {
        let result = self.inner.reflect(fingers, status);
        self.note(result);
    }

    /// Turn every LED off
    pub fn clear(&mut self) {
        let result = self.inner.clear();
        self.note(result);
    }

    /// Show a final status for `hold`, then return to a dark reflect frame
    pub async fn signal(&mut self, status: LedStatus, hold: Duration) {
        self.reflect(&FingerVector::CLOSED, status);
        if !hold.is_zero() {
            tokio::time::sleep(hold).await;
        }
        self.reflect(&FingerVector::CLOSED, LedStatus::Reflect);
    }

    /// Failed writes so far
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Borrow the wrapped reflector
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Take the wrapped reflector back
    pub fn into_inner(self) -> L {
        self.inner
    }

    fn note(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.failures += 1;
            if self.failures == 1 {
                warn!(led = %self.inner.describe(), "LED update failed, continuing without feedback: {}", e);
            } else {
                debug!(failures = self.failures, "LED update failed: {}", e);
            }
        }
    }
}

/// The reflector described by `config`.
///
/// Falls back to [`NullLed`] when the board is disabled, unconfigured or
/// cannot be opened.
pub fn open_reflector(config: &StationConfig) -> Box<dyn LedReflector> {
    let port = match (&config.serial_port, config.serial_enabled) {
        (Some(port), true) => port,
        _ => {
            debug!("LED board disabled");
            return Box::new(NullLed);
        }
    };
    match SerialLed::open(port, config) {
        Ok(led) => {
            info!(%port, baud = config.serial_baud, protocol = %config.led_protocol, "LED board connected");
            Box::new(led)
        }
        Err(e) => {
            warn!(%port, "LED board unavailable, continuing without feedback: {}", e);
            Box::new(NullLed)
        }
    }
}
