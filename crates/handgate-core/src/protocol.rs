//! Serial LED wire format
//!
//! Two incompatible variants exist on the wire:
//!
//! - **Simple**: 5 bytes, one per finger (`0x00`/`0x01`), thumb first,
//!   no framing.
//! - **Framed**: header `0x41` (`'A'`), 5 finger bytes, 1 status byte.
//!   The device gives up on a packet 200 ms after its header.
//!
//! The station encodes; the decoders model the device side and are used
//! by the LED emulator, tests and fuzzing.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::FingerVector;
use crate::FINGER_COUNT;

/// First byte of a framed packet
pub const FRAME_HEADER: u8 = 0x41;

/// Length of a framed packet, header included
pub const FRAMED_PACKET_LEN: usize = 1 + FINGER_COUNT + 1;

/// Length of a simple packet
pub const SIMPLE_PACKET_LEN: usize = FINGER_COUNT;

/// Device-side read window after a header
pub const FRAME_READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Which wire variant the LED device speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedProtocol {
    /// 5 finger bytes, no status
    Simple,
    /// Header, 5 finger bytes, status byte
    #[default]
    Framed,
}

impl FromStr for LedProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(LedProtocol::Simple),
            "framed" => Ok(LedProtocol::Framed),
            other => Err(Error::InvalidLedFrame(format!(
                "unknown LED protocol '{}' (expected simple or framed)",
                other
            ))),
        }
    }
}

impl fmt::Display for LedProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedProtocol::Simple => f.write_str("simple"),
            LedProtocol::Framed => f.write_str("framed"),
        }
    }
}

/// Overall status carried by a framed packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LedStatus {
    /// Mirror the finger bits
    #[default]
    Reflect = 0,
    /// Success bank on, failure bank off
    Success = 1,
    /// Failure bank on, success bank off
    Failure = 2,
}

impl TryFrom<u8> for LedStatus {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(LedStatus::Reflect),
            1 => Ok(LedStatus::Success),
            2 => Ok(LedStatus::Failure),
            other => Err(Error::InvalidLedFrame(format!("unknown status byte {}", other))),
        }
    }
}

/// Encode one LED update.
///
/// The simple variant has no status byte: `Success` lights all five LEDs
/// and `Failure` clears them.
pub fn encode(protocol: LedProtocol, fingers: &FingerVector, status: LedStatus) -> Vec<u8> {
    match protocol {
        LedProtocol::Simple => {
            let bits = match status {
                LedStatus::Reflect => fingers.bits(),
                LedStatus::Success => FingerVector::OPEN.bits(),
                LedStatus::Failure => FingerVector::CLOSED.bits(),
            };
            bits.to_vec()
        }
        LedProtocol::Framed => {
            let mut packet = Vec::with_capacity(FRAMED_PACKET_LEN);
            packet.push(FRAME_HEADER);
            packet.extend_from_slice(&fingers.bits());
            packet.push(status as u8);
            packet
        }
    }
}

/// A decoded LED update, as the device would apply it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedCommand {
    pub fingers: FingerVector,
    pub status: LedStatus,
}

fn fingers_from(bytes: &[u8]) -> Result<FingerVector> {
    let mut bits = [0u8; FINGER_COUNT];
    bits.copy_from_slice(bytes);
    FingerVector::from_bits(bits).map_err(|e| Error::InvalidLedFrame(e.to_string()))
}

/// Device-side decoder for the simple variant
#[derive(Debug, Clone, Default)]
pub struct SimpleDecoder {
    buf: Vec<u8>,
}

impl SimpleDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; yields a command every 5 valid bytes.
    ///
    /// A byte other than 0/1 is rejected and the partial packet dropped.
    pub fn push(&mut self, byte: u8) -> Result<Option<LedCommand>> {
        if byte > 1 {
            self.buf.clear();
            return Err(Error::InvalidLedFrame(format!("finger byte {}", byte)));
        }
        self.buf.push(byte);
        if self.buf.len() < SIMPLE_PACKET_LEN {
            return Ok(None);
        }
        let fingers = fingers_from(&self.buf)?;
        self.buf.clear();
        Ok(Some(LedCommand {
            fingers,
            status: LedStatus::Reflect,
        }))
    }

    /// Bytes of the packet in progress
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Device-side decoder for the framed variant
#[derive(Debug, Clone)]
pub struct FramedDecoder {
    header_at: Option<Instant>,
    buf: Vec<u8>,
    timeout: Duration,
}

impl Default for FramedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FramedDecoder {
    /// Decoder with the standard 200 ms window
    pub fn new() -> Self {
        Self::with_timeout(FRAME_READ_TIMEOUT)
    }

    /// Decoder with a custom window after the header
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            header_at: None,
            buf: Vec::with_capacity(FRAMED_PACKET_LEN - 1),
            timeout,
        }
    }

    /// Feed one byte received at `now`.
    ///
    /// Bytes outside a packet are skipped until the next header. A packet
    /// that does not complete within the window is discarded and the byte
    /// is reconsidered as a possible new header. Malformed finger or status
    /// bytes drop the packet and return an error.
    pub fn push(&mut self, byte: u8, now: Instant) -> Result<Option<LedCommand>> {
        if let Some(started) = self.header_at {
            if now.saturating_duration_since(started) > self.timeout {
                self.reset();
            }
        }

        if self.header_at.is_none() {
            if byte == FRAME_HEADER {
                self.header_at = Some(now);
            }
            return Ok(None);
        }

        self.buf.push(byte);
        if self.buf.len() < FRAMED_PACKET_LEN - 1 {
            return Ok(None);
        }

        let result = fingers_from(&self.buf[..FINGER_COUNT]).and_then(|fingers| {
            LedStatus::try_from(self.buf[FINGER_COUNT]).map(|status| LedCommand { fingers, status })
        });
        self.reset();
        result.map(Some)
    }

    /// Whether a packet is in progress
    pub fn in_packet(&self) -> bool {
        self.header_at.is_some()
    }

    fn reset(&mut self) {
        self.header_at = None;
        self.buf.clear();
    }
}
