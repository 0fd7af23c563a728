//! Arduino LED board over a serial port

use std::io::Write;
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info};

use handgate_core::protocol::encode;
use handgate_core::{FingerVector, LedProtocol, LedStatus};

use super::LedReflector;
use crate::config::StationConfig;
use crate::error::{Result, StationError};

const WRITE_TIMEOUT: Duration = Duration::from_millis(200);

/// LED board on a serial port
pub struct SerialLed {
    port: Box<dyn SerialPort>,
    name: String,
    protocol: LedProtocol,
}

impl SerialLed {
    /// Open the port, wait for the board to reset, then clear the LEDs
    pub fn open(port_name: &str, config: &StationConfig) -> Result<Self> {
        let port = serialport::new(port_name, config.serial_baud)
            .timeout(WRITE_TIMEOUT)
            .open()?;

        if config.serial_settle_ms > 0 {
            debug!(ms = config.serial_settle_ms, "Waiting for LED board reset");
            std::thread::sleep(Duration::from_millis(config.serial_settle_ms));
        }

        let mut led = Self {
            port,
            name: port_name.to_string(),
            protocol: config.led_protocol,
        };
        led.clear()?;
        Ok(led)
    }

    /// Port name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl LedReflector for SerialLed {
    fn reflect(&mut self, fingers: &FingerVector, status: LedStatus) -> Result<()> {
        let packet = encode(self.protocol, fingers, status);
        self.port
            .write_all(&packet)
            .and_then(|_| self.port.flush())
            .map_err(|e| StationError::SerialUnavailable(format!("{}: {}", self.name, e)))
    }

    fn describe(&self) -> String {
        format!("LED board on {} ({})", self.name, self.protocol)
    }
}

impl Drop for SerialLed {
    fn drop(&mut self) {
        if self.clear().is_ok() {
            info!(port = %self.name, "LED board released");
        }
    }
}

impl std::fmt::Debug for SerialLed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLed")
            .field("name", &self.name)
            .field("protocol", &self.protocol)
            .finish()
    }
}
