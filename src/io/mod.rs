// src/io/mod.rs
//
// Serial link to the KaleSP miner firmware.
// The serial module owns the byte level (transport, newline framing); the miner
// module owns the text protocol (classification, command encoding) and the
// session that ties both to a consumer.

mod error;
pub mod miner;
pub mod serial;
mod types;

pub use error::{ConnectionErrorKind, LinkError};
pub use miner::{Command, ProtocolEvent, Session};
pub use serial::{list_serial_ports, Parity, RawFrame, SerialPortInfo, Transport};
pub use types::{ErrorPayload, EventSink, LinePayload, SessionEvent, StateChangePayload};

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// ============================================================================
// Shared Types
// ============================================================================

/// UART rate the firmware is built with
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Read timeout, which is also the monitor's polling interval
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Get current time in microseconds since UNIX epoch
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Parameters for opening the device. Fixed for the lifetime of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    port: String,
    baud_rate: u32,
    read_timeout: Duration,
    data_bits: u8,
    stop_bits: u8,
    parity: Parity,
}

impl ConnectionConfig {
    /// 115200 8N1 with a 100 ms read timeout
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_line_settings(mut self, data_bits: u8, stop_bits: u8, parity: Parity) -> Self {
        self.data_bits = data_bits;
        self.stop_bits = stop_bits;
        self.parity = parity;
        self
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn data_bits(&self) -> u8 {
        self.data_bits
    }

    pub fn stop_bits(&self) -> u8 {
        self.stop_bits
    }

    pub fn parity(&self) -> Parity {
        self.parity
    }

    /// Short `115200 8N1` style summary for logs
    pub fn line_summary(&self) -> String {
        format!(
            "{} {}{}{}",
            self.baud_rate,
            self.data_bits,
            self.parity.letter(),
            self.stop_bits
        )
    }

    /// Reject parameters that can never open a device
    pub fn validate(&self) -> Result<(), LinkError> {
        let reason = if self.port.trim().is_empty() {
            "device path is empty"
        } else if self.baud_rate == 0 {
            "baud rate must be positive"
        } else if self.read_timeout.is_zero() {
            "read timeout must be positive"
        } else {
            return Ok(());
        };
        Err(LinkError::connection(
            self.port.clone(),
            ConnectionErrorKind::InvalidConfig,
            reason,
        ))
    }
}

/// Connection lifecycle of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Disconnecting => "disconnecting",
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
