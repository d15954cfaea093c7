// src/io/serial/transport.rs
//
// Byte-level access to the serial device.
// The transport is the only owner of the OS handle. Reads are bounded by the
// configured timeout and a pure timeout is reported as an empty read.

use serde::Serialize;
use std::io::{Read, Write};

use crate::io::{ConnectionConfig, ConnectionErrorKind, LinkError};

/// Bytes requested per read
const READ_CHUNK: usize = 256;

// ============================================================================
// Transport Trait
// ============================================================================

/// A byte stream to the device
pub trait Transport: Send {
    /// Read whatever arrives within the read timeout. An empty result means the
    /// timeout elapsed; an error means the device is gone.
    fn read_timeout_slice(&mut self) -> Result<Vec<u8>, LinkError>;

    /// Write an already-terminated protocol line and flush it
    fn write_line(&mut self, line: &str) -> Result<(), LinkError>;

    /// Release the device. Safe to call more than once.
    fn close(&mut self);
}

// ============================================================================
// Serial Transport
// ============================================================================

pub struct SerialTransport {
    path: String,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialTransport {
    pub fn open(config: &ConnectionConfig) -> Result<Self, LinkError> {
        config.validate()?;

        let port = serialport::new(config.port(), config.baud_rate())
            .data_bits(super::utils::to_serialport_data_bits(config.data_bits()))
            .stop_bits(super::utils::to_serialport_stop_bits(config.stop_bits()))
            .parity(super::utils::to_serialport_parity(&config.parity()))
            .timeout(config.read_timeout())
            .open()
            .map_err(|e| open_error(config.port(), e))?;

        Ok(SerialTransport {
            path: config.port().to_string(),
            port: Some(port),
        })
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>, LinkError> {
        let path = &self.path;
        self.port.as_mut().ok_or_else(|| {
            LinkError::io(
                format!("{} is closed", path),
                std::io::Error::new(std::io::ErrorKind::NotConnected, "transport closed"),
            )
        })
    }
}

impl Transport for SerialTransport {
    fn read_timeout_slice(&mut self) -> Result<Vec<u8>, LinkError> {
        let mut buf = [0u8; READ_CHUNK];
        let path = self.path.clone();
        let port = self.port_mut()?;

        match port.read(&mut buf) {
            Ok(0) => Err(LinkError::io(
                format!("read from {}", path),
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "device disconnected"),
            )),
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(ref e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                // Timeout is expected for serial reads
                Ok(Vec::new())
            }
            Err(e) => Err(LinkError::io(format!("read from {}", path), e)),
        }
    }

    fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        let path = self.path.clone();
        let port = self.port_mut()?;
        port.write_all(line.as_bytes())
            .and_then(|_| port.flush())
            .map_err(|e| LinkError::io(format!("write to {}", path), e))
    }

    fn close(&mut self) {
        // Dropping the handle closes the descriptor
        self.port.take();
    }
}

/// Map a serialport open failure onto the connection error kinds
fn open_error(path: &str, e: serialport::Error) -> LinkError {
    let kind = match e.kind() {
        serialport::ErrorKind::NoDevice => ConnectionErrorKind::Busy,
        serialport::ErrorKind::InvalidInput => ConnectionErrorKind::InvalidPath,
        serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => ConnectionErrorKind::InvalidPath,
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            ConnectionErrorKind::PermissionDenied
        }
        _ if e.description.to_lowercase().contains("busy") => ConnectionErrorKind::Busy,
        _ => ConnectionErrorKind::Other,
    };
    LinkError::connection(path, kind, e.description)
}

// ============================================================================
// Port Discovery
// ============================================================================

/// Information about an available serial port
#[derive(Clone, Debug, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

/// List available serial ports
///
/// On macOS, filters out /dev/tty.* devices and only shows /dev/cu.* devices.
/// The cu (calling unit) devices are non-blocking and preferred for outgoing connections.
/// The tty (terminal) devices block on open waiting for carrier detect.
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>, LinkError> {
    let ports = serialport::available_ports().map_err(|e| {
        LinkError::io(
            "enumerate serial ports",
            std::io::Error::new(std::io::ErrorKind::Other, e.description),
        )
    })?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    "USB".to_string(),
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::BluetoothPort => {
                    ("Bluetooth".to_string(), None, None, None, None, None)
                }
                serialport::SerialPortType::PciPort => ("PCI".to_string(), None, None, None, None, None),
                serialport::SerialPortType::Unknown => {
                    ("Unknown".to_string(), None, None, None, None, None)
                }
            };
            SerialPortInfo {
                port_name: p.port_name,
                port_type,
                manufacturer,
                product,
                serial_number,
                vid,
                pid,
            }
        })
        .collect())
}
