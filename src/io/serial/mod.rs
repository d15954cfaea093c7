// src/io/serial/mod.rs
//
// Serial transport with newline framing.
// Provides cross-platform byte access to the miner board.
//
// Features:
// - Timeout-bounded reads (a timeout is an empty read, not an error)
// - Newline framing with a bounded line buffer
// - Port enumeration for device pickers

pub mod framer;
pub mod transport;
pub(crate) mod utils;

pub use framer::{FramingOverflow, LineFramer, RawFrame, MAX_LINE_LENGTH};
pub use transport::{list_serial_ports, SerialPortInfo, SerialTransport, Transport};
pub use utils::Parity;
