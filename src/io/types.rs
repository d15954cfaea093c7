// src/io/types.rs
//
// Payloads delivered to the consumer of a session.
// All payloads serialize with a `type` tag so they can be forwarded as JSON.

use serde::Serialize;

use super::miner::ProtocolEvent;
use super::{LinkError, LinkState};
use crate::mining::{DeviceState, StateDelta};

// ============================================================================
// Event Payloads
// ============================================================================

/// One line received from the device, after classification and state update
#[derive(Clone, Debug, Serialize)]
pub struct LinePayload {
    /// Host UNIX timestamp in microseconds
    pub timestamp_us: u64,
    /// Trimmed line text (a placeholder when `decode_error` is set)
    pub raw: String,
    pub event: ProtocolEvent,
    /// The bytes were not valid UTF-8; the line was not classified
    pub decode_error: bool,
    /// Snapshot after the event was applied
    pub state: DeviceState,
    pub delta: StateDelta,
}

/// Payload emitted when the link state changes
#[derive(Clone, Debug, Serialize)]
pub struct StateChangePayload {
    pub previous: LinkState,
    pub current: LinkState,
}

/// An error raised by the session itself rather than returned to a caller
#[derive(Clone, Debug, Serialize)]
pub struct ErrorPayload {
    /// Stable tag from `LinkError::kind`
    pub kind: String,
    pub message: String,
    pub fatal: bool,
}

impl From<&LinkError> for ErrorPayload {
    fn from(e: &LinkError) -> Self {
        ErrorPayload {
            kind: e.kind().to_string(),
            message: e.to_string(),
            fatal: e.is_fatal(),
        }
    }
}

/// Everything a session reports to its consumer
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Line(LinePayload),
    /// A command line was written to the device (without terminator)
    Sent { timestamp_us: u64, line: String },
    /// Mining was stopped locally; nothing was sent to the device
    MiningStopped { timestamp_us: u64, state: DeviceState },
    StateChanged(StateChangePayload),
    Error(ErrorPayload),
    /// The monitor exited: "stopped" on disconnect, "error" after a fatal fault
    Ended { reason: String },
}

// ============================================================================
// Event Sink
// ============================================================================

/// Receives session events. Called from the monitor thread, so it must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SessionEvent);
}

impl<F> EventSink for F
where
    F: Fn(SessionEvent) + Send + Sync,
{
    fn emit(&self, event: SessionEvent) {
        self(event)
    }
}
