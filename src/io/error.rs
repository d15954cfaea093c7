// src/io/error.rs
//
// Error taxonomy for the serial link.
// Connection and validation errors are returned to the caller; I/O and framing
// errors raised inside the monitor are fatal to the session and reported once
// to the consumer.

use serde::Serialize;
use thiserror::Error;

/// Why a serial device could not be opened
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionErrorKind {
    /// Path does not name a serial device
    InvalidPath,
    PermissionDenied,
    /// Device exists but is held by another process or not ready
    Busy,
    /// Connection parameters rejected before touching the device
    InvalidConfig,
    Other,
}

impl ConnectionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionErrorKind::InvalidPath => "invalid path",
            ConnectionErrorKind::PermissionDenied => "permission denied",
            ConnectionErrorKind::Busy => "device busy",
            ConnectionErrorKind::InvalidConfig => "invalid configuration",
            ConnectionErrorKind::Other => "open failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    /// The device could not be opened. The session stays disconnected.
    #[error("failed to open {path} ({}): {reason}", kind.as_str())]
    Connection {
        path: String,
        kind: ConnectionErrorKind,
        reason: String,
    },

    /// Transport fault during an established session (unplugged, closed handle).
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The device sent more than `max` bytes without a newline.
    #[error("line exceeded {max} bytes without a newline ({buffered} bytes buffered)")]
    Framing { max: usize, buffered: usize },

    /// A command was rejected before anything was written.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("not connected")]
    NotConnected,

    #[error("already connected to {0}")]
    AlreadyConnected(String),
}

impl LinkError {
    pub fn connection(path: impl Into<String>, kind: ConnectionErrorKind, reason: impl Into<String>) -> Self {
        LinkError::Connection {
            path: path.into(),
            kind,
            reason: reason.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        LinkError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        LinkError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Transport mutex was poisoned by a panicking holder
    pub(crate) fn poisoned(what: &str) -> Self {
        LinkError::io(
            format!("{} lock poisoned", what),
            std::io::Error::new(std::io::ErrorKind::Other, "a thread panicked while holding the lock"),
        )
    }

    /// Stable tag for consumer payloads
    pub fn kind(&self) -> &'static str {
        match self {
            LinkError::Connection { .. } => "connection",
            LinkError::Io { .. } => "io",
            LinkError::Framing { .. } => "framing",
            LinkError::Validation { .. } => "validation",
            LinkError::NotConnected => "not_connected",
            LinkError::AlreadyConnected(_) => "already_connected",
        }
    }

    /// Whether this error ends the session it occurred in
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::Io { .. } | LinkError::Framing { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let io = LinkError::io(
            "read failed",
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"),
        );
        assert!(io.is_fatal());
        assert!(LinkError::Framing { max: 4096, buffered: 5000 }.is_fatal());
        assert!(!LinkError::NotConnected.is_fatal());
        assert!(!LinkError::validation("entropy", "not a number").is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = LinkError::connection("/dev/ttyUSB9", ConnectionErrorKind::Busy, "resource busy");
        assert_eq!(
            err.to_string(),
            "failed to open /dev/ttyUSB9 (device busy): resource busy"
        );
        assert_eq!(err.kind(), "connection");

        let err = LinkError::validation("zeros", "'-1' is not a non-negative integer");
        assert_eq!(err.to_string(), "invalid zeros: '-1' is not a non-negative integer");
    }
}
