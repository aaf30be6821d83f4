//! Error types for relay board communication

use std::io;

use thiserror::Error;

use crate::frame::Opcode;

/// Errors that can occur while decoding a single frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Checksum mismatch
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Opcode byte outside the command set
    #[error("unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),
}

/// Errors raised by a command exchange with a relay board
#[derive(Debug, Error)]
pub enum RelayError {
    /// Serial I/O failed; the port must be reopened
    #[error("I/O error on {port}: {source}")]
    Io {
        port: String,
        #[source]
        source: io::Error,
    },

    /// Read or write did not complete within the configured timeout
    #[error("timeout on {port} during {opcode:?} to board {address}")]
    Timeout {
        port: String,
        opcode: Opcode,
        address: u8,
    },

    /// Reply failed checksum validation
    #[error(
        "corrupt reply on {port} during {opcode:?} to board {address}: \
         checksum 0x{actual:02X}, expected 0x{expected:02X}"
    )]
    Corrupt {
        port: String,
        opcode: Opcode,
        address: u8,
        expected: u8,
        actual: u8,
    },

    /// A different board answered than the one addressed
    #[error("board mismatch on {port} during {opcode:?}: sent to board {expected}, board {actual} replied")]
    BoardMismatch {
        port: String,
        opcode: Opcode,
        expected: u8,
        actual: u8,
    },

    /// Reply opcode was not the complement of the command sent
    #[error(
        "opcode mismatch on {port} board {address}: sent {opcode:?}, \
         expected reply 0x{expected:02X}, got 0x{actual:02X}"
    )]
    OpcodeMismatch {
        port: String,
        opcode: Opcode,
        address: u8,
        expected: u8,
        actual: u8,
    },
}

impl RelayError {
    /// Whether the link itself failed and must be reopened
    ///
    /// Everything else (timeouts and malformed replies) may be retried on
    /// the same connection.
    pub fn is_transport(&self) -> bool {
        matches!(self, RelayError::Io { .. })
    }

    /// Whether the exchange timed out
    pub fn is_timeout(&self) -> bool {
        matches!(self, RelayError::Timeout { .. })
    }
}
