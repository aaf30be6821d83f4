//! Relay board frame format
//!
//! # Frame Format
//! ```text
//! [opcode] [address] [data] [checksum]
//! ```
//!
//! - `opcode`: command code, or its bitwise complement in a reply
//! - `address`: board position in the daisy chain (1..=N, never 0 for commands)
//! - `data`: relay state byte, bit `i` drives relay `i`
//! - `checksum`: `opcode ^ address ^ data`

use crate::error::FrameError;

/// Length of every frame on the wire
pub const FRAME_LEN: usize = 4;

/// Number of relays driven by one board
pub const RELAYS_PER_BOARD: usize = 8;

/// Command codes understood by the boards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Do nothing, reply only
    NoOp = 0,
    /// Daisy-chain address assignment
    Setup = 1,
    /// Read the relay state byte
    GetPort = 2,
    /// Write the relay state byte
    SetPort = 3,
}

impl Opcode {
    /// Raw command byte
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Opcode byte a board replies with when it accepts this command
    pub fn reply_code(self) -> u8 {
        !self.code()
    }
}

impl TryFrom<u8> for Opcode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::NoOp),
            1 => Ok(Self::Setup),
            2 => Ok(Self::GetPort),
            3 => Ok(Self::SetPort),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }
}

/// A single protocol frame
///
/// The opcode is kept as a raw byte because replies carry the complement of
/// the command code, which is not itself an [`Opcode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Raw opcode byte
    pub opcode: u8,
    /// Board address
    pub address: u8,
    /// Payload byte
    pub data: u8,
}

impl Frame {
    /// Build a frame from raw bytes
    pub fn new(opcode: u8, address: u8, data: u8) -> Self {
        Self {
            opcode,
            address,
            data,
        }
    }

    /// Build a host-to-board command frame
    pub fn command(opcode: Opcode, address: u8, data: u8) -> Self {
        Self::new(opcode.code(), address, data)
    }

    /// Build the reply a board sends after accepting `opcode`
    pub fn reply(opcode: Opcode, address: u8, data: u8) -> Self {
        Self::new(opcode.reply_code(), address, data)
    }

    /// XOR checksum of the three payload bytes
    pub fn checksum(&self) -> u8 {
        checksum(self.opcode, self.address, self.data)
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        [self.opcode, self.address, self.data, self.checksum()]
    }

    /// Decode wire bytes, rejecting frames whose checksum does not match
    pub fn decode(bytes: &[u8; FRAME_LEN]) -> Result<Self, FrameError> {
        let frame = Self::new(bytes[0], bytes[1], bytes[2]);
        let expected = frame.checksum();
        if expected != bytes[3] {
            return Err(FrameError::ChecksumMismatch {
                expected,
                actual: bytes[3],
            });
        }
        Ok(frame)
    }

    /// Check whether this frame is the complement reply to `opcode`
    pub fn is_reply_to(&self, opcode: Opcode) -> bool {
        self.opcode == opcode.reply_code()
    }
}

/// XOR checksum over opcode, address and data
pub fn checksum(opcode: u8, address: u8, data: u8) -> u8 {
    opcode ^ address ^ data
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_set_port() {
        let frame = Frame::command(Opcode::SetPort, 2, 0xA5);
        assert_eq!(frame.encode(), [0x03, 0x02, 0xA5, 0x03 ^ 0x02 ^ 0xA5]);
    }

    #[test]
    fn test_reply_uses_complement() {
        let frame = Frame::reply(Opcode::GetPort, 1, 0x10);
        assert_eq!(frame.opcode, 0xFD);
        assert!(frame.is_reply_to(Opcode::GetPort));
        assert!(!frame.is_reply_to(Opcode::SetPort));
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let err = Frame::decode(&[0x03, 0x01, 0xFF, 0x00]).unwrap_err();
        assert_eq!(
            err,
            FrameError::ChecksumMismatch {
                expected: 0x03 ^ 0x01 ^ 0xFF,
                actual: 0x00
            }
        );
    }

    #[test]
    fn test_opcode_try_from() {
        assert_eq!(Opcode::try_from(1), Ok(Opcode::Setup));
        assert_eq!(Opcode::try_from(7), Err(FrameError::UnknownOpcode(7)));
    }

    proptest! {
        #[test]
        fn checksum_is_xor_of_payload(opcode: u8, address: u8, data: u8) {
            let bytes = Frame::new(opcode, address, data).encode();
            prop_assert_eq!(bytes[3], opcode ^ address ^ data);
            prop_assert_eq!(Frame::decode(&bytes), Ok(Frame::new(opcode, address, data)));
        }

        #[test]
        fn any_corrupted_checksum_is_rejected(opcode: u8, address: u8, data: u8, flip in 1u8..=255) {
            let mut bytes = Frame::new(opcode, address, data).encode();
            bytes[3] ^= flip;
            let is_mismatch = matches!(
                Frame::decode(&bytes),
                Err(FrameError::ChecksumMismatch { .. })
            );
            prop_assert!(is_mismatch);
        }
    }
}
