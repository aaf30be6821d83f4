//! Relay Board Protocol Library
//!
//! This crate implements the serial protocol spoken by daisy-chained
//! 8-relay boards:
//!
//! - **Frames**: fixed 4-byte `[opcode, address, data, checksum]` messages
//!   where the checksum is the XOR of the first three bytes
//! - **Replies**: a board answers a command with the bitwise complement of
//!   the opcode it received, echoing its own address
//! - **Discovery**: the `Setup` handshake walks the chain and assigns
//!   addresses `1..=N`, returning how many boards answered
//!
//! # Architecture
//!
//! [`Frame`] handles encoding and checksum validation. [`RelayDriver`] owns a
//! byte link (anything implementing [`RelayLink`], a real serial port or a
//! simulated chain) and performs one request/response exchange per command,
//! bounded by the configured timeouts.
//!
//! # Example
//!
//! ```rust
//! use blf_protocol::{Frame, Opcode};
//!
//! let frame = Frame::command(Opcode::SetPort, 1, 0b0000_0101);
//! assert_eq!(frame.encode(), [3, 1, 5, 3 ^ 1 ^ 5]);
//! ```

pub mod driver;
pub mod error;
pub mod frame;
pub mod link;

pub use driver::{RelayDriver, Timeouts};
pub use error::{FrameError, RelayError};
pub use frame::{Frame, Opcode, FRAME_LEN, RELAYS_PER_BOARD};
pub use link::{open_serial, PortOpener, RelayLink, SerialOpener, BAUD_RATE};
