//! Relay Board and PBX Simulation Library
//!
//! This crate provides stand-ins for the hardware and the PBX so the relay
//! service can be exercised end to end in tests:
//!
//! - **VirtualBoardChain**: a daisy chain of relay boards answering frames
//! - **VirtualSerialBus**: named serial ports that can be plugged and unplugged,
//!   implementing [`blf_protocol::PortOpener`]
//! - **VirtualPbx**: a manager interface with variables, user events and
//!   session handling, implementing [`blf_manager::ManagerConnector`]
//!
//! # Example
//!
//! ```rust
//! use blf_sim::VirtualBoardChain;
//! use blf_protocol::{Frame, Opcode};
//!
//! let mut chain = VirtualBoardChain::new("COM3", 2);
//! let reply = chain
//!     .process_frame(&Frame::command(Opcode::SetPort, 2, 0b0000_0101).encode())
//!     .unwrap();
//! assert_eq!(reply[0], Opcode::SetPort.reply_code());
//! assert_eq!(chain.state(2), Some(0b0000_0101));
//! ```

pub mod board_chain;
pub mod pbx;
pub mod serial_bus;

pub use board_chain::VirtualBoardChain;
pub use pbx::{PbxClient, VirtualPbx};
pub use serial_bus::{run_board_chain_task, VirtualSerialBus};
