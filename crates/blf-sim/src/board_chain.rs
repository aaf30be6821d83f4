//! Virtual relay board chain
//!
//! Models a daisy chain of 8-relay boards at the frame level. Each request
//! frame yields at most one reply frame; a missing reply looks like a board
//! that never answered.

use blf_protocol::{Frame, Opcode, FRAME_LEN};
use tracing::{debug, trace};

/// Simulated chain of relay boards behind one serial port
#[derive(Debug, Clone)]
pub struct VirtualBoardChain {
    /// Identifier for logging
    id: String,
    /// Relay state byte of boards `1..=N`
    states: Vec<u8>,
    /// Every accepted `SetPort` as `(address, data)`
    set_port_history: Vec<(u8, u8)>,
    /// Number of `Setup` frames received
    setup_requests: usize,
    /// Replies still to swallow
    silent_replies: usize,
    /// Replies still to send with a broken checksum
    corrupt_replies: usize,
}

impl VirtualBoardChain {
    /// Create a chain of `boards` boards with all relays off
    pub fn new(id: impl Into<String>, boards: u8) -> Self {
        Self {
            id: id.into(),
            states: vec![0; boards as usize],
            set_port_history: Vec::new(),
            setup_requests: 0,
            silent_replies: 0,
            corrupt_replies: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of boards present
    pub fn board_count(&self) -> u8 {
        self.states.len() as u8
    }

    /// Add or remove boards at the end of the chain
    pub fn set_board_count(&mut self, boards: u8) {
        self.states.resize(boards as usize, 0);
    }

    /// Relay byte of the board at `address`
    pub fn state(&self, address: u8) -> Option<u8> {
        address
            .checked_sub(1)
            .and_then(|index| self.states.get(index as usize).copied())
    }

    /// Change a board's relays behind the host's back
    pub fn set_state(&mut self, address: u8, data: u8) {
        if let Some(index) = address.checked_sub(1) {
            if let Some(state) = self.states.get_mut(index as usize) {
                *state = data;
            }
        }
    }

    pub fn set_port_history(&self) -> &[(u8, u8)] {
        &self.set_port_history
    }

    pub fn clear_history(&mut self) {
        self.set_port_history.clear();
    }

    pub fn setup_requests(&self) -> usize {
        self.setup_requests
    }

    /// Swallow the next `count` replies
    pub fn drop_replies(&mut self, count: usize) {
        self.silent_replies = count;
    }

    /// Send the next `count` replies with an invalid checksum
    pub fn corrupt_replies(&mut self, count: usize) {
        self.corrupt_replies = count;
    }

    /// Handle one request frame, returning the reply bytes if any
    pub fn process_frame(&mut self, bytes: &[u8; FRAME_LEN]) -> Option<[u8; FRAME_LEN]> {
        let Ok(request) = Frame::decode(bytes) else {
            debug!("Board chain {} ignoring corrupt frame {:02X?}", self.id, bytes);
            return None;
        };
        let Ok(opcode) = Opcode::try_from(request.opcode) else {
            debug!("Board chain {} ignoring opcode 0x{:02X}", self.id, request.opcode);
            return None;
        };

        let reply = self.respond(opcode, request.address, request.data)?;

        if self.silent_replies > 0 {
            self.silent_replies -= 1;
            trace!("Board chain {} dropping reply {:?}", self.id, reply);
            return None;
        }

        let mut encoded = reply.encode();
        if self.corrupt_replies > 0 {
            self.corrupt_replies -= 1;
            encoded[FRAME_LEN - 1] ^= 0xFF;
        }
        Some(encoded)
    }

    fn respond(&mut self, opcode: Opcode, address: u8, data: u8) -> Option<Frame> {
        let present = address >= 1 && address <= self.board_count();

        match opcode {
            // Boards that take an address pass the raw opcode back around the
            // chain; the first address nobody takes comes back complemented
            Opcode::Setup => {
                self.setup_requests += 1;
                if present {
                    Some(Frame::command(Opcode::Setup, address, 0))
                } else {
                    Some(Frame::reply(Opcode::Setup, address, 0))
                }
            }
            Opcode::NoOp => Some(Frame::reply(Opcode::NoOp, address, 0)),
            Opcode::GetPort if present => {
                let state = self.state(address).unwrap_or_default();
                Some(Frame::reply(Opcode::GetPort, address, state))
            }
            Opcode::SetPort if present => {
                self.set_state(address, data);
                self.set_port_history.push((address, data));
                debug!("Board chain {} board {} set to {:08b}", self.id, address, data);
                Some(Frame::reply(Opcode::SetPort, address, data))
            }
            Opcode::GetPort | Opcode::SetPort => None,
        }
    }
}
