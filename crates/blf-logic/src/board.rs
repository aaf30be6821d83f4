//! Relay boards and their state bytes

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::function::{FunctionSpec, NodeId};
use crate::listeners::{Listeners, Subscription};

/// Relays on one board, one bit of the state byte each
pub const RELAYS_PER_BOARD: usize = u8::BITS as usize;

/// Index of a board within its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoardId(pub usize);

/// Board definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSpec {
    /// Serial port the chain is attached to
    pub port: String,
    /// Position in the daisy chain, starting at 1
    pub address: u8,
    /// Function driving each relay; missing or `null` slots stay off
    #[serde(default)]
    pub relays: Vec<Option<FunctionSpec>>,
}

impl BoardSpec {
    /// Create a board definition
    pub fn new(port: impl Into<String>, address: u8, relays: Vec<Option<FunctionSpec>>) -> Self {
        Self {
            port: port.into(),
            address,
            relays,
        }
    }
}

/// Normalize a port name for comparisons
pub fn port_key(port: &str) -> String {
    port.trim().to_lowercase()
}

/// A relay board with 8 function-driven relays
#[derive(Debug)]
pub struct Board {
    id: BoardId,
    port: String,
    address: u8,
    relays: [Option<NodeId>; RELAYS_PER_BOARD],
    state: Mutex<u8>,
    listeners: Listeners<BoardId>,
}

impl Board {
    pub(crate) fn new(
        id: BoardId,
        port: String,
        address: u8,
        relays: [Option<NodeId>; RELAYS_PER_BOARD],
    ) -> Self {
        Self {
            id,
            port,
            address,
            relays,
            state: Mutex::new(0),
            listeners: Listeners::new(),
        }
    }

    /// Registry index
    pub fn id(&self) -> BoardId {
        self.id
    }

    /// Serial port name as configured
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Daisy-chain address
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Root node driving each relay
    pub fn relays(&self) -> &[Option<NodeId>; RELAYS_PER_BOARD] {
        &self.relays
    }

    /// Current relay state byte
    pub fn state(&self) -> u8 {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Be told whenever the state byte changes
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(BoardId) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    /// Recompute the state byte with `compute`, notifying if it changed
    ///
    /// The computation runs under the state lock so concurrent refreshes
    /// cannot store a stale byte over a newer one.
    pub(crate) fn refresh(&self, compute: impl FnOnce(&Self) -> u8) -> bool {
        let changed = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let next = compute(self);
            let changed = *state != next;
            *state = next;
            changed
        };
        if changed {
            self.listeners.notify(self.id);
        }
        changed
    }
}

/// All configured boards
#[derive(Debug)]
pub struct BoardRegistry {
    boards: Vec<Board>,
    index: HashMap<(String, u8), BoardId>,
}

impl BoardRegistry {
    pub(crate) fn new(boards: Vec<Board>) -> Self {
        let index = boards
            .iter()
            .map(|b| ((port_key(&b.port), b.address), b.id))
            .collect();
        Self { boards, index }
    }

    /// Find the board at `address` on `port` (port compared case-insensitively)
    pub fn find(&self, port: &str, address: u8) -> Option<BoardId> {
        self.index.get(&(port_key(port), address)).copied()
    }

    /// Access a board by id
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this registry.
    pub fn get(&self, id: BoardId) -> &Board {
        &self.boards[id.0]
    }

    /// Iterate over all boards in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &Board> {
        self.boards.iter()
    }

    /// Boards configured on `port`
    pub fn on_port<'a>(&'a self, port: &str) -> impl Iterator<Item = &'a Board> + 'a {
        let key = port_key(port);
        self.boards.iter().filter(move |b| port_key(&b.port) == key)
    }

    /// Distinct port names, in order of first appearance
    pub fn ports(&self) -> Vec<String> {
        let mut seen = Vec::new();
        let mut ports = Vec::new();
        for board in &self.boards {
            let key = port_key(&board.port);
            if !seen.contains(&key) {
                seen.push(key);
                ports.push(board.port.clone());
            }
        }
        ports
    }

    /// Number of boards
    pub fn len(&self) -> usize {
        self.boards.len()
    }

    /// Whether no board is configured
    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }
}
