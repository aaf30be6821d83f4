//! The assembled switch/function/board model
//!
//! [`Model`] is the only way to change a switch, so every change runs the
//! same sequence: update the switch, recompute each affected board once
//! (notifying the board's subscribers if its byte changed), then notify the
//! switch registry's subscribers.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::board::{port_key, Board, BoardId, BoardRegistry, BoardSpec, RELAYS_PER_BOARD};
use crate::error::ModelError;
use crate::function::{FunctionGraph, GraphBuilder, NamedFunctionSpec};
use crate::switch::{SwitchId, SwitchRegistry, SwitchSpec};

/// Everything needed to build a [`Model`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Switch definitions in order
    #[serde(default)]
    pub switches: Vec<SwitchSpec>,
    /// Reusable named functions
    #[serde(default)]
    pub functions: Vec<NamedFunctionSpec>,
    /// Board definitions in order
    #[serde(default)]
    pub boards: Vec<BoardSpec>,
}

/// Switch registry, function graph and board registry wired together
#[derive(Debug)]
pub struct Model {
    switches: SwitchRegistry,
    graph: FunctionGraph,
    boards: BoardRegistry,
}

impl Model {
    /// Validate the definitions and build the model
    ///
    /// Board state bytes are computed from the initial switch states.
    pub fn build(spec: &ModelSpec) -> Result<Self, ModelError> {
        let switches = SwitchRegistry::new(&spec.switches)?;
        let mut builder = GraphBuilder::new(&switches, &spec.functions)?;

        let mut seen = HashSet::new();
        let mut boards = Vec::with_capacity(spec.boards.len());
        for board in &spec.boards {
            let port = board.port.trim();
            if port.is_empty() {
                return Err(ModelError::EmptyPort);
            }
            if board.address == 0 {
                return Err(ModelError::InvalidAddress {
                    port: port.to_string(),
                    address: board.address,
                });
            }
            if !seen.insert((port_key(port), board.address)) {
                return Err(ModelError::DuplicateBoard {
                    port: port.to_string(),
                    address: board.address,
                });
            }
            if board.relays.len() > RELAYS_PER_BOARD {
                return Err(ModelError::TooManyRelays {
                    port: port.to_string(),
                    address: board.address,
                    count: board.relays.len(),
                    max: RELAYS_PER_BOARD,
                });
            }

            let id = BoardId(boards.len());
            let mut relays = [None; RELAYS_PER_BOARD];
            for (index, relay) in board.relays.iter().enumerate() {
                if let Some(function) = relay {
                    let node = builder.add(function)?;
                    builder.attach_relay(node, id, index as u8);
                    relays[index] = Some(node);
                }
            }
            boards.push(Board::new(id, port.to_string(), board.address, relays));
        }

        let model = Self {
            graph: builder.finish(),
            boards: BoardRegistry::new(boards),
            switches,
        };
        for board in model.boards.iter() {
            board.refresh(|b| model.compute_state(b));
        }
        Ok(model)
    }

    /// Switch registry
    pub fn switches(&self) -> &SwitchRegistry {
        &self.switches
    }

    /// Function graph
    pub fn graph(&self) -> &FunctionGraph {
        &self.graph
    }

    /// Board registry
    pub fn boards(&self) -> &BoardRegistry {
        &self.boards
    }

    /// Assign a switch, returning whether its state changed
    ///
    /// The switch becomes dirty even when the value is unchanged.
    pub fn set_switch(&self, id: SwitchId, on: bool) -> bool {
        let changed = self.switches.get(id).assign(on);
        if changed {
            self.propagate(id);
        }
        changed
    }

    /// Flip a switch atomically, returning its new state
    pub fn toggle_switch(&self, id: SwitchId) -> bool {
        let (changed, on) = self.switches.get(id).update(|on| !on);
        if changed {
            self.propagate(id);
        }
        on
    }

    /// Relay state byte a board should currently hold
    pub fn compute_state(&self, board: &Board) -> u8 {
        board
            .relays()
            .iter()
            .enumerate()
            .filter_map(|(index, node)| node.map(|node| (index, node)))
            .filter(|(_, node)| self.graph.evaluate(*node, &self.switches))
            .fold(0u8, |state, (index, _)| state | (1 << index))
    }

    fn propagate(&self, id: SwitchId) {
        let switch = self.switches.get(id);
        debug!(
            "Switch {} is now {}",
            switch.name(),
            if switch.is_on() { "on" } else { "off" }
        );

        for board in self.graph.boards_depending_on(id) {
            let board = self.boards.get(board);
            if board.refresh(|b| self.compute_state(b)) {
                debug!(
                    "Board {} on {} state 0x{:02X}",
                    board.address(),
                    board.port(),
                    board.state()
                );
            }
        }
        self.switches.notify(id);
    }
}
