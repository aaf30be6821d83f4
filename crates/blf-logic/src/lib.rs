//! Switch and Relay Logic
//!
//! This crate holds the in-memory model shared by every worker of the relay
//! bridge:
//!
//! - **Switches**: named on/off values, looked up case-insensitively
//! - **Functions**: a DAG of boolean nodes (`and`, `or`, `xor`, `equals`,
//!   `not`, constants) whose leaves reference switches by id
//! - **Boards**: relay boards addressed by (port, address) whose 8 relays are
//!   each driven by one function node, folded into a single state byte
//!
//! # Change propagation
//!
//! Values are pulled: a node is evaluated on demand from the current switch
//! states. Each node keeps the list of nodes and relays that depend on it,
//! and a switch change walks that list upward to find the boards whose state
//! byte must be recomputed. Boards and the switch registry announce changes
//! through [`Listeners`]; a notification means "re-read the current value",
//! not "here is the value".
//!
//! # Example
//!
//! ```rust
//! use blf_logic::{BoardSpec, FunctionSpec, Model, ModelSpec, SwitchSpec};
//!
//! let spec = ModelSpec {
//!     switches: vec![SwitchSpec::new("West"), SwitchSpec::new("East")],
//!     functions: vec![],
//!     boards: vec![BoardSpec::new(
//!         "/dev/ttyUSB0",
//!         1,
//!         vec![Some(FunctionSpec::switch("West")), Some(FunctionSpec::switch("East"))],
//!     )],
//! };
//! let model = Model::build(&spec).unwrap();
//!
//! let west = model.switches().find("west").unwrap();
//! model.set_switch(west, true);
//!
//! let board = model.boards().find("/dev/ttyUSB0", 1).unwrap();
//! assert_eq!(model.boards().get(board).state(), 0b01);
//! ```

pub mod board;
pub mod error;
pub mod function;
pub mod listeners;
pub mod model;
pub mod switch;

pub use board::{Board, BoardId, BoardRegistry, BoardSpec, RELAYS_PER_BOARD};
pub use error::ModelError;
pub use function::{Dependent, FunctionGraph, FunctionSpec, NamedFunctionSpec, Node, NodeId, NodeKind};
pub use listeners::{Listeners, Subscription};
pub use model::{Model, ModelSpec};
pub use switch::{Switch, SwitchId, SwitchRegistry, SwitchSpec};
