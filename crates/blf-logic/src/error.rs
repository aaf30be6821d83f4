//! Error types for building the switch/function/board model

use thiserror::Error;

/// Errors found while building a [`Model`](crate::Model) from its definition
///
/// All of these are configuration errors: the model is never partially built.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Switch defined without a name
    #[error("switch name is required")]
    EmptySwitchName,

    /// Two switches share a name (case-insensitive)
    #[error("duplicate switch: {0}")]
    DuplicateSwitch(String),

    /// Named function defined without a name
    #[error("function name is required")]
    EmptyFunctionName,

    /// Two named functions share a name (case-insensitive)
    #[error("duplicate function: {0}")]
    DuplicateFunction(String),

    /// A function references a switch that is not defined
    #[error("unknown switch: {0}")]
    UnknownSwitch(String),

    /// A function references a named function that is not defined
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// Variadic function without operands
    #[error("{0} function requires at least one operand")]
    NoOperands(&'static str),

    /// Named functions reference each other in a loop
    #[error("function cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// Board defined without a port
    #[error("board port is required")]
    EmptyPort,

    /// Board address outside 1..=255
    #[error("invalid address {address} for board on {port}")]
    InvalidAddress { port: String, address: u8 },

    /// Two boards share a (port, address) pair
    #[error("duplicate board {address} on {port}")]
    DuplicateBoard { port: String, address: u8 },

    /// Board defines more relays than it has
    #[error("board {address} on {port} defines {count} relays, at most {max} are available")]
    TooManyRelays {
        port: String,
        address: u8,
        count: usize,
        max: usize,
    },
}
