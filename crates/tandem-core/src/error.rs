//! Error types shared across the workspace.
//!
//! Subsystem-specific errors (wire, registry, capture, engine) live in
//! their own crates; this module holds only the errors that cross the
//! boundary between Tandem and host code.

use thiserror::Error;

/// Error returned by host operation code invoked from a command.
///
/// Raised on the receiving peer while applying a command. The scheduler
/// catches it at the per-command boundary, logs it, and moves on to the
/// next command of the tick.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvokeError {
    /// The operation refused to run against the current state.
    #[error("operation rejected: {reason}")]
    Rejected {
        /// Human-readable description of the refusal.
        reason: String,
    },
    /// The target exists but is in a state the operation cannot handle.
    #[error("invalid target state: {reason}")]
    InvalidState {
        /// Description of the offending state.
        reason: String,
    },
    /// A decoded argument had a different shape than the operation expects.
    #[error("argument {index} has unexpected shape")]
    BadArgument {
        /// Position of the argument in the handler's argument list.
        index: usize,
    },
}

/// Errors from handing data across the simulation/network boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The simulation side of the channel has been dropped.
    #[error("transport disconnected")]
    Disconnected,
    /// The bounded inbound queue is at capacity.
    #[error("inbound queue full")]
    QueueFull,
    /// The delivered bytes do not form a valid command.
    #[error("malformed delivery")]
    Malformed,
}
