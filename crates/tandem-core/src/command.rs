//! The command model: a handler id, its encoded arguments, and where and
//! when it executes.

use crate::id::{HandlerId, ScopeId, TickId};

/// A tick-stamped instruction, as delivered to every peer by the sequencer.
///
/// `payload` is opaque to everything except the handler named by
/// `handler`. Commands are transient: encoded, sent, decoded, executed,
/// discarded.
///
/// # Examples
///
/// ```
/// use tandem_core::{Command, HandlerId, ScopeId, TickId};
///
/// let cmd = Command {
///     handler: HandlerId(3),
///     tick: TickId(100),
///     scope: ScopeId::Map(0),
///     payload: vec![5, 0, 0, 0],
/// };
///
/// assert_eq!(cmd.tick, TickId(100));
/// assert!(!cmd.scope.is_global());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    /// Which registered handler decodes and applies the payload.
    pub handler: HandlerId,
    /// The tick at which every peer executes this command.
    pub tick: TickId,
    /// The scope whose queue, random stream, and entities the command uses.
    pub scope: ScopeId,
    /// Handler-specific encoded arguments.
    pub payload: Vec<u8>,
}

/// A locally captured command that has not been stamped by the sequencer yet.
///
/// This is the only point at which an action can still be cancelled:
/// once the sequencer stamps it, every peer must execute it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCommand {
    /// Which registered handler decodes and applies the payload.
    pub handler: HandlerId,
    /// The scope the command applies to.
    pub scope: ScopeId,
    /// Handler-specific encoded arguments.
    pub payload: Vec<u8>,
}

impl PendingCommand {
    /// Stamp the command with its execution tick.
    pub fn stamp(self, tick: TickId) -> Command {
        Command {
            handler: self.handler,
            tick,
            scope: self.scope,
            payload: self.payload,
        }
    }
}
