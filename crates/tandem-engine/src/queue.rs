//! Per-scope command queue keyed by execution tick.
//!
//! [`CommandQueue`] holds commands between delivery and execution. Within
//! one tick, commands keep the order in which they were appended, which is
//! the sequencer's receipt order. The queue never re-sorts a tick's list.

use std::collections::BTreeMap;

use tandem_core::{Command, TickId};

/// Commands taken from the queue for one tick.
#[derive(Debug, Default)]
pub struct Due {
    /// Commands to execute, in sequencer order.
    pub commands: Vec<Command>,
    /// How many of them were stamped for an earlier tick.
    pub stale: usize,
}

/// Commands waiting for their tick.
#[derive(Debug, Default)]
pub struct CommandQueue {
    by_tick: BTreeMap<TickId, Vec<Command>>,
    len: usize,
}

impl CommandQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delivered command behind every command already queued for
    /// its tick.
    pub fn push(&mut self, cmd: Command) {
        self.by_tick.entry(cmd.tick).or_default().push(cmd);
        self.len += 1;
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The earliest tick holding a command.
    pub fn next_due(&self) -> Option<TickId> {
        self.by_tick.keys().next().copied()
    }

    /// Take every command stamped for `tick` or earlier.
    ///
    /// Earlier ticks come first, each in append order. Commands from an
    /// earlier tick mean a command was delivered after its tick was
    /// simulated; they still run, and are counted in [`Due::stale`].
    pub fn take_due(&mut self, tick: TickId) -> Due {
        let later = match tick.0.checked_add(1) {
            Some(next) => self.by_tick.split_off(&TickId(next)),
            None => BTreeMap::new(),
        };
        let due = std::mem::replace(&mut self.by_tick, later);

        let mut out = Due::default();
        for (t, cmds) in due {
            if t < tick {
                log::warn!(
                    "{} command(s) stamped for tick {t} executing late at tick {tick}",
                    cmds.len()
                );
                out.stale += cmds.len();
            }
            out.commands.extend(cmds);
        }
        self.len -= out.commands.len();
        out
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.by_tick.clear();
        self.len = 0;
    }
}
