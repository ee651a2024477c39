//! Transports for single-engine tests.

use tandem_core::{ScopeId, TickId, Transport};
use tandem_engine::{Simulation, SyncEngine};

/// Keeps everything sent, in order.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub commands: Vec<(ScopeId, Vec<u8>)>,
    pub opinions: Vec<Vec<u8>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_commands(&mut self) -> Vec<(ScopeId, Vec<u8>)> {
        std::mem::take(&mut self.commands)
    }
}

impl Transport for RecordingTransport {
    fn send_command(&mut self, scope: ScopeId, bytes: Vec<u8>) {
        self.commands.push((scope, bytes));
    }

    fn send_opinion(&mut self, bytes: Vec<u8>) {
        self.opinions.push(bytes);
    }
}

/// Drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send_command(&mut self, _: ScopeId, _: Vec<u8>) {}
}

/// Hand every command the engine sent back to it, stamped `tick`, the way
/// a sequencer serving a single peer would. Returns the number delivered.
pub fn loop_back<W: Simulation>(engine: &mut SyncEngine<W, RecordingTransport>, tick: TickId) -> usize {
    let sent = engine.transport_mut().take_commands();
    let inbound = engine.sender();
    for (scope, bytes) in &sent {
        inbound
            .deliver(*scope, tick, bytes)
            .expect("loopback delivery");
    }
    engine.pump();
    sent.len()
}
