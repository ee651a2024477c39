//! Several peers in lockstep behind one in-process sequencer.

use tandem_core::{ScopeId, TickId};
use tandem_engine::{LoopbackSequencer, LoopbackTransport, SyncConfig, SyncEngine, TickReport};

use crate::colony::Colony;
use crate::fixtures::{colony_table, ColonyHandles};

/// A colony engine as the harness runs it.
pub type Peer = SyncEngine<Colony, LoopbackTransport>;

/// `n` peers sharing a [`LoopbackSequencer`].
pub struct Cluster {
    pub sequencer: LoopbackSequencer,
    pub peers: Vec<Peer>,
    pub handles: ColonyHandles,
}

impl Cluster {
    /// Build `n` peers, each with a world from `world` and every map of it
    /// registered as a scope starting at tick 0.
    pub fn new(n: usize, config: SyncConfig, world: impl Fn() -> Colony) -> Self {
        let (table, handles) = colony_table();
        let mut sequencer = LoopbackSequencer::from_config(&config);
        let mut peers = Vec::with_capacity(n);
        for _ in 0..n {
            let transport = sequencer.connect();
            let id = transport.peer();
            let colony = world();
            let maps: Vec<ScopeId> = colony.maps.keys().copied().collect();
            let mut engine = SyncEngine::new(config.clone(), table.clone(), colony, transport)
                .expect("valid cluster config");
            engine.set_peer(id);
            for scope in maps {
                engine.add_scope(scope, TickId(0)).expect("fresh scope");
            }
            sequencer.attach(id, engine.sender());
            peers.push(engine);
        }
        Self {
            sequencer,
            peers,
            handles,
        }
    }

    /// Advance the authority one tick, then let every peer catch up to it.
    pub fn step(&mut self) -> Vec<Vec<TickReport>> {
        self.sequencer.step();
        self.peers.iter_mut().map(catch_up).collect()
    }

    /// Step `n` times.
    pub fn run(&mut self, n: u32) {
        for _ in 0..n {
            self.step();
        }
    }

    /// Step until the sequencer has handled everything the peers sent.
    pub fn settle(&mut self) {
        self.step();
        self.step();
    }

    pub fn peer(&self, i: usize) -> &Peer {
        &self.peers[i]
    }

    pub fn peer_mut(&mut self, i: usize) -> &mut Peer {
        &mut self.peers[i]
    }
}

/// Advance every scope of `peer` until the tick limit stops it.
pub fn catch_up(peer: &mut Peer) -> Vec<TickReport> {
    let mut all = Vec::new();
    loop {
        let reports = peer.advance_all();
        if reports.is_empty() {
            return all;
        }
        all.extend(reports);
    }
}
