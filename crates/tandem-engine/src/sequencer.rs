//! An in-process authoritative sequencer.
//!
//! [`LoopbackSequencer`] plays the server's part for tests and
//! single-process play. Peers send pending commands and drift opinions
//! through a [`LoopbackTransport`]; the sequencer stamps each command with
//! `authority tick + scheduling delay` and broadcasts it to every attached
//! peer, the sender included, in receipt order. Opinions go to a
//! [`DriftArbiter`], whose divergences are broadcast as well.

use crossbeam_channel::{Receiver, Sender};

use tandem_core::{PeerId, ScopeId, TickId, Transport};

use crate::config::SyncConfig;
use crate::drift::{Divergence, DriftArbiter, DriftOpinion};
use crate::inbound::InboundSender;

#[derive(Debug)]
enum Outbound {
    Command {
        peer: PeerId,
        scope: ScopeId,
        bytes: Vec<u8>,
    },
    Opinion {
        peer: PeerId,
        bytes: Vec<u8>,
    },
}

/// A peer's outbound side of the loopback sequencer.
#[derive(Clone, Debug)]
pub struct LoopbackTransport {
    peer: PeerId,
    tx: Sender<Outbound>,
}

impl LoopbackTransport {
    /// The peer this transport sends for.
    pub fn peer(&self) -> PeerId {
        self.peer
    }
}

impl Transport for LoopbackTransport {
    fn send_command(&mut self, scope: ScopeId, bytes: Vec<u8>) {
        let msg = Outbound::Command {
            peer: self.peer,
            scope,
            bytes,
        };
        if self.tx.send(msg).is_err() {
            log::warn!("sequencer gone; command from peer {} dropped", self.peer);
        }
    }

    fn send_opinion(&mut self, bytes: Vec<u8>) {
        if self.tx.send(Outbound::Opinion { peer: self.peer, bytes }).is_err() {
            log::warn!("sequencer gone; opinion from peer {} dropped", self.peer);
        }
    }
}

/// Stamps and broadcasts commands for a set of in-process peers.
pub struct LoopbackSequencer {
    tick: TickId,
    delay: u32,
    tx: Sender<Outbound>,
    rx: Receiver<Outbound>,
    next_peer: u32,
    peers: Vec<(PeerId, InboundSender)>,
    arbiter: DriftArbiter,
    divergences: Vec<Divergence>,
}

impl LoopbackSequencer {
    /// A sequencer at authority tick 0.
    pub fn new(scheduling_delay: u32, drift_history: usize) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tick: TickId(0),
            delay: scheduling_delay,
            tx,
            rx,
            next_peer: 0,
            peers: Vec::new(),
            arbiter: DriftArbiter::new(drift_history),
            divergences: Vec::new(),
        }
    }

    /// A sequencer using the delay and history of `config`.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.scheduling_delay, config.drift_history)
    }

    /// Allocate a peer id and its outbound transport.
    pub fn connect(&mut self) -> LoopbackTransport {
        let peer = PeerId(self.next_peer);
        self.next_peer += 1;
        LoopbackTransport {
            peer,
            tx: self.tx.clone(),
        }
    }

    /// Start delivering to `peer` through `inbound`.
    ///
    /// The peer immediately learns the current tick limit.
    pub fn attach(&mut self, peer: PeerId, inbound: InboundSender) {
        if let Err(e) = inbound.tick_limit(self.tick) {
            log::warn!("peer {peer} could not receive the tick limit: {e}");
        }
        self.peers.push((peer, inbound));
        log::info!("peer {peer} attached at authority tick {}", self.tick);
    }

    /// Current authority tick; peers may simulate up to it.
    pub fn authority_tick(&self) -> TickId {
        self.tick
    }

    /// Divergences found so far.
    pub fn divergences(&self) -> &[Divergence] {
        &self.divergences
    }

    /// Handle everything peers sent, in receipt order. Returns the number
    /// of messages handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(msg) = self.rx.try_recv() {
            handled += 1;
            match msg {
                Outbound::Command { peer, scope, bytes } => {
                    let stamp = self.tick.offset(self.delay);
                    log::debug!("command from peer {peer} for {scope} stamped tick {stamp}");
                    for (to, inbound) in &self.peers {
                        if let Err(e) = inbound.deliver(scope, stamp, &bytes) {
                            log::warn!("delivery to peer {to} failed: {e}");
                        }
                    }
                }
                Outbound::Opinion { peer, bytes } => {
                    let opinion = match DriftOpinion::decode(&bytes) {
                        Ok(opinion) => opinion,
                        Err(e) => {
                            log::warn!("malformed drift opinion from peer {peer}: {e}");
                            continue;
                        }
                    };
                    if let Some(d) = self.arbiter.submit(peer, opinion) {
                        self.divergences.push(d);
                        for (to, inbound) in &self.peers {
                            if let Err(e) = inbound.diverged(d) {
                                log::warn!("divergence notice to peer {to} failed: {e}");
                            }
                        }
                    }
                }
            }
        }
        handled
    }

    /// Stamp pending traffic, advance the authority tick, and broadcast
    /// the new tick limit. Returns the new authority tick.
    pub fn step(&mut self) -> TickId {
        self.pump();
        self.tick = self.tick.next();
        for (to, inbound) in &self.peers {
            if let Err(e) = inbound.tick_limit(self.tick) {
                log::warn!("tick limit to peer {to} failed: {e}");
            }
        }
        self.tick
    }

    /// Forget drift state of `scope`, after the host resynchronized it.
    pub fn clear_drift(&mut self, scope: ScopeId) {
        self.arbiter.clear(scope);
        self.divergences.retain(|d| d.scope != scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::DriftSample;
    use crate::inbound::{channel, Inbound};
    use tandem_core::{HandlerId, PendingCommand};
    use tandem_wire::encode_pending;

    fn pending(handler: u32) -> Vec<u8> {
        encode_pending(&PendingCommand {
            handler: HandlerId(handler),
            scope: ScopeId::Global,
            payload: vec![],
        })
    }

    fn drain(rx: &Receiver<Inbound>) -> Vec<Inbound> {
        rx.try_iter().collect()
    }

    #[test]
    fn commands_are_stamped_and_broadcast_in_receipt_order() {
        let mut seq = LoopbackSequencer::new(2, 4);
        let mut a = seq.connect();
        let mut b = seq.connect();
        let (tx_a, rx_a) = channel(16);
        let (tx_b, rx_b) = channel(16);
        seq.attach(a.peer(), tx_a);
        seq.attach(b.peer(), tx_b);
        drain(&rx_a);
        drain(&rx_b);

        seq.step();
        b.send_command(ScopeId::Global, pending(1));
        a.send_command(ScopeId::Global, pending(2));
        assert_eq!(seq.pump(), 2);

        for rx in [&rx_a, &rx_b] {
            let handlers: Vec<(u32, u32)> = drain(rx)
                .into_iter()
                .filter_map(|m| match m {
                    Inbound::Command(c) => Some((c.handler.0, c.tick.0)),
                    _ => None,
                })
                .collect();
            assert_eq!(handlers, vec![(1, 3), (2, 3)]);
        }
    }

    #[test]
    fn step_raises_the_limit() {
        let mut seq = LoopbackSequencer::new(1, 4);
        let t = seq.connect();
        let (tx, rx) = channel(16);
        seq.attach(t.peer(), tx);
        assert_eq!(drain(&rx), vec![Inbound::TickLimit(TickId(0))]);
        assert_eq!(seq.step(), TickId(1));
        assert_eq!(drain(&rx), vec![Inbound::TickLimit(TickId(1))]);
    }

    #[test]
    fn mismatching_opinions_are_broadcast() {
        let mut seq = LoopbackSequencer::new(1, 4);
        let mut a = seq.connect();
        let mut b = seq.connect();
        let (tx, rx) = channel(16);
        seq.attach(a.peer(), tx);
        drain(&rx);

        let opinion = |value| DriftOpinion {
            scope: ScopeId::Global,
            tick: TickId(29),
            samples: vec![DriftSample {
                tick: TickId(29),
                value,
            }],
        };
        a.send_opinion(opinion(1).encode().unwrap());
        b.send_opinion(opinion(2).encode().unwrap());
        seq.pump();

        let expected = Divergence {
            scope: ScopeId::Global,
            tick: TickId(29),
            peer: b.peer(),
        };
        assert_eq!(seq.divergences(), &[expected]);
        assert_eq!(drain(&rx), vec![Inbound::Diverged(expected)]);

        seq.clear_drift(ScopeId::Global);
        assert!(seq.divergences().is_empty());
    }
}
