//! The network → simulation boundary.
//!
//! Network code runs on its own thread and only ever pushes onto a bounded
//! channel through an [`InboundSender`]. The simulation thread drains the
//! channel between ticks, never mid-tick.

use crossbeam_channel::{Receiver, Sender, TrySendError};

use tandem_core::{Command, PeerId, ScopeId, TickId, TransportError};
use tandem_wire::decode_delivery;

use crate::drift::Divergence;

/// A message from the transport to the simulation thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A stamped command.
    Command(Command),
    /// The highest tick peers may simulate.
    TickLimit(TickId),
    /// Another peer's encoded [`DriftOpinion`](crate::DriftOpinion).
    Opinion {
        /// Sender of the opinion.
        peer: PeerId,
        /// Encoded opinion.
        bytes: Vec<u8>,
    },
    /// The authority detected a divergence.
    Diverged(Divergence),
}

/// Cloneable handle the transport uses to hand messages to an engine.
#[derive(Clone, Debug)]
pub struct InboundSender {
    tx: Sender<Inbound>,
}

impl InboundSender {
    /// The delivery callback: a command stamped by the sequencer arrived.
    ///
    /// `bytes` is the capturing peer's pending-command encoding.
    pub fn deliver(&self, scope: ScopeId, tick: TickId, bytes: &[u8]) -> Result<(), TransportError> {
        let cmd = decode_delivery(scope, tick, bytes).map_err(|e| {
            log::warn!("malformed delivery for {scope} at tick {tick}: {e}");
            TransportError::Malformed
        })?;
        self.send(Inbound::Command(cmd))
    }

    /// Raise the tick limit.
    pub fn tick_limit(&self, tick: TickId) -> Result<(), TransportError> {
        self.send(Inbound::TickLimit(tick))
    }

    /// Forward another peer's drift opinion.
    pub fn opinion(&self, peer: PeerId, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.send(Inbound::Opinion { peer, bytes })
    }

    /// Forward a divergence reported by the authority.
    pub fn diverged(&self, divergence: Divergence) -> Result<(), TransportError> {
        self.send(Inbound::Diverged(divergence))
    }

    /// Push any inbound message.
    pub fn send(&self, msg: Inbound) -> Result<(), TransportError> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => {
                log::warn!("inbound queue full; message dropped");
                TransportError::QueueFull
            }
            TrySendError::Disconnected(_) => TransportError::Disconnected,
        })
    }
}

/// A bounded inbound channel.
pub(crate) fn channel(capacity: usize) -> (InboundSender, Receiver<Inbound>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (InboundSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{HandlerId, PendingCommand};
    use tandem_wire::encode_pending;

    #[test]
    fn delivery_is_decoded_and_stamped() {
        let (tx, rx) = channel(4);
        let bytes = encode_pending(&PendingCommand {
            handler: HandlerId(3),
            scope: ScopeId::Map(1),
            payload: vec![9, 9],
        });
        tx.deliver(ScopeId::Map(1), TickId(12), &bytes).unwrap();
        let Inbound::Command(cmd) = rx.try_recv().unwrap() else {
            panic!("expected a command");
        };
        assert_eq!(cmd.handler, HandlerId(3));
        assert_eq!(cmd.tick, TickId(12));
        assert_eq!(cmd.payload, vec![9, 9]);
    }

    #[test]
    fn short_delivery_is_malformed() {
        let (tx, rx) = channel(4);
        assert_eq!(
            tx.deliver(ScopeId::Global, TickId(0), &[1, 2]),
            Err(TransportError::Malformed)
        );
        assert!(rx.is_empty());
    }

    #[test]
    fn full_queue_reports_back_pressure() {
        let (tx, _rx) = channel(1);
        tx.tick_limit(TickId(1)).unwrap();
        assert_eq!(tx.tick_limit(TickId(2)), Err(TransportError::QueueFull));
    }

    #[test]
    fn dropped_engine_disconnects() {
        let (tx, rx) = channel(1);
        drop(rx);
        assert_eq!(tx.tick_limit(TickId(1)), Err(TransportError::Disconnected));
    }
}
