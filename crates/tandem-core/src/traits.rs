//! Boundary traits between the synchronization core and its collaborators.

use crate::id::ScopeId;

/// Outbound half of the transport collaborator.
///
/// The transport is responsible for framing, reliability, and for
/// guaranteeing that every peer receives every command with the same
/// tick stamp. The core only hands it bytes.
pub trait Transport {
    /// Send a locally captured command to the authoritative sequencer.
    ///
    /// `bytes` is the encoded handler id plus payload; the sequencer
    /// stamps the tick.
    fn send_command(&mut self, scope: ScopeId, bytes: Vec<u8>);

    /// Send an encoded drift opinion to the authoritative peer.
    ///
    /// Transports that run drift comparison locally may ignore this.
    fn send_opinion(&mut self, bytes: Vec<u8>) {
        let _ = bytes;
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_command(&mut self, scope: ScopeId, bytes: Vec<u8>) {
        (**self).send_command(scope, bytes)
    }

    fn send_opinion(&mut self, bytes: Vec<u8>) {
        (**self).send_opinion(bytes)
    }
}
