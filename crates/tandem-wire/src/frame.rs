//! Command framing.
//!
//! Two shapes exist on the wire. A *pending* command travels from the
//! capturing peer to the sequencer and carries only the handler id and
//! payload (the scope is passed alongside by the transport). A *stamped*
//! command frame carries everything every peer needs to execute it.

use tandem_core::{Command, HandlerId, PendingCommand, ScopeId, TickId};

use crate::error::WireError;
use crate::reader::ByteReader;
use crate::writer::ByteWriter;

/// Encode a stamped command frame.
///
/// ```text
/// [handler u32] [tick u32] [scope i32] [payload u32 len + bytes]
/// ```
pub fn encode_command(cmd: &Command) -> Result<Vec<u8>, WireError> {
    let mut w = ByteWriter::new();
    write_command(&mut w, cmd)?;
    Ok(w.into_bytes())
}

/// Append a stamped command frame to an existing writer.
pub fn write_command(w: &mut ByteWriter, cmd: &Command) -> Result<(), WireError> {
    w.write_u32(cmd.handler.0);
    w.write_u32(cmd.tick.0);
    w.write_i32(cmd.scope.to_wire());
    w.write_bytes(&cmd.payload)
}

/// Decode a stamped command frame, rejecting trailing bytes.
pub fn decode_command(bytes: &[u8]) -> Result<Command, WireError> {
    let mut r = ByteReader::new(bytes);
    let cmd = read_command(&mut r)?;
    r.finish()?;
    Ok(cmd)
}

/// Read one stamped command frame from a reader.
pub fn read_command(r: &mut ByteReader<'_>) -> Result<Command, WireError> {
    let handler = HandlerId(r.read_u32()?);
    let tick = TickId(r.read_u32()?);
    let raw_scope = r.read_i32()?;
    let scope = ScopeId::from_wire(raw_scope).ok_or(WireError::InvalidScope { raw: raw_scope })?;
    let payload = r.read_bytes()?.to_vec();
    Ok(Command {
        handler,
        tick,
        scope,
        payload,
    })
}

/// Encode a pending command for [`Transport::send_command`](tandem_core::Transport::send_command).
///
/// ```text
/// [handler u32] [payload bytes, unprefixed]
/// ```
pub fn encode_pending(cmd: &PendingCommand) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_u32(cmd.handler.0);
    w.write_raw(&cmd.payload);
    w.into_bytes()
}

/// Rebuild a stamped command from a sequencer delivery.
///
/// `bytes` is exactly what [`encode_pending`] produced on the capturing
/// peer; the sequencer supplies the scope and tick.
pub fn decode_delivery(scope: ScopeId, tick: TickId, bytes: &[u8]) -> Result<Command, WireError> {
    let mut r = ByteReader::new(bytes);
    let handler = HandlerId(r.read_u32()?);
    let payload = r.read_rest().to_vec();
    Ok(Command {
        handler,
        tick,
        scope,
        payload,
    })
}
