//! Per-scope command journal.
//!
//! A journal is an opaque byte blob recording, for every simulated tick of
//! one scope, the commands that ran and the random-stream state after the
//! tick. Replaying it into a fresh engine and comparing the recorded
//! states is a determinism check. It is not a save format.
//!
//! ```text
//! header: [magic "TDMJ"] [version u8] [scope i32] [initial state]
//! frame:  [tick u32] [count u32] ([handler u32] [payload u32 len + bytes])* [state]
//! state:  [seed u64] [word_pos lo u64] [word_pos hi u64]
//! ```

use thiserror::Error;

use tandem_core::{Command, HandlerId, RngState, ScopeId, TickId};
use tandem_wire::{ByteReader, ByteWriter, WireError};

/// Magic bytes opening every journal.
pub const MAGIC: [u8; 4] = *b"TDMJ";
/// Current journal format version.
pub const FORMAT_VERSION: u8 = 1;

/// Errors reading or writing a journal.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum JournalError {
    /// The blob does not start with `TDMJ`.
    #[error("invalid journal magic")]
    InvalidMagic,
    /// The blob was written by an incompatible version.
    #[error("unsupported journal version {found}")]
    UnsupportedVersion {
        /// Version byte found.
        found: u8,
    },
    /// Truncated or corrupt data.
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// One recorded tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalFrame {
    /// Tick simulated.
    pub tick: TickId,
    /// Commands executed, in execution order.
    pub commands: Vec<Command>,
    /// Random-stream state after the tick.
    pub state: RngState,
}

fn write_state(w: &mut ByteWriter, state: RngState) {
    w.write_u64(state.seed);
    w.write_u64(state.word_pos as u64);
    w.write_u64((state.word_pos >> 64) as u64);
}

fn read_state(r: &mut ByteReader<'_>) -> Result<RngState, WireError> {
    let seed = r.read_u64()?;
    let lo = r.read_u64()? as u128;
    let hi = r.read_u64()? as u128;
    Ok(RngState {
        seed,
        word_pos: lo | (hi << 64),
    })
}

// ── Writer ─────────────────────────────────────────────────────────

/// Appends frames to an in-memory journal.
#[derive(Debug)]
pub struct JournalWriter {
    buf: ByteWriter,
    scope: ScopeId,
    frames: u64,
}

impl JournalWriter {
    /// Start a journal of `scope` whose stream is at `initial`.
    pub fn new(scope: ScopeId, initial: RngState) -> Self {
        let mut buf = ByteWriter::new();
        buf.write_raw(&MAGIC);
        buf.write_u8(FORMAT_VERSION);
        buf.write_i32(scope.to_wire());
        write_state(&mut buf, initial);
        Self {
            buf,
            scope,
            frames: 0,
        }
    }

    /// Scope being recorded.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Record one tick.
    pub fn record(&mut self, tick: TickId, commands: &[Command], state: RngState) -> Result<(), JournalError> {
        self.buf.write_u32(tick.0);
        self.buf.write_u32(commands.len() as u32);
        for cmd in commands {
            self.buf.write_u32(cmd.handler.0);
            self.buf.write_bytes(&cmd.payload)?;
        }
        write_state(&mut self.buf, state);
        self.frames += 1;
        Ok(())
    }

    /// Number of frames recorded.
    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// The journal bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.into_bytes()
    }
}

// ── Reader ─────────────────────────────────────────────────────────

/// Reads frames back from a journal blob.
#[derive(Debug)]
pub struct JournalReader<'a> {
    r: ByteReader<'a>,
    scope: ScopeId,
    initial: RngState,
    frames_read: u64,
}

impl<'a> JournalReader<'a> {
    /// Validate the header of `bytes`.
    pub fn open(bytes: &'a [u8]) -> Result<Self, JournalError> {
        let mut r = ByteReader::new(bytes);
        let mut magic = [0u8; 4];
        for b in &mut magic {
            *b = r.read_u8().map_err(|_| JournalError::InvalidMagic)?;
        }
        if magic != MAGIC {
            return Err(JournalError::InvalidMagic);
        }
        let version = r.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(JournalError::UnsupportedVersion { found: version });
        }
        let raw = r.read_i32()?;
        let scope = ScopeId::from_wire(raw).ok_or(WireError::InvalidScope { raw })?;
        let initial = read_state(&mut r)?;
        Ok(Self {
            r,
            scope,
            initial,
            frames_read: 0,
        })
    }

    /// Scope the journal records.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Stream state before the first frame.
    pub fn initial_state(&self) -> RngState {
        self.initial
    }

    /// The next frame, or `None` at the end of the blob.
    pub fn next_frame(&mut self) -> Result<Option<JournalFrame>, JournalError> {
        if self.r.is_empty() {
            return Ok(None);
        }
        let tick = TickId(self.r.read_u32()?);
        let count = self.r.read_u32()? as usize;
        let mut commands = Vec::with_capacity(count.min(self.r.remaining() / 8));
        for _ in 0..count {
            let handler = HandlerId(self.r.read_u32()?);
            let payload = self.r.read_bytes()?.to_vec();
            commands.push(Command {
                handler,
                tick,
                scope: self.scope,
                payload,
            });
        }
        let state = read_state(&mut self.r)?;
        self.frames_read += 1;
        Ok(Some(JournalFrame {
            tick,
            commands,
            state,
        }))
    }

    /// Number of frames read so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}
