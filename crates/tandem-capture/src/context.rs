//! Execution context and ambient state.
//!
//! Handlers never read ambient values (mouse cell, selection, modifier
//! keys) from globals. The originating peer captures the values a handler
//! declares in its [`ContextFlags`]; the receiving peer decodes them into
//! the [`ExecutionContext`] for the duration of that one command and
//! restores the previous values afterwards, on every exit path.

use std::fmt;
use std::ops::{BitOr, Deref, DerefMut};

use smallvec::SmallVec;
use tandem_core::{ScopeId, ScopeRng, TickId};
use tandem_registry::{DecodeError, EncodeError, EntityResolver, TypeRef, TypeRegistry, Value};
use tandem_wire::{ByteReader, ByteWriter};

// ── Ambient ────────────────────────────────────────────────────────

/// A cell on a map's ground plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellCoord {
    /// Column.
    pub x: i32,
    /// Row.
    pub z: i32,
}

impl CellCoord {
    /// Create a cell coordinate.
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// Ambient user-interface state a command may depend on.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ambient {
    /// Cell under the cursor, if any.
    pub mouse_cell: Option<CellCoord>,
    /// Current multi-selection, as entity reference values.
    pub selection: SmallVec<[Value; 4]>,
    /// Whether the "queue instead of replace" modifier is held.
    pub queue_modifier: bool,
}

// ── ContextFlags ───────────────────────────────────────────────────

/// Which ambient values a handler captures alongside its payload.
///
/// On the wire they always appear in the order mouse cell, selection,
/// queue modifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ContextFlags(u8);

impl ContextFlags {
    /// No ambient values.
    pub const NONE: Self = Self(0);
    /// The cell under the cursor.
    pub const MOUSE_CELL: Self = Self(1);
    /// The current multi-selection.
    pub const SELECTION: Self = Self(1 << 1);
    /// The queue modifier key.
    pub const QUEUE_MODIFIER: Self = Self(1 << 2);

    /// Whether every flag in `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flag is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bits, as folded into the handler table fingerprint.
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for ContextFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for ContextFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        if self.contains(Self::MOUSE_CELL) {
            set.entry(&"mouse_cell");
        }
        if self.contains(Self::SELECTION) {
            set.entry(&"selection");
        }
        if self.contains(Self::QUEUE_MODIFIER) {
            set.entry(&"queue_modifier");
        }
        set.finish()
    }
}

pub(crate) fn write_ambient(
    w: &mut ByteWriter,
    registry: &TypeRegistry,
    flags: ContextFlags,
    selection_type: &TypeRef,
    ambient: &Ambient,
) -> Result<(), EncodeError> {
    if flags.contains(ContextFlags::MOUSE_CELL) {
        match ambient.mouse_cell {
            Some(cell) => {
                w.write_bool(true);
                w.write_i32(cell.x);
                w.write_i32(cell.z);
            }
            None => w.write_bool(false),
        }
    }
    if flags.contains(ContextFlags::SELECTION) {
        let list = Value::List(ambient.selection.to_vec());
        registry.encode(w, &TypeRef::list(selection_type.clone()), &list)?;
    }
    if flags.contains(ContextFlags::QUEUE_MODIFIER) {
        w.write_bool(ambient.queue_modifier);
    }
    Ok(())
}

/// Decode the flagged ambient values; unflagged ones stay at their defaults.
///
/// Selected entities that no longer resolve are dropped from the selection.
pub(crate) fn read_ambient(
    r: &mut ByteReader<'_>,
    registry: &TypeRegistry,
    flags: ContextFlags,
    selection_type: &TypeRef,
    resolver: &dyn EntityResolver,
) -> Result<Ambient, DecodeError> {
    let mut ambient = Ambient::default();
    if flags.contains(ContextFlags::MOUSE_CELL) && r.read_bool()? {
        let x = r.read_i32()?;
        let z = r.read_i32()?;
        ambient.mouse_cell = Some(CellCoord { x, z });
    }
    if flags.contains(ContextFlags::SELECTION) {
        if let Value::List(items) =
            registry.decode(r, &TypeRef::list(selection_type.clone()), resolver)?
        {
            ambient.selection = items.into_iter().filter(|v| !v.is_null()).collect();
        }
    }
    if flags.contains(ContextFlags::QUEUE_MODIFIER) {
        ambient.queue_modifier = r.read_bool()?;
    }
    Ok(ambient)
}

// ── ExecutionContext ───────────────────────────────────────────────

/// Everything a handler may consult while applying one command.
///
/// Threaded explicitly through the scheduler and handler call chain; there
/// is no "current scope" or "current selection" global.
pub struct ExecutionContext<'a> {
    /// The scope the command executes in.
    pub scope: ScopeId,
    /// The tick being simulated.
    pub tick: TickId,
    /// The scope's random stream. Every draw must come from here.
    pub rng: &'a mut ScopeRng,
    /// Ambient values decoded for the current command.
    pub ambient: Ambient,
    /// Whether debug-only handlers may run.
    pub debug_mode: bool,
}

impl<'a> ExecutionContext<'a> {
    /// Context for work in `scope` at `tick`.
    pub fn new(scope: ScopeId, tick: TickId, rng: &'a mut ScopeRng) -> Self {
        Self {
            scope,
            tick,
            rng,
            ambient: Ambient::default(),
            debug_mode: false,
        }
    }

    /// Install `ambient` until the returned guard is dropped.
    ///
    /// The previous ambient is restored on drop, including during unwinding.
    pub fn with_ambient(&mut self, ambient: Ambient) -> AmbientGuard<'_, 'a> {
        let saved = std::mem::replace(&mut self.ambient, ambient);
        AmbientGuard {
            ctx: self,
            saved: Some(saved),
        }
    }
}

impl fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("scope", &self.scope)
            .field("tick", &self.tick)
            .field("ambient", &self.ambient)
            .field("debug_mode", &self.debug_mode)
            .finish_non_exhaustive()
    }
}

/// Restores the previous ambient state when dropped.
pub struct AmbientGuard<'c, 'a> {
    ctx: &'c mut ExecutionContext<'a>,
    saved: Option<Ambient>,
}

impl<'a> Deref for AmbientGuard<'_, 'a> {
    type Target = ExecutionContext<'a>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl<'a> DerefMut for AmbientGuard<'_, 'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for AmbientGuard<'_, '_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.ctx.ambient = saved;
        }
    }
}
