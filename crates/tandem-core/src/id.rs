//! Strongly-typed identifiers.

use std::fmt;

/// Discrete simulation step counter.
///
/// Commands are stamped with the tick at which they must execute. Ticks
/// are per scope; two scopes may sit at different ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickId(pub u32);

impl TickId {
    /// The tick `n` steps after this one, saturating at `u32::MAX`.
    pub fn offset(self, n: u32) -> Self {
        Self(self.0.saturating_add(n))
    }

    /// The immediately following tick.
    pub fn next(self) -> Self {
        self.offset(1)
    }
}

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TickId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// A unit of independent deterministic progress.
///
/// Either the global (world) timeline or one specific sub-simulation
/// such as a single map. Each scope owns its own command queue and
/// random stream; scopes never share mutable state directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeId {
    /// The global timeline.
    Global,
    /// A specific sub-simulation, identified by its index.
    Map(u32),
}

impl ScopeId {
    /// Wire value of [`ScopeId::Global`].
    pub const GLOBAL_WIRE: i32 = -1;

    /// Encode as the signed 32-bit wire value (`-1` = global).
    ///
    /// Map indices above `i32::MAX` are not representable on the wire
    /// and are clamped; [`ScopeId::is_wire_representable`] reports this.
    pub fn to_wire(self) -> i32 {
        match self {
            Self::Global => Self::GLOBAL_WIRE,
            Self::Map(id) => i32::try_from(id).unwrap_or(i32::MAX),
        }
    }

    /// Decode from the signed 32-bit wire value.
    ///
    /// Returns `None` for negative values other than `-1`.
    pub fn from_wire(raw: i32) -> Option<Self> {
        match raw {
            Self::GLOBAL_WIRE => Some(Self::Global),
            n if n >= 0 => Some(Self::Map(n as u32)),
            _ => None,
        }
    }

    /// Whether this id round-trips through [`to_wire`](Self::to_wire).
    pub fn is_wire_representable(self) -> bool {
        match self {
            Self::Global => true,
            Self::Map(id) => id <= i32::MAX as u32,
        }
    }

    /// Whether this is the global scope.
    pub fn is_global(self) -> bool {
        matches!(self, Self::Global)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Map(id) => write!(f, "map#{id}"),
        }
    }
}

/// Index into the frozen handler table.
///
/// Assigned once at startup from a load-order-independent ordering, so
/// the same handler has the same id on every peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u32);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric identity of a simulation entity within its scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for EntityId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identity of an ephemeral interactive session (e.g. a negotiation).
///
/// Allocated by a session registry counter that only advances on the
/// authoritative execution path, so the same session gets the same id on
/// every peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable short hash of a static definition (content data shared by all peers).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefId(pub u16);

impl fmt::Display for DefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a connected peer, assigned by the authoritative sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_scope_is_minus_one_on_the_wire() {
        assert_eq!(ScopeId::Global.to_wire(), -1);
        assert_eq!(ScopeId::from_wire(-1), Some(ScopeId::Global));
    }

    #[test]
    fn map_scope_round_trips() {
        assert_eq!(ScopeId::from_wire(ScopeId::Map(7).to_wire()), Some(ScopeId::Map(7)));
        assert_eq!(ScopeId::from_wire(0), Some(ScopeId::Map(0)));
    }

    #[test]
    fn other_negative_scopes_are_rejected() {
        assert_eq!(ScopeId::from_wire(-2), None);
        assert_eq!(ScopeId::from_wire(i32::MIN), None);
    }

    #[test]
    fn oversized_map_index_is_not_representable() {
        assert!(!ScopeId::Map(u32::MAX).is_wire_representable());
        assert!(ScopeId::Map(i32::MAX as u32).is_wire_representable());
    }

    #[test]
    fn tick_offset_saturates() {
        assert_eq!(TickId(u32::MAX).next(), TickId(u32::MAX));
        assert_eq!(TickId(5).offset(3), TickId(8));
    }
}
