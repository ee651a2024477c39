//! Out-of-band metadata that travels with a byte stream.

use tandem_core::{HandlerId, ScopeId, TickId};

/// Side channel attached to a [`ByteReader`](crate::ByteReader) or
/// [`ByteWriter`](crate::ByteWriter).
///
/// Nothing here is serialized. The context tells nested decoders which
/// scope entity references resolve against, and gives error logs the
/// handler and tick the bytes belong to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WireContext {
    /// Scope the payload belongs to.
    pub scope: Option<ScopeId>,
    /// Handler that owns the payload.
    pub handler: Option<HandlerId>,
    /// Tick the payload executes at, when known.
    pub tick: Option<TickId>,
}

impl WireContext {
    /// Context for a payload belonging to `scope`.
    pub fn for_scope(scope: ScopeId) -> Self {
        Self {
            scope: Some(scope),
            ..Self::default()
        }
    }

    /// Attach the owning handler.
    pub fn with_handler(mut self, handler: HandlerId) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Attach the execution tick.
    pub fn with_tick(mut self, tick: TickId) -> Self {
        self.tick = Some(tick);
        self
    }

    /// The scope, defaulting to global when none was attached.
    pub fn scope_or_global(&self) -> ScopeId {
        self.scope.unwrap_or(ScopeId::Global)
    }
}
