//! The host simulation seen by the engine.

use tandem_capture::ExecutionContext;
use tandem_core::ScopeId;
use tandem_registry::EntityResolver;

/// The host world driven by a [`SyncEngine`](crate::SyncEngine).
///
/// Commands mutate the world through handler accessors; everything else
/// the world does per tick happens in [`tick_scope`](Self::tick_scope),
/// which must draw randomness only from `ctx.rng`.
pub trait Simulation: EntityResolver {
    /// Run one tick of `ctx.scope`, after that tick's commands.
    fn tick_scope(&mut self, ctx: &mut ExecutionContext<'_>);

    /// `scope` was removed from the engine. Drop state it owned, such as
    /// its open sessions.
    fn scope_removed(&mut self, scope: ScopeId) {
        let _ = scope;
    }
}
