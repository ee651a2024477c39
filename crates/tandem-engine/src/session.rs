//! Authoritative ephemeral sessions.
//!
//! A session is interactive state that outlives a single command, such as
//! an in-progress trade, and is referenced on the wire by a stable
//! [`SessionId`]. Sessions are only ever opened while a command executes,
//! so every peer opens the same session with the same id at the same point.

use std::collections::BTreeMap;

use tandem_capture::ExecutionContext;
use tandem_core::{ScopeId, SessionId};

#[derive(Debug)]
struct Entry<S> {
    scope: ScopeId,
    session: S,
}

/// Open sessions of type `S`.
#[derive(Debug)]
pub struct SessionRegistry<S> {
    sessions: BTreeMap<SessionId, Entry<S>>,
    next_id: u32,
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_id: 0,
        }
    }
}

impl<S> SessionRegistry<S> {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session owned by the scope `ctx` executes in.
    ///
    /// Requiring the context keeps session creation on the command path.
    pub fn open(&mut self, ctx: &ExecutionContext<'_>, session: S) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.sessions.insert(
            id,
            Entry {
                scope: ctx.scope,
                session,
            },
        );
        log::debug!("session {id} opened in {} at tick {}", ctx.scope, ctx.tick);
        id
    }

    /// Look up an open session.
    pub fn get(&self, id: SessionId) -> Option<&S> {
        self.sessions.get(&id).map(|e| &e.session)
    }

    /// Look up an open session mutably.
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut S> {
        self.sessions.get_mut(&id).map(|e| &mut e.session)
    }

    /// Whether `id` is open. Suitable for
    /// [`EntityResolver::resolve_session`](tandem_registry::EntityResolver::resolve_session).
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Scope owning `id`.
    pub fn scope_of(&self, id: SessionId) -> Option<ScopeId> {
        self.sessions.get(&id).map(|e| e.scope)
    }

    /// Close a session, returning it.
    pub fn close(&mut self, id: SessionId) -> Option<S> {
        self.sessions.remove(&id).map(|e| e.session)
    }

    /// Close every session owned by `scope`, in id order.
    pub fn close_scope(&mut self, scope: ScopeId) -> Vec<(SessionId, S)> {
        let ids: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, e)| e.scope == scope)
            .map(|(id, _)| *id)
            .collect();
        if !ids.is_empty() {
            log::info!("closing {} session(s) of {scope}", ids.len());
        }
        ids.into_iter()
            .filter_map(|id| self.sessions.remove(&id).map(|e| (id, e.session)))
            .collect()
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is open.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Open sessions in id order.
    pub fn iter(&self) -> impl Iterator<Item = (SessionId, &S)> {
        self.sessions.iter().map(|(id, e)| (*id, &e.session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{ScopeRng, TickId};

    #[test]
    fn ids_are_sequential_and_closable() {
        let mut rng = ScopeRng::new(0);
        let ctx = ExecutionContext::new(ScopeId::Map(0), TickId(4), &mut rng);
        let mut reg = SessionRegistry::new();
        let a = reg.open(&ctx, "trade");
        let b = reg.open(&ctx, "ritual");
        assert_eq!((a, b), (SessionId(0), SessionId(1)));
        assert_eq!(reg.get(a), Some(&"trade"));
        assert_eq!(reg.scope_of(b), Some(ScopeId::Map(0)));

        assert_eq!(reg.close(a), Some("trade"));
        assert!(!reg.contains(a));
        assert_eq!(reg.close(a), None);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn teardown_closes_only_that_scope() {
        let mut rng = ScopeRng::new(0);
        let mut reg = SessionRegistry::new();
        {
            let ctx = ExecutionContext::new(ScopeId::Map(0), TickId(0), &mut rng);
            reg.open(&ctx, 1);
            reg.open(&ctx, 2);
        }
        let ctx = ExecutionContext::new(ScopeId::Global, TickId(0), &mut rng);
        let kept = reg.open(&ctx, 3);

        let closed = reg.close_scope(ScopeId::Map(0));
        assert_eq!(closed, vec![(SessionId(0), 1), (SessionId(1), 2)]);
        assert_eq!(reg.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![kept]);
    }

    #[test]
    fn sessions_are_mutable_in_place() {
        let mut rng = ScopeRng::new(0);
        let ctx = ExecutionContext::new(ScopeId::Global, TickId(0), &mut rng);
        let mut reg = SessionRegistry::new();
        let id = reg.open(&ctx, vec![1]);
        reg.get_mut(id).unwrap().push(2);
        assert_eq!(reg.get(id), Some(&vec![1, 2]));
    }
}
