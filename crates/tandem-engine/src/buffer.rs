//! Coalescing of rapid local edits into single commands.
//!
//! UI code that edits a field many times per second (a slider, a text box)
//! wraps each edit in a watch. The edit is observed, rolled back, and kept
//! as a *pending* value; a periodic flush sends the latest pending value as
//! one ordinary field command. Outside a watch, the live field always holds
//! the last network-confirmed value.
//!
//! Watches nest as an explicit stack. Each [`begin_watch`](ChangeBuffer::begin_watch)
//! returns a [`WatchToken`] that must be closed innermost-first. Closing an
//! outer watch early unwinds the stack down to it, so no field is left
//! showing an unconfirmed value.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use thiserror::Error;

use tandem_capture::{CaptureError, FieldHandle, FieldHandler, FlushInterval, HandlerTable};
use tandem_core::{HandlerId, InvokeError, ScopeId, TickId};
use tandem_registry::Value;

// ── Errors and outcomes ────────────────────────────────────────────

/// Errors raised by watch bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WatchError {
    /// A watch was closed while a later one was still open.
    ///
    /// Every watch down to and including `found` has been closed
    /// innermost-first; their edits are buffered and their fields rolled
    /// back. The tokens of the later watches are now stale.
    #[error("watch {found} closed while watch {innermost} is still open")]
    Crossed {
        /// Serial of the innermost open watch.
        innermost: u64,
        /// Serial of the token passed in.
        found: u64,
    },
    /// The token's watch was already closed by an earlier unwind.
    #[error("watch {serial} was already closed")]
    Closed {
        /// Serial of the token passed in.
        serial: u64,
    },
    /// The handle is unknown or the target does not encode.
    #[error(transparent)]
    Capture(#[from] CaptureError),
    /// Restoring the confirmed value failed.
    #[error("rolling back '{handler}' failed: {source}")]
    Rollback {
        /// Handler name.
        handler: String,
        /// Host error.
        source: InvokeError,
    },
}

/// What closing a watch did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The value did not change.
    Unchanged,
    /// The target did not resolve before or after the edit.
    Unresolved,
    /// A new buffered change was created.
    Buffered,
    /// An existing buffered change got a new pending value.
    Updated,
    /// An enclosing watch of the same field decides when it closes.
    Nested,
}

/// Proof of an open watch, consumed by [`ChangeBuffer::end_watch`].
#[must_use = "an open watch must be closed with end_watch"]
#[derive(Debug, PartialEq, Eq)]
pub struct WatchToken {
    serial: u64,
}

// ── Entries ────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct BufferKey {
    handler: HandlerId,
    scope: ScopeId,
    target: Vec<u8>,
    index: Option<i32>,
}

/// A locally pending value awaiting a flush.
#[derive(Clone, Debug, PartialEq)]
pub struct BufferedChange {
    /// Field edited.
    pub handle: FieldHandle,
    /// Scope of the target.
    pub scope: ScopeId,
    /// Target of the field.
    pub target: Value,
    /// Index, for indexed fields.
    pub index: Option<i32>,
    /// Last network-confirmed value.
    pub actual: Value,
    /// Value the user wants.
    pub pending: Value,
    /// Whether `pending` has been sent.
    pub sent: bool,
    stamp: Instant,
    stamp_tick: TickId,
}

struct OpenWatch {
    serial: u64,
    key: BufferKey,
    handle: FieldHandle,
    target: Value,
    before: Option<Value>,
    shadowed: bool,
}

/// Buffered changes plus the stack of open watches.
#[derive(Default)]
pub struct ChangeBuffer {
    entries: IndexMap<BufferKey, BufferedChange>,
    watches: Vec<OpenWatch>,
    next_serial: u64,
}

fn rollback<W>(
    h: &FieldHandler<W>,
    world: &mut W,
    scope: ScopeId,
    target: &Value,
    index: Option<i32>,
    value: Value,
) -> Result<(), WatchError> {
    h.write(world, scope, target, index, value)
        .map_err(|source| WatchError::Rollback {
            handler: h.name().to_string(),
            source,
        })
}

impl ChangeBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered changes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of open watches.
    pub fn depth(&self) -> usize {
        self.watches.len()
    }

    /// Buffered changes in creation order.
    pub fn changes(&self) -> impl Iterator<Item = &BufferedChange> {
        self.entries.values()
    }

    /// Open a watch around a local edit of a field.
    ///
    /// If the field already has a buffered change, its pending value is
    /// written into the live field for the duration of the watch so the
    /// edit starts from what the user last chose.
    pub fn begin_watch<W>(
        &mut self,
        table: &HandlerTable<W>,
        world: &mut W,
        handle: FieldHandle,
        scope: ScopeId,
        target: &Value,
        index: Option<i32>,
    ) -> Result<WatchToken, WatchError> {
        let (id, h) = table.field(handle)?;
        let encoded = table
            .registry()
            .to_bytes(h.target_type(), target)
            .map_err(|source| CaptureError::Encode {
                handler: h.name().to_string(),
                source,
            })?;
        let key = BufferKey {
            handler: id,
            scope,
            target: encoded,
            index,
        };

        let shadowed = self.watches.iter().any(|w| w.key == key);
        if let Some(entry) = self.entries.get_mut(&key).filter(|_| !shadowed) {
            if let Some(live) = h.read(world, scope, target, index) {
                entry.actual = live;
            }
            rollback(h, world, scope, target, index, entry.pending.clone())?;
        }
        let before = h.read(world, scope, target, index);

        let serial = self.next_serial;
        self.next_serial += 1;
        self.watches.push(OpenWatch {
            serial,
            key,
            handle,
            target: target.clone(),
            before,
            shadowed,
        });
        Ok(WatchToken { serial })
    }

    /// Close the innermost watch: compare, buffer, and roll back.
    ///
    /// Passing an outer token closes every later watch first, then the
    /// outer one, and reports [`WatchError::Crossed`].
    pub fn end_watch<W>(
        &mut self,
        table: &HandlerTable<W>,
        world: &mut W,
        token: WatchToken,
        now: Instant,
        current_tick: impl Fn(ScopeId) -> Option<TickId>,
    ) -> Result<WatchOutcome, WatchError> {
        let Some(pos) = self.watches.iter().position(|w| w.serial == token.serial) else {
            return Err(WatchError::Closed {
                serial: token.serial,
            });
        };
        let innermost = self.watches.last().map_or(token.serial, |w| w.serial);
        if innermost == token.serial {
            let watch = self.watches.remove(pos);
            return self.close(table, world, watch, now, &current_tick);
        }

        log::warn!("watch {} closed while watch {innermost} is open; unwinding", token.serial);
        while self.watches.len() > pos {
            let Some(watch) = self.watches.pop() else {
                break;
            };
            if let Err(e) = self.close(table, world, watch, now, &current_tick) {
                log::error!("unwinding watch failed: {e}");
            }
        }
        Err(WatchError::Crossed {
            innermost,
            found: token.serial,
        })
    }

    fn close<W, F>(
        &mut self,
        table: &HandlerTable<W>,
        world: &mut W,
        watch: OpenWatch,
        now: Instant,
        current_tick: &F,
    ) -> Result<WatchOutcome, WatchError>
    where
        F: Fn(ScopeId) -> Option<TickId>,
    {
        if watch.shadowed {
            return Ok(WatchOutcome::Nested);
        }
        let (_, h) = table.field(watch.handle)?;
        let (scope, index) = (watch.key.scope, watch.key.index);
        let after = h.read(world, scope, &watch.target, index);

        if let Some(entry) = self.entries.get_mut(&watch.key) {
            let actual = entry.actual.clone();
            let outcome = match (&watch.before, after) {
                (Some(before), Some(after)) if after != *before => {
                    entry.pending = after;
                    entry.sent = false;
                    WatchOutcome::Updated
                }
                (Some(_), Some(_)) => WatchOutcome::Unchanged,
                _ => return Ok(WatchOutcome::Unresolved),
            };
            rollback(h, world, scope, &watch.target, index, actual)?;
            return Ok(outcome);
        }

        let (Some(before), Some(after)) = (watch.before, after) else {
            return Ok(WatchOutcome::Unresolved);
        };
        if after == before {
            return Ok(WatchOutcome::Unchanged);
        }
        rollback(h, world, scope, &watch.target, index, before.clone())?;
        self.entries.insert(
            watch.key,
            BufferedChange {
                handle: watch.handle,
                scope,
                target: watch.target,
                index,
                actual: before,
                pending: after,
                sent: false,
                stamp: now,
                stamp_tick: current_tick(scope).unwrap_or_default(),
            },
        );
        Ok(WatchOutcome::Buffered)
    }

    /// Send every buffered change whose interval elapsed, or all of them
    /// when `force` is set.
    ///
    /// Entries whose confirmed value caught up with the pending value are
    /// removed, as are entries whose target no longer resolves. `send`
    /// is called once per change to send; returns how many were sent.
    #[allow(clippy::too_many_arguments)]
    pub fn flush<W, F>(
        &mut self,
        table: &HandlerTable<W>,
        world: &W,
        now: Instant,
        current_tick: impl Fn(ScopeId) -> Option<TickId>,
        default_interval: FlushInterval,
        force: bool,
        mut send: F,
    ) -> usize
    where
        F: FnMut(&BufferedChange) -> Result<bool, CaptureError>,
    {
        let mut sent = 0;
        self.entries.retain(|_, entry| {
            let Ok((_, h)) = table.field(entry.handle) else {
                return false;
            };
            let Some(live) = h.read(world, entry.scope, &entry.target, entry.index) else {
                log::debug!("buffered '{}' target vanished; dropped", h.name());
                return false;
            };
            entry.actual = live;
            if entry.actual == entry.pending {
                return false;
            }
            if entry.sent {
                return true;
            }

            let due = force
                || match h.flush_override().unwrap_or(default_interval) {
                    FlushInterval::Millis(ms) => {
                        now.saturating_duration_since(entry.stamp) >= Duration::from_millis(ms)
                    }
                    FlushInterval::Ticks(n) => current_tick(entry.scope)
                        .is_some_and(|t| t.0.saturating_sub(entry.stamp_tick.0) >= n),
                };
            if !due {
                return true;
            }
            match send(&*entry) {
                Ok(_) => {
                    log::debug!("flushed '{}' in {} as {}", h.name(), entry.scope, entry.pending.describe());
                    entry.sent = true;
                    entry.stamp = now;
                    if let Some(t) = current_tick(entry.scope) {
                        entry.stamp_tick = t;
                    }
                    sent += 1;
                }
                Err(e) => log::error!("flushing '{}' failed: {e}", h.name()),
            }
            true
        });
        sent
    }

    /// Drop every buffered change targeting `scope`.
    pub fn remove_scope(&mut self, scope: ScopeId) {
        self.entries.retain(|k, _| k.scope != scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tandem_capture::HandlerTableBuilder;
    use tandem_registry::{PrimKind, RegistryBuilder, TypeRef};

    #[derive(Default)]
    struct Dial {
        level: i32,
    }

    fn get(w: &Dial, _: ScopeId, _: &Value, _: Option<i32>) -> Option<Value> {
        Some(Value::I32(w.level))
    }

    fn set(w: &mut Dial, _: ScopeId, _: &Value, _: Option<i32>, v: Value) -> Result<(), InvokeError> {
        match v {
            Value::I32(level) => {
                w.level = level;
                Ok(())
            }
            _ => Err(InvokeError::BadArgument { index: 0 }),
        }
    }

    fn setup() -> (HandlerTable<Dial>, FieldHandle) {
        let registry = Arc::new(RegistryBuilder::new().build().unwrap());
        let mut b = HandlerTableBuilder::new(registry);
        let h = b.register_field(FieldHandler::new(
            "Colony.alert_level",
            TypeRef::Unit,
            PrimKind::I32.into(),
            get,
            set,
        ));
        (b.build().unwrap(), h)
    }

    fn edit(buf: &mut ChangeBuffer, table: &HandlerTable<Dial>, dial: &mut Dial, h: FieldHandle, to: i32) -> WatchOutcome {
        let token = buf
            .begin_watch(table, dial, h, ScopeId::Global, &Value::Unit, None)
            .unwrap();
        dial.level = to;
        buf.end_watch(table, dial, token, Instant::now(), |_| Some(TickId(0))).unwrap()
    }

    fn flush_all(buf: &mut ChangeBuffer, table: &HandlerTable<Dial>, dial: &Dial) -> Vec<Value> {
        let mut out = Vec::new();
        buf.flush(table, dial, Instant::now(), |_| Some(TickId(0)), FlushInterval::default(), true, |c| {
            out.push(c.pending.clone());
            Ok(true)
        });
        out
    }

    #[test]
    fn edit_is_rolled_back_and_buffered() {
        let (table, h) = setup();
        let mut dial = Dial { level: 1 };
        let mut buf = ChangeBuffer::new();
        assert_eq!(edit(&mut buf, &table, &mut dial, h, 4), WatchOutcome::Buffered);
        assert_eq!(dial.level, 1);
        let change = buf.changes().next().unwrap();
        assert_eq!((change.actual.clone(), change.pending.clone()), (Value::I32(1), Value::I32(4)));
    }

    #[test]
    fn unchanged_edit_creates_nothing() {
        let (table, h) = setup();
        let mut dial = Dial { level: 1 };
        let mut buf = ChangeBuffer::new();
        assert_eq!(edit(&mut buf, &table, &mut dial, h, 1), WatchOutcome::Unchanged);
        assert!(buf.is_empty());
    }

    #[test]
    fn edit_back_to_confirmed_sends_nothing() {
        let (table, h) = setup();
        let mut dial = Dial { level: 1 };
        let mut buf = ChangeBuffer::new();
        edit(&mut buf, &table, &mut dial, h, 7);
        assert_eq!(edit(&mut buf, &table, &mut dial, h, 1), WatchOutcome::Updated);
        assert!(flush_all(&mut buf, &table, &dial).is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn two_edits_flush_once_with_latest() {
        let (table, h) = setup();
        let mut dial = Dial { level: 1 };
        let mut buf = ChangeBuffer::new();
        edit(&mut buf, &table, &mut dial, h, 2);
        edit(&mut buf, &table, &mut dial, h, 3);
        assert_eq!(flush_all(&mut buf, &table, &dial), vec![Value::I32(3)]);
        assert!(flush_all(&mut buf, &table, &dial).is_empty());

        // The command round-trips.
        dial.level = 3;
        flush_all(&mut buf, &table, &dial);
        assert!(buf.is_empty());
    }

    #[test]
    fn watch_shows_pending_value() {
        let (table, h) = setup();
        let mut dial = Dial { level: 1 };
        let mut buf = ChangeBuffer::new();
        edit(&mut buf, &table, &mut dial, h, 5);
        let token = buf
            .begin_watch(&table, &mut dial, h, ScopeId::Global, &Value::Unit, None)
            .unwrap();
        assert_eq!(dial.level, 5);
        dial.level += 1;
        buf.end_watch(&table, &mut dial, token, Instant::now(), |_| Some(TickId(0)))
            .unwrap();
        assert_eq!(dial.level, 1);
        assert_eq!(buf.changes().next().unwrap().pending, Value::I32(6));
    }

    #[test]
    fn crossed_close_unwinds_and_rolls_back() {
        let (table, h) = setup();
        let mut dial = Dial { level: 1 };
        let mut buf = ChangeBuffer::new();
        edit(&mut buf, &table, &mut dial, h, 9);

        let outer = buf
            .begin_watch(&table, &mut dial, h, ScopeId::Global, &Value::Unit, None)
            .unwrap();
        assert_eq!(dial.level, 9);
        let inner = buf
            .begin_watch(&table, &mut dial, h, ScopeId::Global, &Value::Unit, None)
            .unwrap();
        dial.level = 4;

        let err = buf
            .end_watch(&table, &mut dial, outer, Instant::now(), |_| Some(TickId(0)))
            .unwrap_err();
        assert_eq!(err, WatchError::Crossed { innermost: 2, found: 1 });
        assert_eq!(buf.depth(), 0);
        assert_eq!(dial.level, 1);
        assert_eq!(buf.changes().next().unwrap().pending, Value::I32(4));

        let err = buf
            .end_watch(&table, &mut dial, inner, Instant::now(), |_| Some(TickId(0)))
            .unwrap_err();
        assert_eq!(err, WatchError::Closed { serial: 2 });
    }

    #[test]
    fn interval_gates_periodic_flush() {
        let (table, h) = setup();
        let mut dial = Dial { level: 0 };
        let mut buf = ChangeBuffer::new();
        edit(&mut buf, &table, &mut dial, h, 9);
        let mut sent = 0;
        let n = buf.flush(&table, &dial, Instant::now(), |_| Some(TickId(5)), FlushInterval::Ticks(30), false, |_| {
            sent += 1;
            Ok(true)
        });
        assert_eq!((n, sent), (0, 0));
        let n = buf.flush(&table, &dial, Instant::now(), |_| Some(TickId(30)), FlushInterval::Ticks(30), false, |_| Ok(true));
        assert_eq!(n, 1);
    }

    #[test]
    fn scope_removal_drops_entries() {
        let (table, h) = setup();
        let mut dial = Dial::default();
        let mut buf = ChangeBuffer::new();
        edit(&mut buf, &table, &mut dial, h, 3);
        buf.remove_scope(ScopeId::Map(0));
        assert_eq!(buf.len(), 1);
        buf.remove_scope(ScopeId::Global);
        assert!(buf.is_empty());
    }
}
