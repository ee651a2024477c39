//! The handler table: stable ids and the encode path.

use std::fmt;
use std::sync::Arc;

use tandem_core::{HandlerId, PendingCommand, ScopeId};
use tandem_registry::{EncodeError, TypeRef, TypeRegistry, Value};
use tandem_wire::{ByteWriter, Fnv1a, WireContext};

use crate::closure::ClosureEnv;
use crate::context::{write_ambient, Ambient, ContextFlags};
use crate::error::{CaptureError, RegistrationError};
use crate::handler::{ClosureHandler, FieldHandler, HandlerKind, OperationHandler};

macro_rules! handle_type {
    ($name:ident, $what:literal) => {
        #[doc = concat!("Local handle to a registered ", $what, " handler.")]
        ///
        /// Handles index registration order, which may differ between
        /// peers; only the [`HandlerId`] it maps to crosses the wire.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(usize);
    };
}

handle_type!(FieldHandle, "field");
handle_type!(OperationHandle, "operation");
handle_type!(ClosureHandle, "closure");

// ── Builder ────────────────────────────────────────────────────────

/// Collects handlers at startup.
pub struct HandlerTableBuilder<W> {
    registry: Arc<TypeRegistry>,
    selection_type: Option<TypeRef>,
    entries: Vec<HandlerKind<W>>,
}

impl<W> HandlerTableBuilder<W> {
    /// Start a table whose payloads use `registry`.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            selection_type: None,
            entries: Vec::new(),
        }
    }

    /// Element type of the captured multi-selection.
    pub fn selection_type(&mut self, ty: TypeRef) -> &mut Self {
        self.selection_type = Some(ty);
        self
    }

    /// Register a field handler.
    pub fn register_field(&mut self, handler: FieldHandler<W>) -> FieldHandle {
        self.entries.push(HandlerKind::Field(handler));
        FieldHandle(self.entries.len() - 1)
    }

    /// Register an operation handler.
    pub fn register_operation(&mut self, handler: OperationHandler<W>) -> OperationHandle {
        self.entries.push(HandlerKind::Operation(handler));
        OperationHandle(self.entries.len() - 1)
    }

    /// Register a closure handler.
    pub fn register_closure(&mut self, handler: ClosureHandler<W>) -> ClosureHandle {
        self.entries.push(HandlerKind::Closure(handler));
        ClosureHandle(self.entries.len() - 1)
    }

    /// Validate and assign ids.
    ///
    /// Ids follow handler-name order, so they do not depend on the order
    /// in which code registered the handlers.
    pub fn build(self) -> Result<HandlerTable<W>, RegistrationError> {
        if u32::try_from(self.entries.len()).is_err() {
            return Err(RegistrationError::TooManyHandlers {
                count: self.entries.len(),
            });
        }
        for entry in &self.entries {
            for ty in entry.types() {
                self.registry
                    .check(ty)
                    .map_err(|source| RegistrationError::UnknownType {
                        handler: entry.name().to_string(),
                        source,
                    })?;
            }
            if entry.meta().flags.contains(ContextFlags::SELECTION) {
                match &self.selection_type {
                    None => {
                        return Err(RegistrationError::NoSelectionType {
                            handler: entry.name().to_string(),
                        })
                    }
                    Some(ty) => {
                        self.registry
                            .check(ty)
                            .map_err(|source| RegistrationError::UnknownType {
                                handler: entry.name().to_string(),
                                source,
                            })?
                    }
                }
            }
        }

        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by(|&a, &b| self.entries[a].name().cmp(self.entries[b].name()));
        for pair in order.windows(2) {
            if self.entries[pair[0]].name() == self.entries[pair[1]].name() {
                return Err(RegistrationError::DuplicateName {
                    name: self.entries[pair[0]].name().to_string(),
                });
            }
        }

        let mut slots = vec![HandlerId(0); self.entries.len()];
        for (id, &slot) in order.iter().enumerate() {
            slots[slot] = HandlerId(id as u32);
        }
        let mut entries: Vec<Option<HandlerKind<W>>> = self.entries.into_iter().map(Some).collect();
        let handlers: Vec<HandlerKind<W>> = order
            .iter()
            .filter_map(|&slot| entries[slot].take())
            .collect();

        let table = HandlerTable {
            fingerprint: fingerprint(&handlers, &self.registry),
            registry: self.registry,
            selection_type: self.selection_type.unwrap_or(TypeRef::Unit),
            handlers,
            slots,
        };
        log::info!(
            "handler table built: {} handlers, fingerprint {:016x}",
            table.len(),
            table.fingerprint
        );
        Ok(table)
    }
}

fn fingerprint<W>(handlers: &[HandlerKind<W>], registry: &TypeRegistry) -> u64 {
    let mut h = Fnv1a::new();
    h.write_u64(registry.fingerprint());
    for (id, handler) in handlers.iter().enumerate() {
        let meta = handler.meta();
        h.write_u32(id as u32);
        h.write_str(handler.name());
        h.write_str(handler.kind_name());
        h.write_u32(meta.version as u32);
        h.write_u8(meta.flags.bits());
        h.write_u8(meta.debug_only as u8);
    }
    h.finish()
}

// ── Table ──────────────────────────────────────────────────────────

/// Immutable, id-indexed handler table shared by every peer.
pub struct HandlerTable<W> {
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) selection_type: TypeRef,
    pub(crate) handlers: Vec<HandlerKind<W>>,
    slots: Vec<HandlerId>,
    fingerprint: u64,
}

impl<W> fmt::Debug for HandlerTable<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("handlers", &self.handlers.iter().map(HandlerKind::name).collect::<Vec<_>>())
            .field("fingerprint", &format!("{:016x}", self.fingerprint))
            .finish()
    }
}

impl<W> HandlerTable<W> {
    /// The type registry payloads are encoded with.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Number of handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Digest of ids, names, kinds, versions and flags, plus the registry.
    ///
    /// Peers whose fingerprints differ cannot interoperate.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Handler by wire id.
    pub fn get(&self, id: HandlerId) -> Option<&HandlerKind<W>> {
        self.handlers.get(id.0 as usize)
    }

    /// Wire id of a handler name.
    pub fn id_by_name(&self, name: &str) -> Option<HandlerId> {
        self.handlers
            .binary_search_by(|h| h.name().cmp(name))
            .ok()
            .map(|i| HandlerId(i as u32))
    }

    /// Display name of a wire id, for diagnostics.
    pub fn name_of(&self, id: HandlerId) -> &str {
        self.get(id).map_or("<unknown>", HandlerKind::name)
    }

    fn slot(&self, slot: usize, expected: &'static str) -> Result<HandlerId, CaptureError> {
        self.slots
            .get(slot)
            .copied()
            .ok_or(CaptureError::WrongHandlerKind {
                id: HandlerId(u32::MAX),
                expected,
            })
    }

    /// Wire id and declaration of a field handle.
    pub fn field(&self, handle: FieldHandle) -> Result<(HandlerId, &FieldHandler<W>), CaptureError> {
        let id = self.slot(handle.0, "field")?;
        match self.get(id) {
            Some(HandlerKind::Field(h)) => Ok((id, h)),
            _ => Err(CaptureError::WrongHandlerKind {
                id,
                expected: "field",
            }),
        }
    }

    /// Wire id and declaration of an operation handle.
    pub fn operation(
        &self,
        handle: OperationHandle,
    ) -> Result<(HandlerId, &OperationHandler<W>), CaptureError> {
        let id = self.slot(handle.0, "operation")?;
        match self.get(id) {
            Some(HandlerKind::Operation(h)) => Ok((id, h)),
            _ => Err(CaptureError::WrongHandlerKind {
                id,
                expected: "operation",
            }),
        }
    }

    /// Wire id and declaration of a closure handle.
    pub fn closure(&self, handle: ClosureHandle) -> Result<(HandlerId, &ClosureHandler<W>), CaptureError> {
        let id = self.slot(handle.0, "closure")?;
        match self.get(id) {
            Some(HandlerKind::Closure(h)) => Ok((id, h)),
            _ => Err(CaptureError::WrongHandlerKind {
                id,
                expected: "closure",
            }),
        }
    }

    fn writer(&self, id: HandlerId, scope: ScopeId) -> ByteWriter {
        ByteWriter::with_context(WireContext::for_scope(scope).with_handler(id))
    }

    fn finish(
        &self,
        id: HandlerId,
        scope: ScopeId,
        name: &str,
        encoded: Result<ByteWriter, EncodeError>,
    ) -> Result<PendingCommand, CaptureError> {
        match encoded {
            Ok(w) => Ok(PendingCommand {
                handler: id,
                scope,
                payload: w.into_bytes(),
            }),
            Err(source) => {
                log::error!("capture of '{name}' in {scope} failed to encode: {source}");
                Err(CaptureError::Encode {
                    handler: name.to_string(),
                    source,
                })
            }
        }
    }

    /// Encode "set field to `value`" as a pending command.
    pub fn encode_field(
        &self,
        handle: FieldHandle,
        scope: ScopeId,
        ambient: &Ambient,
        target: &Value,
        index: Option<i32>,
        value: &Value,
    ) -> Result<PendingCommand, CaptureError> {
        let (id, h) = self.field(handle)?;
        let encoded = (|| -> Result<ByteWriter, EncodeError> {
            let mut w = self.writer(id, scope);
            write_ambient(&mut w, &self.registry, h.meta.flags, &self.selection_type, ambient)?;
            self.registry.encode(&mut w, &h.target, target)?;
            if h.indexed {
                w.write_i32(index.unwrap_or(0));
            }
            self.registry.encode(&mut w, &h.value, value)?;
            Ok(w)
        })();
        self.finish(id, scope, &h.name, encoded)
    }

    /// Encode "invoke operation with `args`" as a pending command.
    pub fn encode_operation(
        &self,
        handle: OperationHandle,
        scope: ScopeId,
        ambient: &Ambient,
        target: &Value,
        args: &[Value],
    ) -> Result<PendingCommand, CaptureError> {
        let (id, h) = self.operation(handle)?;
        if args.len() != h.args.len() {
            return Err(CaptureError::ArgumentCount {
                handler: h.name.clone(),
                expected: h.args.len(),
                found: args.len(),
            });
        }
        let encoded = (|| -> Result<ByteWriter, EncodeError> {
            let mut w = self.writer(id, scope);
            write_ambient(&mut w, &self.registry, h.meta.flags, &self.selection_type, ambient)?;
            self.registry.encode(&mut w, &h.target, target)?;
            for (ty, arg) in h.args.iter().zip(args) {
                self.registry.encode(&mut w, ty, arg)?;
            }
            Ok(w)
        })();
        self.finish(id, scope, &h.name, encoded)
    }

    /// Encode "invoke this action" as a pending command.
    pub fn encode_closure(
        &self,
        handle: ClosureHandle,
        scope: ScopeId,
        ambient: &Ambient,
        env: &ClosureEnv,
    ) -> Result<PendingCommand, CaptureError> {
        let (id, h) = self.closure(handle)?;
        let mut values = Vec::with_capacity(h.shape.fields().len());
        for (path, _) in h.shape.fields() {
            let value = env.get(path).ok_or_else(|| CaptureError::MissingClosurePath {
                handler: h.name.clone(),
                path: path.clone(),
            })?;
            values.push(value);
        }
        let encoded = (|| -> Result<ByteWriter, EncodeError> {
            let mut w = self.writer(id, scope);
            write_ambient(&mut w, &self.registry, h.meta.flags, &self.selection_type, ambient)?;
            for ((_, ty), value) in h.shape.fields().iter().zip(values) {
                self.registry.encode(&mut w, ty, value)?;
            }
            Ok(w)
        })();
        self.finish(id, scope, &h.name, encoded)
    }
}
