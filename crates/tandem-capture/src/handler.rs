//! Declarative handler descriptions.
//!
//! Member access is expressed as plain function pointers over the host
//! world type `W`, checked by the compiler, rather than textual member
//! paths resolved at runtime.

use std::time::Duration;

use tandem_core::{InvokeError, ScopeId};
use tandem_registry::{TypeRef, Value};

use crate::closure::{ClosureEnv, ClosureShape};
use crate::context::{ContextFlags, ExecutionContext};

/// How often buffered changes of a field are flushed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushInterval {
    /// Every `n` milliseconds of local wall-clock time.
    Millis(u64),
    /// Every `n` simulated ticks of the target's scope.
    Ticks(u32),
}

impl Default for FlushInterval {
    fn default() -> Self {
        Self::Millis(200)
    }
}

/// Attributes shared by every handler kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlerMeta {
    /// Payload layout version; folded into the table fingerprint.
    pub version: u16,
    /// Ambient values captured alongside the payload.
    pub flags: ContextFlags,
    /// Whether the handler only runs in debug mode.
    pub debug_only: bool,
}

impl Default for HandlerMeta {
    fn default() -> Self {
        Self {
            version: 1,
            flags: ContextFlags::NONE,
            debug_only: false,
        }
    }
}

/// Reads a field's live value: `(world, scope, target, index)`.
///
/// `None` if the target no longer resolves.
pub type FieldGetter<W> = fn(&W, ScopeId, &Value, Option<i32>) -> Option<Value>;
/// Writes a field: `(world, scope, target, index, value)`.
pub type FieldSetter<W> = fn(&mut W, ScopeId, &Value, Option<i32>, Value) -> Result<(), InvokeError>;
/// Runs around a field write with the decoded target.
pub type ApplyHook<W> = fn(&mut W, &mut ExecutionContext<'_>, &Value);
/// Invokes an operation: `(world, ctx, target, args)`.
pub type OperationFn<W> =
    fn(&mut W, &mut ExecutionContext<'_>, &Value, &[Value]) -> Result<(), InvokeError>;
/// Invokes a closure-shaped action with its decoded environment.
pub type ClosureFn<W> = fn(&mut W, &mut ExecutionContext<'_>, &ClosureEnv) -> Result<(), InvokeError>;

macro_rules! meta_setters {
    () => {
        /// Set the payload layout version.
        pub fn version(mut self, version: u16) -> Self {
            self.meta.version = version;
            self
        }

        /// Also capture these ambient values with every command.
        pub fn flags(mut self, flags: ContextFlags) -> Self {
            self.meta.flags = self.meta.flags | flags;
            self
        }

        /// Only capture and execute in debug mode.
        pub fn debug_only(mut self) -> Self {
            self.meta.debug_only = true;
            self
        }

        /// Shared attributes.
        pub fn meta(&self) -> &HandlerMeta {
            &self.meta
        }
    };
}

// ── Field ──────────────────────────────────────────────────────────

/// "Set member M of target T to value V, optionally at index I."
pub struct FieldHandler<W> {
    pub(crate) name: String,
    pub(crate) target: TypeRef,
    pub(crate) value: TypeRef,
    pub(crate) indexed: bool,
    pub(crate) get: FieldGetter<W>,
    pub(crate) set: FieldSetter<W>,
    pub(crate) pre_hook: Option<ApplyHook<W>>,
    pub(crate) post_hook: Option<ApplyHook<W>>,
    pub(crate) flush_interval: Option<FlushInterval>,
    pub(crate) meta: HandlerMeta,
}

impl<W> FieldHandler<W> {
    /// Declare a field of `target` holding a `value`.
    ///
    /// Use [`TypeRef::Unit`] as the target for a field of the scope itself.
    pub fn new(
        name: &str,
        target: TypeRef,
        value: TypeRef,
        get: FieldGetter<W>,
        set: FieldSetter<W>,
    ) -> Self {
        Self {
            name: name.to_string(),
            target,
            value,
            indexed: false,
            get,
            set,
            pre_hook: None,
            post_hook: None,
            flush_interval: None,
            meta: HandlerMeta::default(),
        }
    }

    /// The field is a sequence addressed by an `i32` index.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Run `hook` before the write.
    pub fn pre_hook(mut self, hook: ApplyHook<W>) -> Self {
        self.pre_hook = Some(hook);
        self
    }

    /// Run `hook` after the write.
    pub fn post_hook(mut self, hook: ApplyHook<W>) -> Self {
        self.post_hook = Some(hook);
        self
    }

    /// Override the engine-wide flush interval for buffered changes.
    pub fn flush_interval(mut self, interval: FlushInterval) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    meta_setters!();

    /// Handler name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static type of the target.
    pub fn target_type(&self) -> &TypeRef {
        &self.target
    }

    /// Static type of the value.
    pub fn value_type(&self) -> &TypeRef {
        &self.value
    }

    /// Whether writes carry an index.
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Per-field flush interval, if overridden.
    pub fn flush_override(&self) -> Option<FlushInterval> {
        self.flush_interval
    }

    /// Read the live value.
    pub fn read(&self, world: &W, scope: ScopeId, target: &Value, index: Option<i32>) -> Option<Value> {
        (self.get)(world, scope, target, index)
    }

    /// Write directly, bypassing the network.
    ///
    /// Only for local rollback of buffered changes; authoritative writes
    /// arrive as commands.
    pub fn write(
        &self,
        world: &mut W,
        scope: ScopeId,
        target: &Value,
        index: Option<i32>,
        value: Value,
    ) -> Result<(), InvokeError> {
        (self.set)(world, scope, target, index, value)
    }
}

// ── Operation ──────────────────────────────────────────────────────

/// "Invoke operation O on target T with arguments A."
pub struct OperationHandler<W> {
    pub(crate) name: String,
    pub(crate) target: TypeRef,
    pub(crate) args: Vec<TypeRef>,
    pub(crate) invoke: OperationFn<W>,
    pub(crate) cancel_if_absent: bool,
    pub(crate) cancel_if_no_selection: bool,
    pub(crate) min_interval: Option<Duration>,
    pub(crate) meta: HandlerMeta,
}

impl<W> OperationHandler<W> {
    /// Declare an operation on `target` taking `args`.
    ///
    /// Use [`TypeRef::Unit`] as the target for an operation on the scope.
    pub fn new(name: &str, target: TypeRef, args: &[TypeRef], invoke: OperationFn<W>) -> Self {
        Self {
            name: name.to_string(),
            target,
            args: args.to_vec(),
            invoke,
            cancel_if_absent: false,
            cancel_if_no_selection: false,
            min_interval: None,
            meta: HandlerMeta::default(),
        }
    }

    /// Drop the command when a non-nullable argument decodes as absent.
    pub fn cancel_if_absent(mut self) -> Self {
        self.cancel_if_absent = true;
        self
    }

    /// Drop the command when the decoded selection is empty.
    ///
    /// Implies capturing the selection.
    pub fn cancel_if_no_selection(mut self) -> Self {
        self.cancel_if_no_selection = true;
        self.meta.flags = self.meta.flags | ContextFlags::SELECTION;
        self
    }

    /// Suppress captures for the same target closer together than `interval`.
    pub fn throttle(mut self, interval: Duration) -> Self {
        self.min_interval = Some(interval);
        self
    }

    meta_setters!();

    /// Handler name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared argument types.
    pub fn arg_types(&self) -> &[TypeRef] {
        &self.args
    }
}

// ── Closure ────────────────────────────────────────────────────────

/// "Invoke unit of work U", for an action shape declared at startup.
pub struct ClosureHandler<W> {
    pub(crate) name: String,
    pub(crate) shape: ClosureShape,
    pub(crate) invoke: ClosureFn<W>,
    pub(crate) meta: HandlerMeta,
}

impl<W> ClosureHandler<W> {
    /// Declare `operation` over instances of `shape`.
    ///
    /// The handler is named `Shape.operation`.
    pub fn new(shape: ClosureShape, operation: &str, invoke: ClosureFn<W>) -> Self {
        Self {
            name: format!("{}.{operation}", shape.name()),
            shape,
            invoke,
            meta: HandlerMeta::default(),
        }
    }

    meta_setters!();

    /// Handler name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The flattened shape.
    pub fn shape(&self) -> &ClosureShape {
        &self.shape
    }
}

// ── Kind ───────────────────────────────────────────────────────────

/// A registered handler of any kind.
pub enum HandlerKind<W> {
    /// Field handler.
    Field(FieldHandler<W>),
    /// Operation handler.
    Operation(OperationHandler<W>),
    /// Closure handler.
    Closure(ClosureHandler<W>),
}

impl<W> HandlerKind<W> {
    /// Handler name.
    pub fn name(&self) -> &str {
        match self {
            Self::Field(h) => &h.name,
            Self::Operation(h) => &h.name,
            Self::Closure(h) => &h.name,
        }
    }

    /// Shared attributes.
    pub fn meta(&self) -> &HandlerMeta {
        match self {
            Self::Field(h) => &h.meta,
            Self::Operation(h) => &h.meta,
            Self::Closure(h) => &h.meta,
        }
    }

    /// `"field"`, `"operation"`, or `"closure"`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Field(_) => "field",
            Self::Operation(_) => "operation",
            Self::Closure(_) => "closure",
        }
    }

    /// Every static type this handler encodes, ambient values excluded.
    pub(crate) fn types(&self) -> Vec<&TypeRef> {
        match self {
            Self::Field(h) => vec![&h.target, &h.value],
            Self::Operation(h) => std::iter::once(&h.target).chain(h.args.iter()).collect(),
            Self::Closure(h) => h.shape.fields().iter().map(|(_, ty)| ty).collect(),
        }
    }
}
