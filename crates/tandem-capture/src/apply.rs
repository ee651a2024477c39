//! The decode-and-apply path, run by every peer when a command's tick comes.

use tandem_core::HandlerId;
use tandem_registry::{DecodeError, EntityResolver, TypeRef, Value};
use tandem_wire::{ByteReader, WireContext};

use crate::closure::ClosureEnv;
use crate::context::{read_ambient, Ambient, ExecutionContext};
use crate::error::CommandError;
use crate::handler::{ClosureHandler, FieldHandler, HandlerKind, HandlerMeta, OperationHandler};
use crate::table::HandlerTable;

/// Outcome of a command that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The handler ran.
    Executed,
    /// The command was valid but deliberately not run.
    Skipped(SkipReason),
}

/// Why a valid command was not run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The target no longer resolves.
    TargetAbsent,
    /// A required argument resolved to absent and the handler cancels on that.
    ArgumentAbsent {
        /// Position of the argument.
        index: usize,
    },
    /// The selection was empty and the handler cancels on that.
    NoSelection,
    /// Debug-only handler outside debug mode.
    DebugDisabled,
}

enum Decoded {
    Field {
        target: Value,
        index: Option<i32>,
        value: Value,
    },
    Operation {
        target: Value,
        args: Vec<Value>,
    },
    Closure(ClosureEnv),
}

impl<W: EntityResolver> HandlerTable<W> {
    /// Decode `payload` for handler `id` and apply it to `world`.
    ///
    /// Ambient values decoded from the payload are installed in `ctx` for
    /// the duration of the call only. Errors leave `ctx` as it was; the
    /// world may be partially modified if the host operation itself failed
    /// midway.
    pub fn apply(
        &self,
        world: &mut W,
        ctx: &mut ExecutionContext<'_>,
        id: HandlerId,
        payload: &[u8],
    ) -> Result<Applied, CommandError> {
        let handler = self.get(id).ok_or(CommandError::UnknownHandler { id })?;
        let meta = handler.meta();
        if meta.debug_only && !ctx.debug_mode {
            log::warn!(
                "debug-only command '{}' skipped in {} at tick {}",
                handler.name(),
                ctx.scope,
                ctx.tick
            );
            return Ok(Applied::Skipped(SkipReason::DebugDisabled));
        }

        let context = WireContext::for_scope(ctx.scope)
            .with_handler(id)
            .with_tick(ctx.tick);
        let mut r = ByteReader::with_context(payload, context);
        let (ambient, decoded) = self
            .decode_payload(handler, meta, &mut r, &*world)
            .map_err(|source| CommandError::Decode {
                handler: handler.name().to_string(),
                source,
            })?;
        if !r.is_empty() {
            return Err(CommandError::TrailingBytes {
                handler: handler.name().to_string(),
                count: r.remaining(),
            });
        }

        let mut ctx = ctx.with_ambient(ambient);
        let outcome = match (handler, decoded) {
            (HandlerKind::Field(h), Decoded::Field { target, index, value }) => {
                apply_field(h, world, &mut ctx, target, index, value)
            }
            (HandlerKind::Operation(h), Decoded::Operation { target, args }) => {
                apply_operation(h, world, &mut ctx, target, args)
            }
            (HandlerKind::Closure(h), Decoded::Closure(env)) => apply_closure(h, world, &mut ctx, env),
            // decode_payload mirrors the handler kind.
            _ => return Err(CommandError::UnknownHandler { id }),
        };
        outcome.map_err(|source| CommandError::Invoke {
            handler: handler.name().to_string(),
            source,
        })
    }

    fn decode_payload(
        &self,
        handler: &HandlerKind<W>,
        meta: &HandlerMeta,
        r: &mut ByteReader<'_>,
        resolver: &dyn EntityResolver,
    ) -> Result<(Ambient, Decoded), DecodeError> {
        let ambient = read_ambient(r, &self.registry, meta.flags, &self.selection_type, resolver)?;
        let decoded = match handler {
            HandlerKind::Field(h) => {
                let target = self.registry.decode(r, &h.target, resolver)?;
                let index = if h.indexed { Some(r.read_i32()?) } else { None };
                let value = self.registry.decode(r, &h.value, resolver)?;
                Decoded::Field {
                    target,
                    index,
                    value,
                }
            }
            HandlerKind::Operation(h) => {
                let target = self.registry.decode(r, &h.target, resolver)?;
                let mut args = Vec::with_capacity(h.args.len());
                for ty in &h.args {
                    args.push(self.registry.decode(r, ty, resolver)?);
                }
                Decoded::Operation { target, args }
            }
            HandlerKind::Closure(h) => {
                let mut env = ClosureEnv::new();
                for (path, ty) in h.shape.fields() {
                    let value = self.registry.decode(r, ty, resolver)?;
                    env.set(path, value);
                }
                Decoded::Closure(env)
            }
        };
        Ok((ambient, decoded))
    }
}

fn target_absent(ty: &TypeRef, target: &Value) -> bool {
    target.is_null() && !matches!(ty, TypeRef::Nullable(_))
}

fn apply_field<W>(
    h: &FieldHandler<W>,
    world: &mut W,
    ctx: &mut ExecutionContext<'_>,
    target: Value,
    index: Option<i32>,
    value: Value,
) -> Result<Applied, tandem_core::InvokeError> {
    if target_absent(&h.target, &target) {
        log::debug!("'{}' target no longer resolves in {}; no-op", h.name, ctx.scope);
        return Ok(Applied::Skipped(SkipReason::TargetAbsent));
    }
    if let Some(hook) = h.pre_hook {
        hook(world, ctx, &target);
    }
    (h.set)(world, ctx.scope, &target, index, value)?;
    if let Some(hook) = h.post_hook {
        hook(world, ctx, &target);
    }
    Ok(Applied::Executed)
}

fn apply_operation<W>(
    h: &OperationHandler<W>,
    world: &mut W,
    ctx: &mut ExecutionContext<'_>,
    target: Value,
    args: Vec<Value>,
) -> Result<Applied, tandem_core::InvokeError> {
    if target_absent(&h.target, &target) {
        log::debug!("'{}' target no longer resolves in {}; no-op", h.name, ctx.scope);
        return Ok(Applied::Skipped(SkipReason::TargetAbsent));
    }
    if h.cancel_if_absent {
        let absent = h
            .args
            .iter()
            .zip(&args)
            .position(|(ty, arg)| target_absent(ty, arg));
        if let Some(index) = absent {
            log::debug!("'{}' argument {index} no longer resolves; cancelled", h.name);
            return Ok(Applied::Skipped(SkipReason::ArgumentAbsent { index }));
        }
    }
    if h.cancel_if_no_selection && ctx.ambient.selection.is_empty() {
        log::debug!("'{}' has an empty selection; cancelled", h.name);
        return Ok(Applied::Skipped(SkipReason::NoSelection));
    }
    (h.invoke)(world, ctx, &target, &args)?;
    Ok(Applied::Executed)
}

fn apply_closure<W>(
    h: &ClosureHandler<W>,
    world: &mut W,
    ctx: &mut ExecutionContext<'_>,
    env: ClosureEnv,
) -> Result<Applied, tandem_core::InvokeError> {
    (h.invoke)(world, ctx, &env)?;
    Ok(Applied::Executed)
}
