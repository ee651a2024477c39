//! Registry and handler table for the colony world.

use std::sync::Arc;

use tandem_capture::{
    ClosureEnv, ClosureHandle, ClosureHandler, ClosureShape, ContextFlags, ExecutionContext,
    FieldHandle, FieldHandler, FlushInterval, HandlerTable, HandlerTableBuilder, OperationHandle,
    OperationHandler,
};
use tandem_core::{DefId, InvokeError, ScopeId};
use tandem_registry::{PrimKind, RefCategory, RegistryBuilder, TypeRef, TypeRegistry, Value};

use crate::colony::{worker_id, Blueprint, Colony, Trade, Worker};

/// Ticks between flushes of buffered skill edits.
pub const SKILL_FLUSH_TICKS: u32 = 3;

/// Handles to every colony handler.
#[derive(Clone, Copy, Debug)]
pub struct ColonyHandles {
    pub priority: FieldHandle,
    pub skill: FieldHandle,
    pub alert_level: FieldHandle,
    pub rest: OperationHandle,
    pub haul: OperationHandle,
    pub move_to: OperationHandle,
    pub open_trade: OperationHandle,
    pub close_trade: OperationHandle,
    pub draft: OperationHandle,
    pub designate: OperationHandle,
    pub roll: OperationHandle,
    pub explode: OperationHandle,
    pub spawn_worker: OperationHandle,
    pub place_blueprint: ClosureHandle,
}

/// Types the colony syncs.
pub fn colony_registry() -> Arc<TypeRegistry> {
    let registry = RegistryBuilder::new()
        .reference("Worker", &[RefCategory::Spawned])
        .reference("ThingDef", &[RefCategory::Definition])
        .reference("Trade", &[RefCategory::Session])
        .record("Cell", &[("x", PrimKind::I32.into()), ("z", PrimKind::I32.into())])
        .build()
        .expect("colony registry is well-formed");
    Arc::new(registry)
}

/// Shape of the blueprint placement action.
pub fn blueprint_shape() -> ClosureShape {
    let cell = ClosureShape::new("Cell")
        .field("x", PrimKind::I32.into())
        .field("z", PrimKind::I32.into());
    ClosureShape::new("Blueprint")
        .field("def", TypeRef::named("ThingDef"))
        .nested("cell", &cell)
}

/// Environment of one blueprint placement.
pub fn blueprint_env(def: u16, x: i32, z: i32) -> ClosureEnv {
    ClosureEnv::new()
        .with(
            "def",
            Value::Def {
                ty: tandem_registry::TypeName::new("ThingDef"),
                id: DefId(def),
            },
        )
        .with("cell.x", Value::I32(x))
        .with("cell.z", Value::I32(z))
}

/// A `Cell` record value.
pub fn cell(x: i32, z: i32) -> Value {
    Value::record("Cell", vec![Value::I32(x), Value::I32(z)])
}

// ── Accessors ──────────────────────────────────────────────────────

fn worker<'a>(w: &'a mut Colony, scope: ScopeId, target: &Value) -> Result<&'a mut Worker, InvokeError> {
    let id = worker_id(target).ok_or(InvokeError::BadArgument { index: 0 })?;
    w.worker_mut(scope, id).ok_or_else(|| InvokeError::InvalidState {
        reason: format!("no worker {id} in {scope}"),
    })
}

fn get_priority(w: &Colony, scope: ScopeId, target: &Value, _: Option<i32>) -> Option<Value> {
    w.worker(scope, worker_id(target)?).map(|x| Value::I32(x.priority))
}

fn set_priority(w: &mut Colony, scope: ScopeId, target: &Value, _: Option<i32>, v: Value) -> Result<(), InvokeError> {
    let Value::I32(p) = v else {
        return Err(InvokeError::BadArgument { index: 0 });
    };
    if !(0..=9).contains(&p) {
        return Err(InvokeError::Rejected {
            reason: format!("priority {p} out of range"),
        });
    }
    worker(w, scope, target)?.priority = p;
    Ok(())
}

fn get_skill(w: &Colony, scope: ScopeId, target: &Value, index: Option<i32>) -> Option<Value> {
    let worker = w.worker(scope, worker_id(target)?)?;
    let slot = usize::try_from(index?).ok()?;
    worker.skills.get(slot).map(|s| Value::I32(*s))
}

fn set_skill(w: &mut Colony, scope: ScopeId, target: &Value, index: Option<i32>, v: Value) -> Result<(), InvokeError> {
    let Value::I32(level) = v else {
        return Err(InvokeError::BadArgument { index: 0 });
    };
    let slot = index
        .and_then(|i| usize::try_from(i).ok())
        .ok_or(InvokeError::BadArgument { index: 1 })?;
    let skill = worker(w, scope, target)?
        .skills
        .get_mut(slot)
        .ok_or(InvokeError::BadArgument { index: 1 })?;
    *skill = level;
    Ok(())
}

fn get_alert(w: &Colony, _: ScopeId, _: &Value, _: Option<i32>) -> Option<Value> {
    Some(Value::I32(w.alert_level))
}

fn set_alert(w: &mut Colony, _: ScopeId, _: &Value, _: Option<i32>, v: Value) -> Result<(), InvokeError> {
    match v {
        Value::I32(level) => {
            w.alert_level = level;
            Ok(())
        }
        _ => Err(InvokeError::BadArgument { index: 0 }),
    }
}

// ── Operations ─────────────────────────────────────────────────────

fn rest(w: &mut Colony, ctx: &mut ExecutionContext<'_>, target: &Value, _: &[Value]) -> Result<(), InvokeError> {
    let worker = worker(w, ctx.scope, target)?;
    worker.resting = true;
    let line = format!("{} rests", worker.name);
    w.log.push(line);
    Ok(())
}

fn haul(w: &mut Colony, ctx: &mut ExecutionContext<'_>, target: &Value, args: &[Value]) -> Result<(), InvokeError> {
    let other = args
        .first()
        .and_then(worker_id)
        .ok_or(InvokeError::BadArgument { index: 0 })?;
    let worker = worker(w, ctx.scope, target)?;
    worker.hauling = Some(other);
    let line = format!("{} hauls {other}", worker.name);
    w.log.push(line);
    Ok(())
}

fn move_to(w: &mut Colony, ctx: &mut ExecutionContext<'_>, target: &Value, args: &[Value]) -> Result<(), InvokeError> {
    let Some(Value::Record { fields, .. }) = args.first() else {
        return Err(InvokeError::BadArgument { index: 0 });
    };
    let (Some(Value::I32(x)), Some(Value::I32(z))) = (fields.first(), fields.get(1)) else {
        return Err(InvokeError::BadArgument { index: 0 });
    };
    let (x, z) = (*x, *z);
    let name = worker(w, ctx.scope, target)?.name.clone();
    w.log.push(format!("{name} moves to ({x}, {z})"));
    Ok(())
}

fn open_trade(w: &mut Colony, ctx: &mut ExecutionContext<'_>, target: &Value, args: &[Value]) -> Result<(), InvokeError> {
    let Some(Value::I32(offer)) = args.first() else {
        return Err(InvokeError::BadArgument { index: 0 });
    };
    let id = worker_id(target).ok_or(InvokeError::BadArgument { index: 0 })?;
    worker(w, ctx.scope, target)?;
    let session = w.trades.open(ctx, Trade { worker: id, offer: *offer });
    w.log.push(format!("trade {session} opened by {id}"));
    Ok(())
}

fn close_trade(w: &mut Colony, _: &mut ExecutionContext<'_>, _: &Value, args: &[Value]) -> Result<(), InvokeError> {
    let Some(Value::Session { id, .. }) = args.first() else {
        return Err(InvokeError::BadArgument { index: 0 });
    };
    let trade = w.trades.close(*id).ok_or_else(|| InvokeError::InvalidState {
        reason: format!("trade {id} is not open"),
    })?;
    w.log.push(format!("trade {id} closed at {}", trade.offer));
    Ok(())
}

fn draft(w: &mut Colony, ctx: &mut ExecutionContext<'_>, _: &Value, _: &[Value]) -> Result<(), InvokeError> {
    let ids: Vec<u32> = ctx.ambient.selection.iter().filter_map(worker_id).collect();
    let map = w.maps.get_mut(&ctx.scope).ok_or_else(|| InvokeError::InvalidState {
        reason: format!("{} has no map", ctx.scope),
    })?;
    if !ctx.ambient.queue_modifier {
        map.drafted.clear();
    }
    map.drafted.extend(ids);
    Ok(())
}

fn designate(w: &mut Colony, ctx: &mut ExecutionContext<'_>, _: &Value, _: &[Value]) -> Result<(), InvokeError> {
    let cell = ctx.ambient.mouse_cell.ok_or_else(|| InvokeError::Rejected {
        reason: "no cell under the cursor".into(),
    })?;
    w.log.push(format!("designated ({}, {})", cell.x, cell.z));
    Ok(())
}

fn roll(w: &mut Colony, ctx: &mut ExecutionContext<'_>, _: &Value, _: &[Value]) -> Result<(), InvokeError> {
    let value = ctx.rng.range_u32(0, 100);
    w.log.push(format!("rolled {value}"));
    Ok(())
}

fn explode(_: &mut Colony, _: &mut ExecutionContext<'_>, _: &Value, _: &[Value]) -> Result<(), InvokeError> {
    panic!("boom");
}

fn spawn_worker(w: &mut Colony, ctx: &mut ExecutionContext<'_>, _: &Value, args: &[Value]) -> Result<(), InvokeError> {
    let Some(Value::Str(name)) = args.first() else {
        return Err(InvokeError::BadArgument { index: 0 });
    };
    let scope = ctx.scope;
    let map = w.maps.entry(scope).or_default();
    let id = map.workers.keys().next_back().map_or(1, |last| last + 1);
    let mut worker = Worker::new(name);
    worker.mood = ctx.rng.range_u32(20, 80);
    map.workers.insert(id, worker);
    w.log.push(format!("spawned {name} as {id}"));
    Ok(())
}

fn place_blueprint(w: &mut Colony, ctx: &mut ExecutionContext<'_>, env: &ClosureEnv) -> Result<(), InvokeError> {
    let def = match env.get("def") {
        Some(Value::Def { id, .. }) => *id,
        Some(Value::Null) => {
            return Err(InvokeError::InvalidState {
                reason: "unknown thing definition".into(),
            })
        }
        _ => return Err(InvokeError::BadArgument { index: 0 }),
    };
    let (Some(Value::I32(x)), Some(Value::I32(z))) = (env.get("cell.x"), env.get("cell.z")) else {
        return Err(InvokeError::BadArgument { index: 1 });
    };
    let blueprint = Blueprint { def, x: *x, z: *z };
    w.maps.entry(ctx.scope).or_default().blueprints.push(blueprint);
    Ok(())
}

// ── Table ──────────────────────────────────────────────────────────

/// The colony handler table and its handles.
pub fn colony_table() -> (Arc<HandlerTable<Colony>>, ColonyHandles) {
    let worker = || TypeRef::named("Worker");
    let i32_ty = || -> TypeRef { PrimKind::I32.into() };

    let mut b = HandlerTableBuilder::new(colony_registry());
    b.selection_type(worker());

    let priority = b.register_field(FieldHandler::new(
        "Worker.priority",
        worker(),
        i32_ty(),
        get_priority,
        set_priority,
    ));
    let skill = b.register_field(
        FieldHandler::new("Worker.skill", worker(), i32_ty(), get_skill, set_skill)
            .indexed()
            .flush_interval(FlushInterval::Ticks(SKILL_FLUSH_TICKS)),
    );
    let alert_level = b.register_field(
        FieldHandler::new("Colony.alert_level", TypeRef::Unit, i32_ty(), get_alert, set_alert)
            .post_hook(|w, ctx, _| w.log.push(format!("alert {} at tick {}", w.alert_level, ctx.tick))),
    );

    let rest = b.register_operation(OperationHandler::new("Worker.rest", worker(), &[], rest));
    let haul = b.register_operation(
        OperationHandler::new("Worker.haul", worker(), &[worker()], haul).cancel_if_absent(),
    );
    let move_to = b.register_operation(OperationHandler::new(
        "Worker.move_to",
        worker(),
        &[TypeRef::named("Cell")],
        move_to,
    ));
    let open_trade = b.register_operation(OperationHandler::new(
        "Worker.open_trade",
        worker(),
        &[i32_ty()],
        open_trade,
    ));
    let close_trade = b.register_operation(
        OperationHandler::new(
            "Colony.close_trade",
            TypeRef::Unit,
            &[TypeRef::named("Trade")],
            close_trade,
        )
        .cancel_if_absent(),
    );
    let draft = b.register_operation(
        OperationHandler::new("Colony.draft", TypeRef::Unit, &[], draft)
            .cancel_if_no_selection()
            .flags(ContextFlags::QUEUE_MODIFIER),
    );
    let designate = b.register_operation(
        OperationHandler::new("Colony.designate", TypeRef::Unit, &[], designate)
            .flags(ContextFlags::MOUSE_CELL),
    );
    let roll = b.register_operation(OperationHandler::new("Colony.roll", TypeRef::Unit, &[], roll));
    let explode =
        b.register_operation(OperationHandler::new("Colony.explode", TypeRef::Unit, &[], explode));
    let spawn_worker = b.register_operation(
        OperationHandler::new(
            "Colony.spawn_worker",
            TypeRef::Unit,
            &[PrimKind::Str.into()],
            spawn_worker,
        )
        .debug_only(),
    );
    let place_blueprint =
        b.register_closure(ClosureHandler::new(blueprint_shape(), "place", place_blueprint));

    let table = b.build().expect("colony handler table is well-formed");
    let handles = ColonyHandles {
        priority,
        skill,
        alert_level,
        rest,
        haul,
        move_to,
        open_trade,
        close_trade,
        draft,
        designate,
        roll,
        explode,
        spawn_worker,
        place_blueprint,
    };
    (Arc::new(table), handles)
}
