//! Decode-and-apply behaviour of each handler kind.

use std::collections::HashMap;
use std::sync::Arc;

use tandem_capture::{
    Ambient, Applied, CellCoord, ClosureEnv, ClosureHandler, ClosureShape, CommandError,
    ContextFlags, ExecutionContext, FieldHandler, HandlerTable, HandlerTableBuilder,
    OperationHandler, SkipReason,
};
use tandem_core::{HandlerId, InvokeError, PendingCommand, ScopeId, ScopeRng, TickId};
use tandem_registry::{
    EntityRef, EntityResolver, PrimKind, RefCategory, RegistryBuilder, TypeName, TypeRef, Value,
};

#[derive(Default)]
struct Farm {
    priorities: HashMap<u32, i32>,
    schedule: HashMap<(u32, i32), u8>,
    log: Vec<String>,
    seen_ambient: Option<Ambient>,
}

impl EntityResolver for Farm {
    fn resolve_entity(&self, _: ScopeId, _: &TypeName, r: &EntityRef) -> Option<EntityRef> {
        self.priorities.contains_key(&r.id().0).then_some(*r)
    }
}

fn worker_id(v: &Value) -> Option<u32> {
    match v {
        Value::Entity { reference, .. } => Some(reference.id().0),
        _ => None,
    }
}

fn get_priority(w: &Farm, _: ScopeId, t: &Value, _: Option<i32>) -> Option<Value> {
    worker_id(t).and_then(|id| w.priorities.get(&id)).map(|p| Value::I32(*p))
}

fn set_priority(w: &mut Farm, _: ScopeId, t: &Value, _: Option<i32>, v: Value) -> Result<(), InvokeError> {
    match (worker_id(t), v) {
        (Some(id), Value::I32(p)) => {
            w.priorities.insert(id, p);
            Ok(())
        }
        _ => Err(InvokeError::BadArgument { index: 0 }),
    }
}

fn get_schedule(w: &Farm, _: ScopeId, t: &Value, i: Option<i32>) -> Option<Value> {
    let id = worker_id(t)?;
    Some(Value::U8(*w.schedule.get(&(id, i?)).unwrap_or(&0)))
}

fn set_schedule(w: &mut Farm, _: ScopeId, t: &Value, i: Option<i32>, v: Value) -> Result<(), InvokeError> {
    match (worker_id(t), i, v) {
        (Some(id), Some(hour), Value::U8(slot)) => {
            w.schedule.insert((id, hour), slot);
            Ok(())
        }
        _ => Err(InvokeError::BadArgument { index: 1 }),
    }
}

struct Fixture {
    table: HandlerTable<Farm>,
    pending: HashMap<&'static str, PendingCommand>,
}

fn fixture() -> Fixture {
    let registry = Arc::new(
        RegistryBuilder::new()
            .reference("Worker", &[RefCategory::Spawned])
            .build()
            .unwrap(),
    );
    let mut b = HandlerTableBuilder::new(registry);
    b.selection_type(TypeRef::named("Worker"));
    let priority = b.register_field(
        FieldHandler::new(
            "Worker.priority",
            TypeRef::named("Worker"),
            PrimKind::I32.into(),
            get_priority,
            set_priority,
        )
        .pre_hook(|w, _, _| w.log.push("pre".into()))
        .post_hook(|w, _, _| w.log.push("post".into())),
    );
    let schedule = b.register_field(
        FieldHandler::new(
            "Worker.schedule",
            TypeRef::named("Worker"),
            PrimKind::U8.into(),
            get_schedule,
            set_schedule,
        )
        .indexed(),
    );
    let haul = b.register_operation(
        OperationHandler::new(
            "Worker.haul_to",
            TypeRef::named("Worker"),
            &[TypeRef::named("Worker"), PrimKind::U8.into()],
            |w: &mut Farm, _, _, args| {
                w.log.push(format!("haul {:?}", args[1]));
                Ok(())
            },
        )
        .cancel_if_absent(),
    );
    let inspect = b.register_operation(
        OperationHandler::new(
            "Worker.inspect",
            TypeRef::named("Worker"),
            &[TypeRef::nullable(TypeRef::named("Worker"))],
            |w: &mut Farm, _, _, args| {
                w.log.push(format!("inspect {}", args[0].describe()));
                Ok(())
            },
        )
        .cancel_if_absent(),
    );
    let draft = b.register_operation(
        OperationHandler::new("Colony.draft", TypeRef::Unit, &[], |w: &mut Farm, ctx, _, _| {
            w.seen_ambient = Some(ctx.ambient.clone());
            Ok(())
        })
        .flags(ContextFlags::MOUSE_CELL | ContextFlags::QUEUE_MODIFIER)
        .cancel_if_no_selection(),
    );
    let fail = b.register_operation(OperationHandler::new(
        "Colony.fail",
        TypeRef::Unit,
        &[],
        |_, _, _, _| {
            Err(InvokeError::Rejected {
                reason: "no".into(),
            })
        },
    ));
    let roll = b.register_operation(
        OperationHandler::new("Colony.roll", TypeRef::Unit, &[], |w: &mut Farm, ctx, _, _| {
            let n = ctx.rng.next_u32();
            w.log.push(format!("roll {n}"));
            Ok(())
        })
        .debug_only(),
    );
    let plant = b.register_closure(ClosureHandler::new(
        ClosureShape::new("PlantZone")
            .field("crop", PrimKind::Str.into())
            .nested(
                "at",
                &ClosureShape::new("Cell")
                    .field("x", PrimKind::I32.into())
                    .field("z", PrimKind::I32.into()),
            ),
        "sow",
        |w: &mut Farm, _, env| {
            w.log.push(format!(
                "sow {:?} {:?} {:?}",
                env.get("crop"),
                env.get("at.x"),
                env.get("at.z")
            ));
            Ok(())
        },
    ));
    let table = b.build().unwrap();

    let scope = ScopeId::Map(0);
    let none = Ambient::default();
    let w1 = Value::entity("Worker", 1);
    let mut pending = HashMap::new();
    pending.insert(
        "priority",
        table.encode_field(priority, scope, &none, &w1, None, &Value::I32(5)).unwrap(),
    );
    pending.insert(
        "priority_ghost",
        table
            .encode_field(priority, scope, &none, &Value::entity("Worker", 99), None, &Value::I32(5))
            .unwrap(),
    );
    pending.insert(
        "schedule",
        table.encode_field(schedule, scope, &none, &w1, Some(13), &Value::U8(2)).unwrap(),
    );
    pending.insert(
        "haul_ghost",
        table
            .encode_operation(haul, scope, &none, &w1, &[Value::entity("Worker", 99), Value::U8(1)])
            .unwrap(),
    );
    pending.insert(
        "inspect_ghost",
        table
            .encode_operation(inspect, scope, &none, &w1, &[Value::entity("Worker", 99)])
            .unwrap(),
    );
    let ambient = Ambient {
        mouse_cell: Some(CellCoord::new(3, 4)),
        selection: [w1.clone(), Value::entity("Worker", 99)].into_iter().collect(),
        queue_modifier: true,
    };
    pending.insert(
        "draft",
        table.encode_operation(draft, scope, &ambient, &Value::Unit, &[]).unwrap(),
    );
    let lonely = Ambient {
        selection: [Value::entity("Worker", 99)].into_iter().collect(),
        ..Ambient::default()
    };
    pending.insert(
        "draft_empty",
        table.encode_operation(draft, scope, &lonely, &Value::Unit, &[]).unwrap(),
    );
    pending.insert(
        "fail",
        table.encode_operation(fail, scope, &none, &Value::Unit, &[]).unwrap(),
    );
    pending.insert(
        "roll",
        table.encode_operation(roll, scope, &none, &Value::Unit, &[]).unwrap(),
    );
    let env = ClosureEnv::new()
        .with("crop", Value::Str("rice".into()))
        .with("at.x", Value::I32(-2))
        .with("at.z", Value::I32(8));
    pending.insert("sow", table.encode_closure(plant, scope, &none, &env).unwrap());
    Fixture { table, pending }
}

fn farm() -> Farm {
    let mut f = Farm::default();
    f.priorities.insert(1, 0);
    f
}

fn run(fx: &Fixture, world: &mut Farm, key: &str) -> Result<Applied, CommandError> {
    run_with(fx, world, key, false)
}

fn run_with(fx: &Fixture, world: &mut Farm, key: &str, debug: bool) -> Result<Applied, CommandError> {
    let cmd = &fx.pending[key];
    let mut rng = ScopeRng::new(7);
    let mut ctx = ExecutionContext::new(cmd.scope, TickId(100), &mut rng);
    ctx.debug_mode = debug;
    let result = fx.table.apply(world, &mut ctx, cmd.handler, &cmd.payload);
    assert_eq!(ctx.ambient, Ambient::default(), "ambient must be restored");
    result
}

#[test]
fn field_write_runs_hooks_in_order() {
    let fx = fixture();
    let mut w = farm();
    assert_eq!(run(&fx, &mut w, "priority"), Ok(Applied::Executed));
    assert_eq!(w.priorities[&1], 5);
    assert_eq!(w.log, vec!["pre", "post"]);
}

#[test]
fn field_on_vanished_target_is_noop() {
    let fx = fixture();
    let mut w = farm();
    assert_eq!(
        run(&fx, &mut w, "priority_ghost"),
        Ok(Applied::Skipped(SkipReason::TargetAbsent))
    );
    assert!(w.log.is_empty());
}

#[test]
fn indexed_field_carries_index() {
    let fx = fixture();
    let mut w = farm();
    run(&fx, &mut w, "schedule").unwrap();
    assert_eq!(w.schedule[&(1, 13)], 2);
}

#[test]
fn absent_required_argument_cancels() {
    let fx = fixture();
    let mut w = farm();
    assert_eq!(
        run(&fx, &mut w, "haul_ghost"),
        Ok(Applied::Skipped(SkipReason::ArgumentAbsent { index: 0 }))
    );
    assert!(w.log.is_empty());
}

#[test]
fn nullable_argument_proceeds_with_null() {
    let fx = fixture();
    let mut w = farm();
    assert_eq!(run(&fx, &mut w, "inspect_ghost"), Ok(Applied::Executed));
    assert_eq!(w.log, vec!["inspect null"]);
}

#[test]
fn ambient_is_visible_during_the_call_only() {
    let fx = fixture();
    let mut w = farm();
    assert_eq!(run(&fx, &mut w, "draft"), Ok(Applied::Executed));
    let seen = w.seen_ambient.unwrap();
    assert_eq!(seen.mouse_cell, Some(CellCoord::new(3, 4)));
    assert!(seen.queue_modifier);
    // Worker 99 does not exist on this peer.
    assert_eq!(seen.selection.as_slice(), &[Value::entity("Worker", 1)]);
}

#[test]
fn empty_selection_cancels() {
    let fx = fixture();
    let mut w = farm();
    assert_eq!(
        run(&fx, &mut w, "draft_empty"),
        Ok(Applied::Skipped(SkipReason::NoSelection))
    );
    assert!(w.seen_ambient.is_none());
}

#[test]
fn host_errors_are_reported_not_raised() {
    let fx = fixture();
    let mut w = farm();
    assert!(matches!(
        run(&fx, &mut w, "fail"),
        Err(CommandError::Invoke { .. })
    ));
}

#[test]
fn debug_only_skipped_outside_debug_mode() {
    let fx = fixture();
    let mut w = farm();
    assert_eq!(
        run(&fx, &mut w, "roll"),
        Ok(Applied::Skipped(SkipReason::DebugDisabled))
    );
    assert_eq!(run_with(&fx, &mut w, "roll", true), Ok(Applied::Executed));
    assert_eq!(w.log.len(), 1);
}

#[test]
fn closure_env_decodes_flattened_paths() {
    let fx = fixture();
    let mut w = farm();
    run(&fx, &mut w, "sow").unwrap();
    assert_eq!(
        w.log,
        vec![r#"sow Some(Str("rice")) Some(I32(-2)) Some(I32(8))"#]
    );
}

#[test]
fn malformed_payloads_fail_the_command_only() {
    let fx = fixture();
    let mut w = farm();
    let cmd = &fx.pending["priority"];
    let mut rng = ScopeRng::new(7);
    let mut ctx = ExecutionContext::new(cmd.scope, TickId(1), &mut rng);

    let mut long = cmd.payload.clone();
    long.push(0);
    assert!(matches!(
        fx.table.apply(&mut w, &mut ctx, cmd.handler, &long),
        Err(CommandError::TrailingBytes { count: 1, .. })
    ));
    assert!(matches!(
        fx.table.apply(&mut w, &mut ctx, cmd.handler, &cmd.payload[..3]),
        Err(CommandError::Decode { .. })
    ));
    assert_eq!(
        fx.table.apply(&mut w, &mut ctx, HandlerId(999), &[]),
        Err(CommandError::UnknownHandler { id: HandlerId(999) })
    );
    assert_eq!(w.priorities[&1], 0);
}
