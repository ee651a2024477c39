//! A small colony simulation used as the host world in tests.
//!
//! Workers live on maps, one map per scope. Every simulated tick each
//! worker's mood drifts by a draw from the scope's random stream, so two
//! peers stay in lockstep exactly when they executed the same commands in
//! the same order.

use std::collections::BTreeMap;

use tandem_capture::ExecutionContext;
use tandem_core::{DefId, SessionId, ScopeId, TickId};
use tandem_engine::{SessionRegistry, Simulation};
use tandem_registry::{EntityRef, EntityResolver, TypeName, Value};

/// Number of thing definitions the colony knows; ids at or above are absent.
pub const THING_DEFS: u16 = 8;

/// A colonist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Worker {
    pub name: String,
    pub priority: i32,
    pub skills: Vec<i32>,
    pub resting: bool,
    pub mood: u32,
    pub hauling: Option<u32>,
}

impl Worker {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            priority: 3,
            skills: vec![0; 4],
            resting: false,
            mood: 50,
            hauling: None,
        }
    }
}

/// A construction blueprint placed on a cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blueprint {
    pub def: DefId,
    pub x: i32,
    pub z: i32,
}

/// One map of the colony.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColonyMap {
    pub workers: BTreeMap<u32, Worker>,
    pub blueprints: Vec<Blueprint>,
    pub drafted: Vec<u32>,
}

/// A barter session opened by a worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trade {
    pub worker: u32,
    pub offer: i32,
}

/// Everything two peers must agree on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColonySnapshot {
    pub maps: BTreeMap<ScopeId, ColonyMap>,
    pub alert_level: i32,
    pub trades: Vec<(SessionId, Trade)>,
    pub global_roll: u32,
}

/// The host world.
#[derive(Debug, Default)]
pub struct Colony {
    pub maps: BTreeMap<ScopeId, ColonyMap>,
    pub alert_level: i32,
    pub global_roll: u32,
    pub trades: SessionRegistry<Trade>,
    /// Human-readable record of handler side effects, in execution order.
    pub log: Vec<String>,
    /// Draw once more than the other peers in this scope at this tick.
    pub perturb: Option<(ScopeId, TickId)>,
}

impl Colony {
    pub fn new() -> Self {
        Self::default()
    }

    /// A colony with one map per entry, holding the named workers.
    pub fn with_maps(maps: &[(u32, &[(u32, &str)])]) -> Self {
        let mut colony = Self::new();
        for (map, workers) in maps {
            let scope = ScopeId::Map(*map);
            colony.maps.insert(scope, ColonyMap::default());
            for (id, name) in workers.iter() {
                colony.add_worker(scope, *id, name);
            }
        }
        colony
    }

    pub fn add_worker(&mut self, scope: ScopeId, id: u32, name: &str) {
        self.maps
            .entry(scope)
            .or_default()
            .workers
            .insert(id, Worker::new(name));
    }

    pub fn remove_worker(&mut self, scope: ScopeId, id: u32) -> Option<Worker> {
        self.maps.get_mut(&scope)?.workers.remove(&id)
    }

    pub fn worker(&self, scope: ScopeId, id: u32) -> Option<&Worker> {
        self.maps.get(&scope)?.workers.get(&id)
    }

    pub fn worker_mut(&mut self, scope: ScopeId, id: u32) -> Option<&mut Worker> {
        self.maps.get_mut(&scope)?.workers.get_mut(&id)
    }

    pub fn snapshot(&self) -> ColonySnapshot {
        ColonySnapshot {
            maps: self.maps.clone(),
            alert_level: self.alert_level,
            trades: self.trades.iter().map(|(id, t)| (id, t.clone())).collect(),
            global_roll: self.global_roll,
        }
    }
}

/// Id of the worker a reference value points at.
pub fn worker_id(value: &Value) -> Option<u32> {
    match value {
        Value::Entity { reference, .. } => Some(reference.id().0),
        _ => None,
    }
}

/// A worker reference value.
pub fn worker_ref(id: u32) -> Value {
    Value::entity("Worker", id)
}

impl EntityResolver for Colony {
    fn resolve_entity(&self, scope: ScopeId, ty: &TypeName, reference: &EntityRef) -> Option<EntityRef> {
        if ty.as_str() != "Worker" {
            return None;
        }
        self.worker(scope, reference.id().0).map(|_| *reference)
    }

    fn resolve_session(&self, ty: &TypeName, id: SessionId) -> bool {
        ty.as_str() == "Trade" && self.trades.contains(id)
    }

    fn resolve_def(&self, _: &TypeName, id: DefId) -> bool {
        id.0 < THING_DEFS
    }

    fn resolve_scope(&self, scope: ScopeId) -> bool {
        scope == ScopeId::Global || self.maps.contains_key(&scope)
    }
}

impl Simulation for Colony {
    fn tick_scope(&mut self, ctx: &mut ExecutionContext<'_>) {
        if self.perturb == Some((ctx.scope, ctx.tick)) {
            ctx.rng.next_u32();
        }
        match ctx.scope {
            ScopeId::Global => self.global_roll = ctx.rng.next_u32(),
            scope => {
                let Some(map) = self.maps.get_mut(&scope) else {
                    return;
                };
                for worker in map.workers.values_mut() {
                    let delta = ctx.rng.range_u32(0, 5);
                    worker.mood = if worker.resting {
                        (worker.mood + delta).min(100)
                    } else {
                        worker.mood.saturating_sub(delta / 2)
                    };
                }
            }
        }
    }

    fn scope_removed(&mut self, scope: ScopeId) {
        self.maps.remove(&scope);
        for (id, trade) in self.trades.close_scope(scope) {
            self.log.push(format!("trade {id} of worker {} closed", trade.worker));
        }
    }
}
