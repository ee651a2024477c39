//! Benchmark profiles for the Tandem lockstep engine.
//!
//! - [`busy_colony`]: a colony with many workers on several maps
//! - [`bench_config`]: engine configuration used by every benchmark
//! - [`bench_engine`]: a single engine over [`busy_colony`] with every map
//!   registered as a scope

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use tandem_core::{ScopeId, TickId};
use tandem_engine::{SyncConfig, SyncEngine};
use tandem_test_utils::{colony_table, Colony, ColonyHandles, RecordingTransport};

/// A colony with `maps` maps of `workers` workers each.
///
/// Worker ids are `1..=workers` on every map.
pub fn busy_colony(maps: u32, workers: u32) -> Colony {
    let mut colony = Colony::new();
    for map in 1..=maps {
        for id in 1..=workers {
            colony.add_worker(ScopeId::Map(map), id, &format!("w{map}-{id}"));
        }
    }
    colony
}

/// Configuration shared by the benchmarks.
pub fn bench_config(seed: u64) -> SyncConfig {
    SyncConfig {
        seed,
        drift_exchange_interval: 60,
        ..SyncConfig::default()
    }
}

/// An engine over [`busy_colony`] with every map registered at tick 0.
pub fn bench_engine(
    seed: u64,
    maps: u32,
    workers: u32,
) -> (SyncEngine<Colony, RecordingTransport>, ColonyHandles) {
    let (table, handles) = colony_table();
    let colony = busy_colony(maps, workers);
    let scopes: Vec<ScopeId> = colony.maps.keys().copied().collect();
    let mut engine = match SyncEngine::new(bench_config(seed), table, colony, RecordingTransport::new()) {
        Ok(engine) => engine,
        Err(e) => panic!("benchmark configuration rejected: {e}"),
    };
    for scope in scopes {
        if let Err(e) = engine.add_scope(scope, TickId(0)) {
            panic!("benchmark scope {scope} rejected: {e}");
        }
    }
    (engine, handles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bench_config_validates() {
        bench_config(42).validate().unwrap();
    }

    #[test]
    fn busy_colony_has_every_worker() {
        let colony = busy_colony(3, 10);
        assert_eq!(colony.maps.len(), 3);
        assert!(colony.maps.values().all(|m| m.workers.len() == 10));
    }

    #[test]
    fn bench_engine_registers_every_map() {
        let (engine, _) = bench_engine(1, 2, 4);
        assert_eq!(engine.scopes().count(), 3);
    }
}
