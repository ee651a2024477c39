//! Tandem: deterministic lockstep command synchronization.
//!
//! Peers never exchange simulation state. Every state-changing action is
//! captured as a command, sent to an authoritative sequencer, stamped with
//! the tick it must run at, and executed by every peer in the same order
//! against the same random stream. This facade re-exports the public API
//! of the sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use tandem::prelude::*;
//!
//! #[derive(Default)]
//! struct Counter {
//!     value: i32,
//! }
//!
//! impl EntityResolver for Counter {
//!     fn resolve_entity(&self, _: ScopeId, _: &TypeName, _: &EntityRef) -> Option<EntityRef> {
//!         None
//!     }
//! }
//!
//! impl Simulation for Counter {
//!     fn tick_scope(&mut self, _: &mut ExecutionContext<'_>) {}
//! }
//!
//! fn get(w: &Counter, _: ScopeId, _: &Value, _: Option<i32>) -> Option<Value> {
//!     Some(Value::I32(w.value))
//! }
//!
//! fn set(w: &mut Counter, _: ScopeId, _: &Value, _: Option<i32>, v: Value) -> Result<(), InvokeError> {
//!     match v {
//!         Value::I32(n) => {
//!             w.value = n;
//!             Ok(())
//!         }
//!         _ => Err(InvokeError::BadArgument { index: 0 }),
//!     }
//! }
//!
//! let registry = Arc::new(RegistryBuilder::new().build().unwrap());
//! let mut b = HandlerTableBuilder::new(registry);
//! let value = b.register_field(FieldHandler::new(
//!     "Counter.value",
//!     TypeRef::Unit,
//!     PrimKind::I32.into(),
//!     get,
//!     set,
//! ));
//! let table = Arc::new(b.build().unwrap());
//!
//! let mut seq = LoopbackSequencer::new(2, 16);
//! let transport = seq.connect();
//! let peer = transport.peer();
//! let mut engine =
//!     SyncEngine::new(SyncConfig::default(), table, Counter::default(), transport).unwrap();
//! engine.set_peer(peer);
//! seq.attach(peer, engine.sender());
//!
//! engine
//!     .capture_field(value, ScopeId::Global, &Value::Unit, None, &Value::I32(7))
//!     .unwrap();
//! assert_eq!(engine.world().value, 0);
//!
//! for _ in 0..3 {
//!     seq.step();
//!     while !engine.advance_all().is_empty() {}
//! }
//! assert_eq!(engine.world().value, 7);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `tandem-core` | ids, commands, random streams, the transport trait |
//! | [`wire`] | `tandem-wire` | byte codec, command frames, fingerprint hashing |
//! | [`registry`] | `tandem-registry` | closed type registry and value codec |
//! | [`capture`] | `tandem-capture` | handler table, capture, decode-and-apply |
//! | [`engine`] | `tandem-engine` | scheduler, change buffer, drift detection |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Ids, commands, random streams and the transport trait (`tandem-core`).
pub use tandem_core as types;

/// Little-endian byte codec and command frames (`tandem-wire`).
pub use tandem_wire as wire;

/// The closed type registry and its value codec (`tandem-registry`).
///
/// Every type that may appear in a command payload is declared once on a
/// [`registry::RegistryBuilder`]; the built [`registry::TypeRegistry`] is
/// immutable and fingerprinted.
pub use tandem_registry as registry;

/// Handler declarations, capture and decode-and-apply (`tandem-capture`).
pub use tandem_capture as capture;

/// The per-peer engine (`tandem-engine`).
///
/// [`engine::SyncEngine`] schedules and executes commands;
/// [`engine::LoopbackSequencer`] stands in for the server in tests.
pub use tandem_engine as engine;

/// Common imports for typical Tandem usage.
pub mod prelude {
    // Core types
    pub use tandem_core::{
        Command, EntityId, HandlerId, InvokeError, PeerId, ScopeId, ScopeRng, SessionId, TickId,
        Transport,
    };

    // Registry
    pub use tandem_registry::{
        EntityRef, EntityResolver, PrimKind, RefCategory, RegistryBuilder, TypeName, TypeRef,
        TypeRegistry, Value,
    };

    // Capture
    pub use tandem_capture::{
        Ambient, CaptureError, ClosureEnv, ClosureHandler, ClosureShape, CommandError,
        ContextFlags, ExecutionContext, FieldHandler, FlushInterval, HandlerTable,
        HandlerTableBuilder, OperationHandler,
    };

    // Engine
    pub use tandem_engine::{
        Divergence, EngineError, LoopbackSequencer, SessionRegistry, Simulation, SyncConfig,
        SyncEngine, TickReport, WatchOutcome,
    };
}
