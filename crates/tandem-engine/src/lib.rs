//! Scheduler, change buffer and drift monitor for Tandem.
//!
//! Provides [`SyncEngine`], one peer's view of a lockstep simulation:
//!
//! - per-scope [`CommandQueue`]s executed tick by tick in sequencer order,
//!   with per-command failure isolation
//! - a [`ChangeBuffer`] coalescing rapid local edits into single commands
//! - per-scope [`DriftMonitor`]s sampling the random stream, compared by a
//!   [`DriftArbiter`] that reports [`Divergence`]s
//! - a [`SessionRegistry`] for authoritative ephemeral state
//! - a per-scope command journal for replay-based determinism checks
//!
//! [`LoopbackSequencer`] is an in-process authority for tests and
//! single-process play.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod buffer;
pub mod config;
pub mod drift;
pub mod engine;
pub mod inbound;
pub mod journal;
pub mod queue;
pub mod report;
pub mod sequencer;
pub mod session;
pub mod simulation;

pub use buffer::{BufferedChange, ChangeBuffer, WatchError, WatchOutcome, WatchToken};
pub use config::{ConfigError, SyncConfig};
pub use drift::{Divergence, DriftArbiter, DriftMonitor, DriftOpinion, DriftSample};
pub use engine::{EngineError, SyncEngine};
pub use inbound::{Inbound, InboundSender};
pub use journal::{JournalError, JournalFrame, JournalReader, JournalWriter};
pub use queue::{CommandQueue, Due};
pub use report::{ReplayOutcome, TickReport};
pub use sequencer::{LoopbackSequencer, LoopbackTransport};
pub use session::SessionRegistry;
pub use simulation::Simulation;
