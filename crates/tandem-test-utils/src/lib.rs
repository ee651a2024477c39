//! Test utilities for Tandem.
//!
//! [`Colony`] is a small deterministic host world; [`colony_table`] builds
//! its handler table. [`Cluster`] runs several peers in lockstep behind a
//! loopback sequencer.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod colony;
pub mod fixtures;
pub mod harness;
pub mod transport;

pub use colony::{worker_id, worker_ref, Blueprint, Colony, ColonyMap, ColonySnapshot, Trade, Worker};
pub use fixtures::{blueprint_env, blueprint_shape, cell, colony_registry, colony_table, ColonyHandles};
pub use harness::{catch_up, Cluster, Peer};
pub use transport::{loop_back, NullTransport, RecordingTransport};

/// Install a test logger once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
