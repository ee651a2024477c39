//! Core types and traits for the Tandem lockstep synchronization engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by every other crate in the workspace:
//! strongly-typed ids, the [`Command`] model, the per-scope random
//! stream ([`ScopeRng`]), the error types host code returns, and the
//! [`Transport`] boundary.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod command;
pub mod error;
pub mod id;
pub mod rng;
pub mod traits;

pub use command::{Command, PendingCommand};
pub use error::{InvokeError, TransportError};
pub use id::{DefId, EntityId, HandlerId, PeerId, ScopeId, SessionId, TickId};
pub use rng::{RngState, ScopeRng};
pub use traits::Transport;
