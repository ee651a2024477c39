//! Capture handlers for Tandem.
//!
//! A capture handler turns a local mutation into a command instead of
//! applying it, then applies the command on every peer when its tick
//! comes. Three kinds exist:
//!
//! - [`FieldHandler`]: set member M of target T to V, optionally at index I
//! - [`OperationHandler`]: invoke operation O on target T with arguments A
//! - [`ClosureHandler`]: invoke a unit of work whose captured state is a
//!   fixed [`ClosureShape`]
//!
//! Handlers are collected by a [`HandlerTableBuilder`] at startup into an
//! immutable [`HandlerTable`]. The table assigns every handler a
//! [`HandlerId`](tandem_core::HandlerId) from the sorted handler names, so
//! ids agree across peers regardless of registration order, and exposes a
//! fingerprint peers compare before connecting.
//!
//! The encode path lives on [`Capturer`]; the decode path is
//! [`HandlerTable::apply`], which runs against an explicit
//! [`ExecutionContext`] rather than any global "current scope" state.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod apply;
pub mod capturer;
pub mod closure;
pub mod context;
pub mod error;
pub mod handler;
pub mod table;

pub use apply::{Applied, SkipReason};
pub use capturer::Capturer;
pub use closure::{ClosureEnv, ClosureShape};
pub use context::{Ambient, AmbientGuard, CellCoord, ContextFlags, ExecutionContext};
pub use error::{CaptureError, CommandError, RegistrationError};
pub use handler::{
    ApplyHook, ClosureFn, ClosureHandler, FieldGetter, FieldHandler, FieldSetter, FlushInterval,
    HandlerKind, HandlerMeta, OperationFn, OperationHandler,
};
pub use table::{ClosureHandle, FieldHandle, HandlerTable, HandlerTableBuilder, OperationHandle};
