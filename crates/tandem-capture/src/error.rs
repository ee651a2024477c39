//! Capture, registration, and per-command errors.

use tandem_core::{HandlerId, InvokeError};
use tandem_registry::{DecodeError, EncodeError};
use thiserror::Error;

/// Errors building a [`HandlerTable`](crate::HandlerTable).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// Two handlers share a name.
    #[error("handler '{name}' registered twice")]
    DuplicateName {
        /// The duplicated name.
        name: String,
    },
    /// A handler names a type the registry does not know.
    #[error("handler '{handler}' uses an unregistered type: {source}")]
    UnknownType {
        /// The handler name.
        handler: String,
        /// The registry's complaint.
        source: EncodeError,
    },
    /// A handler captures the selection but no selection type was set.
    #[error("handler '{handler}' captures the selection but the table has no selection type")]
    NoSelectionType {
        /// The handler name.
        handler: String,
    },
    /// More handlers than a u32 id can address.
    #[error("too many handlers: {count}")]
    TooManyHandlers {
        /// Number of registered handlers.
        count: usize,
    },
}

/// Errors from the capture (encode) path.
///
/// Returned to the collaborator that attempted the mutation, which decides
/// whether to retry, warn, or drop the action. Nothing has been sent when
/// one of these is returned.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// A target, argument, or ambient value failed to encode.
    #[error("encoding failed for '{handler}': {source}")]
    Encode {
        /// The handler name.
        handler: String,
        /// The registry's error.
        source: EncodeError,
    },
    /// The handler is debug-only and debug mode is off.
    #[error("handler '{handler}' is debug-only")]
    DebugDisabled {
        /// The handler name.
        handler: String,
    },
    /// The handle does not belong to this table, or names another kind.
    #[error("handler id {id} is not a {expected} handler in this table")]
    WrongHandlerKind {
        /// The handler id the handle mapped to.
        id: HandlerId,
        /// The kind the caller expected.
        expected: &'static str,
    },
    /// An operation was captured with the wrong number of arguments.
    #[error("handler '{handler}' takes {expected} arguments, got {found}")]
    ArgumentCount {
        /// The handler name.
        handler: String,
        /// Declared argument count.
        expected: usize,
        /// Arguments supplied.
        found: usize,
    },
    /// A closure environment lacks one of the shape's captured paths.
    #[error("closure '{handler}' is missing captured path '{path}'")]
    MissingClosurePath {
        /// The handler name.
        handler: String,
        /// The missing path.
        path: String,
    },
}

/// Errors applying one delivered command.
///
/// Caught at the scheduler's per-command boundary: logged, counted, and
/// never allowed to abort the rest of the tick.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    /// No handler is registered under this id.
    #[error("unknown handler id {id}")]
    UnknownHandler {
        /// The delivered id.
        id: HandlerId,
    },
    /// The payload did not decode.
    #[error("'{handler}' payload did not decode: {source}")]
    Decode {
        /// The handler name.
        handler: String,
        /// The registry's error.
        source: DecodeError,
    },
    /// The payload decoded but bytes were left over.
    #[error("'{handler}' payload has {count} trailing bytes")]
    TrailingBytes {
        /// The handler name.
        handler: String,
        /// Unconsumed byte count.
        count: usize,
    },
    /// The host operation returned an error.
    #[error("'{handler}' failed: {source}")]
    Invoke {
        /// The handler name.
        handler: String,
        /// The host's error.
        source: InvokeError,
    },
    /// The host operation panicked.
    #[error("'{handler}' panicked: {message}")]
    Panicked {
        /// The handler name.
        handler: String,
        /// The panic payload, if it was a string.
        message: String,
    },
}
