//! Error types for the wire codec.

use thiserror::Error;

/// Errors produced while reading or writing wire primitives.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WireError {
    /// The stream ended before a value could be read.
    #[error("truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes required by the value being read.
        needed: usize,
        /// Bytes left in the stream.
        remaining: usize,
    },
    /// A length does not fit its prefix, or exceeds the accepted maximum.
    #[error("length {len} exceeds maximum {max}")]
    LengthOverflow {
        /// The offending length.
        len: usize,
        /// The largest length the prefix (or the reader) accepts.
        max: usize,
    },
    /// A string payload was not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,
    /// A bool byte was neither 0 nor 1.
    #[error("invalid bool byte {byte}")]
    InvalidBool {
        /// The byte found.
        byte: u8,
    },
    /// A scope wire value was negative but not the global marker.
    #[error("invalid scope id {raw}")]
    InvalidScope {
        /// The raw wire value.
        raw: i32,
    },
    /// Bytes were left over after a complete value was read.
    #[error("{count} trailing bytes after payload")]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },
}
