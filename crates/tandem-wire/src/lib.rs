//! Wire primitives for Tandem.
//!
//! A small, fixed set of little-endian encodings (integers of several
//! widths, floats, bools, length-prefixed strings and byte blobs) plus a
//! per-stream [`WireContext`] side channel that carries out-of-band
//! metadata such as which scope a payload belongs to.
//!
//! # Command frame
//!
//! ```text
//! [handler u32] [tick u32] [scope i32, -1 = global] [payload: u32 len + bytes]
//! ```
//!
//! The format is intentionally simple: no compression, no alignment
//! padding, no self-describing schema. Whatever a payload means is known
//! only to the handler that wrote it.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod context;
pub mod error;
pub mod frame;
pub mod hash;
pub mod reader;
pub mod writer;

pub use context::WireContext;
pub use error::WireError;
pub use frame::{decode_command, decode_delivery, encode_command, encode_pending};
pub use hash::{fnv1a, Fnv1a};
pub use reader::ByteReader;
pub use writer::ByteWriter;

/// Largest string or byte blob accepted by [`ByteReader`] (16 MiB).
///
/// Guards against allocating for a corrupt length prefix.
pub const MAX_BLOB_LEN: usize = 16 * 1024 * 1024;
