//! Type Registry: a closed table from type to reader/writer.
//!
//! Values cross the wire as a tagged union ([`Value`]) checked against
//! the static type the caller asks for ([`TypeRef`]). The registry never
//! guesses: an unregistered type, or a value whose shape does not match
//! the requested type, is a hard error, since a payload that one peer can
//! read and another cannot is exactly the bug class this crate prevents.
//!
//! # Resolution order
//!
//! 1. exact primitive ([`PrimKind`])
//! 2. enum, delegated to its integer representation
//! 3. list: u16 count, then each element recursively
//! 4. nullable: `is_null` bool, then legacy `has_value` bool, then the value
//! 5. named types: records, reference categories (fixed priority, see
//!    [`RefCategory`]), scopes, and polymorphic interfaces
//!
//! Entity-like types never serialize their state, only a reference that
//! the receiving peer resolves through an [`EntityResolver`] against the
//! scope carried by the reader's [`WireContext`](tandem_wire::WireContext).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod builder;
pub mod descriptor;
pub mod error;
pub mod prim;
pub mod reference;
pub mod registry;
pub mod typed;
pub mod value;

pub use builder::RegistryBuilder;
pub use descriptor::TypeDescriptor;
pub use error::{DecodeError, EncodeError, RegistryError};
pub use prim::PrimKind;
pub use reference::{EntityRef, EntityResolver, NoEntities, RefCategory};
pub use registry::TypeRegistry;
pub use typed::Syncable;
pub use value::{TypeName, TypeRef, Value};

/// Name under which scope references are pre-registered.
pub const SCOPE_TYPE: &str = "Scope";

/// Deepest value nesting accepted by the decoder.
pub const MAX_DECODE_DEPTH: usize = 64;
