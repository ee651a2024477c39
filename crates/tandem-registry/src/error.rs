//! Error types for registry construction, encoding, and decoding.

use tandem_wire::WireError;
use thiserror::Error;

/// Errors detected while building a [`TypeRegistry`](crate::TypeRegistry).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two types were registered under the same name.
    #[error("type '{name}' registered twice")]
    DuplicateType {
        /// The duplicated name.
        name: String,
    },
    /// A record field, list element, or implementation names an unregistered type.
    #[error("type '{owner}' refers to unregistered type '{missing}'")]
    UnresolvedType {
        /// The type that holds the reference.
        owner: String,
        /// The missing type.
        missing: String,
    },
    /// An enum was declared over a non-integer representation.
    #[error("enum '{name}' must use an integer representation")]
    NonIntegerEnum {
        /// The enum name.
        name: String,
    },
    /// A discriminant does not fit the enum's representation.
    #[error("enum '{name}' discriminant {discriminant} does not fit its representation")]
    DiscriminantOutOfRange {
        /// The enum name.
        name: String,
        /// The offending discriminant.
        discriminant: i64,
    },
    /// A reference type was declared with no category.
    #[error("reference type '{name}' has no category")]
    NoCategory {
        /// The reference type name.
        name: String,
    },
    /// An implementation names a type that is not a registered interface.
    #[error("'{name}' is not a registered interface")]
    NotAnInterface {
        /// The name that was used as an interface.
        name: String,
    },
    /// An interface was named as a concrete implementation.
    #[error("interface '{name}' cannot be an implementation")]
    AbstractImplementation {
        /// The interface name.
        name: String,
    },
    /// An interface has more implementations than a u16 index can address.
    #[error("interface '{name}' has {count} implementations, more than a u16 index allows")]
    TooManyImplementations {
        /// The interface name.
        name: String,
        /// Number of implementations.
        count: usize,
    },
}

/// Errors raised while encoding a value.
///
/// Fatal to the single command being captured; the caller decides whether
/// to retry, warn, or drop the action.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// The requested static type is not registered.
    #[error("unregistered type '{ty}'")]
    UnknownType {
        /// The requested type.
        ty: String,
    },
    /// The value's runtime type is not assignable to the requested type.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// The requested static type.
        expected: String,
        /// The value's runtime shape.
        found: String,
    },
    /// A record value has the wrong number of fields.
    #[error("record '{ty}' expects {expected} fields, found {found}")]
    FieldCount {
        /// The record type.
        ty: String,
        /// Declared field count.
        expected: usize,
        /// Fields supplied.
        found: usize,
    },
    /// An enum discriminant is not declared or does not fit.
    #[error("enum '{ty}' has no discriminant {discriminant}")]
    BadDiscriminant {
        /// The enum type.
        ty: String,
        /// The offending discriminant.
        discriminant: i64,
    },
    /// An object's concrete type is not in its interface's implementation list.
    #[error("'{concrete}' is not an implementation of '{interface}'")]
    UnknownImplementation {
        /// The interface type.
        interface: String,
        /// The concrete type of the value.
        concrete: String,
    },
    /// A reference id collides with its category's null marker.
    #[error("'{ty}' id {id} is outside the encodable range")]
    IdOutOfRange {
        /// The reference type.
        ty: String,
        /// The offending id.
        id: u64,
    },
    /// The value does not fit the wire (e.g. a list longer than u16).
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Errors raised while decoding a payload.
///
/// Fatal to the single command on the receiving peer; caught at the
/// scheduler's per-command boundary.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The requested static type is not registered.
    #[error("unregistered type '{ty}'")]
    UnknownType {
        /// The requested type.
        ty: String,
    },
    /// A decoded discriminant is not declared for the enum.
    #[error("enum '{ty}' has no discriminant {discriminant}")]
    BadEnumDiscriminant {
        /// The enum type.
        ty: String,
        /// The decoded discriminant.
        discriminant: i64,
    },
    /// An implementation index is past the end of the interface's list.
    #[error("interface '{interface}' has no implementation at index {index}")]
    BadImplementationIndex {
        /// The interface type.
        interface: String,
        /// The decoded index.
        index: u16,
    },
    /// A multi-container entity reference used an unknown discriminator.
    #[error("unknown entity container discriminator {tag}")]
    BadReferenceDiscriminant {
        /// The decoded tag.
        tag: u8,
    },
    /// A scope reference was negative but not the global marker.
    #[error("invalid scope reference {raw}")]
    BadScope {
        /// The raw decoded value.
        raw: i32,
    },
    /// Values nested deeper than the decoder accepts.
    #[error("value nesting exceeds {max}")]
    TooDeep {
        /// The nesting limit.
        max: usize,
    },
    /// A typed decode produced a value of an unexpected shape.
    #[error("decoded value does not convert to {expected}")]
    ShapeMismatch {
        /// The requested type.
        expected: String,
    },
    /// Malformed bytes.
    #[error(transparent)]
    Wire(#[from] WireError),
}
