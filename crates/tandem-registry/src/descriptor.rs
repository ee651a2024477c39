//! Per-type encoding descriptors.

use crate::prim::PrimKind;
use crate::reference::RefCategory;
use crate::value::{TypeName, TypeRef};
use tandem_wire::Fnv1a;

/// How a registered named type is laid out on the wire.
///
/// Descriptors are immutable once the registry is built and may be read
/// from any thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeDescriptor {
    /// Enum delegated to an integer representation.
    Enum {
        /// Integer primitive carrying the discriminant.
        repr: PrimKind,
        /// Declared discriminants; anything else is rejected both ways.
        discriminants: Vec<i64>,
    },
    /// Fixed-shape value record, fields encoded in declaration order.
    Record {
        /// Field names and static types, in declaration order.
        fields: Vec<(String, TypeRef)>,
    },
    /// Entity-like type, encoded as a reference in its selected category.
    Reference {
        /// The category used on the wire.
        category: RefCategory,
    },
    /// Open polymorphic interface, encoded as an index into a closed list.
    Interface {
        /// Concrete implementations, sorted by name.
        implementations: Vec<TypeName>,
    },
    /// Reference to a scope: `i32`, `-1` = global, `i32::MIN` = null.
    Scope,
}

impl TypeDescriptor {
    /// Short kind label for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Enum { .. } => "enum",
            Self::Record { .. } => "record",
            Self::Reference { .. } => "reference",
            Self::Interface { .. } => "interface",
            Self::Scope => "scope",
        }
    }

    /// Named types this descriptor depends on.
    pub(crate) fn dependencies(&self) -> Vec<&TypeName> {
        let mut out = Vec::new();
        match self {
            Self::Record { fields } => {
                for (_, ty) in fields {
                    collect_named(ty, &mut out);
                }
            }
            Self::Interface { implementations } => out.extend(implementations.iter()),
            Self::Enum { .. } | Self::Reference { .. } | Self::Scope => {}
        }
        out
    }

    /// Fold the wire-relevant shape into a fingerprint.
    pub(crate) fn digest(&self, h: &mut Fnv1a) {
        h.write_str(self.kind());
        match self {
            Self::Enum {
                repr,
                discriminants,
            } => {
                h.write_str(repr.name());
                for d in discriminants {
                    h.write_u64(*d as u64);
                }
            }
            Self::Record { fields } => {
                h.write_u32(fields.len() as u32);
                for (name, ty) in fields {
                    h.write_str(name);
                    h.write_str(&ty.to_string());
                }
            }
            Self::Reference { category } => h.write_str(category.name()),
            Self::Interface { implementations } => {
                h.write_u32(implementations.len() as u32);
                for name in implementations {
                    h.write_str(name.as_str());
                }
            }
            Self::Scope => {}
        }
    }
}

/// Append every named type reachable from `ty`.
pub(crate) fn collect_named<'a>(ty: &'a TypeRef, out: &mut Vec<&'a TypeName>) {
    match ty {
        TypeRef::Unit | TypeRef::Prim(_) => {}
        TypeRef::Named(name) => out.push(name),
        TypeRef::List(inner) | TypeRef::Nullable(inner) => collect_named(inner, out),
    }
}
