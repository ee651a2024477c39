//! Type references and the dynamic value model.

use std::fmt;
use std::sync::Arc;

use tandem_core::{DefId, ScopeId, SessionId};

use crate::prim::PrimKind;
use crate::reference::EntityRef;

/// Stable name of a registered type.
///
/// Names, not memory layout or registration order, identify types across
/// peers; the registry sorts by name wherever an ordering must be shared.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName(Arc<str>);

impl TypeName {
    /// Create a name.
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The static type a caller asks the registry to encode or decode.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// No value at all (targetless handlers).
    Unit,
    /// A fixed-width primitive, string, or blob.
    Prim(PrimKind),
    /// A type registered by name: enum, record, reference, scope, interface.
    Named(TypeName),
    /// A u16-counted sequence of elements.
    List(Box<TypeRef>),
    /// An optional value.
    Nullable(Box<TypeRef>),
}

impl TypeRef {
    /// A registered named type.
    pub fn named(name: &str) -> Self {
        Self::Named(TypeName::new(name))
    }

    /// A list of `elem`.
    pub fn list(elem: TypeRef) -> Self {
        Self::List(Box::new(elem))
    }

    /// An optional `inner`.
    pub fn nullable(inner: TypeRef) -> Self {
        Self::Nullable(Box::new(inner))
    }

    /// The pre-registered scope reference type.
    pub fn scope() -> Self {
        Self::named(crate::SCOPE_TYPE)
    }
}

impl From<PrimKind> for TypeRef {
    fn from(kind: PrimKind) -> Self {
        Self::Prim(kind)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => write!(f, "()"),
            Self::Prim(p) => write!(f, "{}", p.name()),
            Self::Named(n) => write!(f, "{n}"),
            Self::List(e) => write!(f, "[{e}]"),
            Self::Nullable(i) => write!(f, "{i}?"),
        }
    }
}

/// A tagged-union simulation value.
///
/// Named variants carry their type name so the registry can reject a
/// value whose runtime type is not the requested static type.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// No value.
    Unit,
    /// `bool`.
    Bool(bool),
    /// `u8`.
    U8(u8),
    /// `i8`.
    I8(i8),
    /// `u16`.
    U16(u16),
    /// `i16`.
    I16(i16),
    /// `u32`.
    U32(u32),
    /// `i32`.
    I32(i32),
    /// `u64`.
    U64(u64),
    /// `i64`.
    I64(i64),
    /// `f32`.
    F32(f32),
    /// `f64`.
    F64(f64),
    /// UTF-8 string.
    Str(String),
    /// Opaque byte blob.
    Bytes(Vec<u8>),
    /// Enum variant, by discriminant.
    Enum {
        /// Enum type.
        ty: TypeName,
        /// Variant discriminant.
        discriminant: i64,
    },
    /// Fixed-shape value record; fields in declaration order.
    Record {
        /// Record type.
        ty: TypeName,
        /// Field values in declaration order.
        fields: Vec<Value>,
    },
    /// List elements.
    List(Vec<Value>),
    /// Null, or a reference that did not resolve ("absent").
    Null,
    /// Reference to a simulation entity.
    Entity {
        /// Entity type.
        ty: TypeName,
        /// Where the entity lives.
        reference: EntityRef,
    },
    /// Reference to an interactive session.
    Session {
        /// Session type.
        ty: TypeName,
        /// Session id.
        id: SessionId,
    },
    /// Reference to static definition data.
    Def {
        /// Definition type.
        ty: TypeName,
        /// Definition short hash.
        id: DefId,
    },
    /// Reference to a scope.
    Scope(ScopeId),
    /// Concrete implementation of a polymorphic interface.
    Object {
        /// Concrete implementation type.
        ty: TypeName,
        /// The implementation's own payload.
        payload: Box<Value>,
    },
}

impl Value {
    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short description of the runtime shape, for error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Unit => "()".into(),
            Self::Bool(_) => "bool".into(),
            Self::U8(_) => "u8".into(),
            Self::I8(_) => "i8".into(),
            Self::U16(_) => "u16".into(),
            Self::I16(_) => "i16".into(),
            Self::U32(_) => "u32".into(),
            Self::I32(_) => "i32".into(),
            Self::U64(_) => "u64".into(),
            Self::I64(_) => "i64".into(),
            Self::F32(_) => "f32".into(),
            Self::F64(_) => "f64".into(),
            Self::Str(_) => "string".into(),
            Self::Bytes(_) => "bytes".into(),
            Self::Enum { ty, .. }
            | Self::Record { ty, .. }
            | Self::Entity { ty, .. }
            | Self::Session { ty, .. }
            | Self::Def { ty, .. }
            | Self::Object { ty, .. } => ty.to_string(),
            Self::List(_) => "list".into(),
            Self::Null => "null".into(),
            Self::Scope(_) => crate::SCOPE_TYPE.into(),
        }
    }

    /// Shorthand for an entity spawned directly in its scope.
    pub fn entity(ty: &str, id: u32) -> Self {
        Self::Entity {
            ty: TypeName::new(ty),
            reference: EntityRef::Spawned(tandem_core::EntityId(id)),
        }
    }

    /// Shorthand for an enum variant.
    pub fn enumeration(ty: &str, discriminant: i64) -> Self {
        Self::Enum {
            ty: TypeName::new(ty),
            discriminant,
        }
    }

    /// Shorthand for a record.
    pub fn record(ty: &str, fields: Vec<Value>) -> Self {
        Self::Record {
            ty: TypeName::new(ty),
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_ref_display_is_readable() {
        let t = TypeRef::nullable(TypeRef::list(TypeRef::named("Worker")));
        assert_eq!(t.to_string(), "[Worker]?");
        assert_eq!(TypeRef::Prim(PrimKind::I32).to_string(), "i32");
    }

    #[test]
    fn named_values_describe_their_type() {
        assert_eq!(Value::entity("Worker", 3).describe(), "Worker");
        assert_eq!(Value::Scope(ScopeId::Global).describe(), "Scope");
        assert_eq!(Value::Null.describe(), "null");
    }
}
