//! Static Rust types that map onto registry values.

use tandem_core::ScopeId;

use crate::prim::PrimKind;
use crate::value::{TypeRef, Value};

/// A Rust type with a fixed registry type.
///
/// Lets host code encode plain Rust values without building [`Value`]s by
/// hand. Entity-like types stay dynamic; they carry a type name the host
/// registers at startup.
pub trait Syncable: Sized {
    /// The static type this Rust type encodes as.
    fn type_ref() -> TypeRef;

    /// Convert into a dynamic value.
    fn to_value(&self) -> Value;

    /// Convert back; `None` if the value has another shape.
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! prim_syncable {
    ($($ty:ty => $kind:ident),* $(,)?) => {$(
        impl Syncable for $ty {
            fn type_ref() -> TypeRef {
                TypeRef::Prim(PrimKind::$kind)
            }

            fn to_value(&self) -> Value {
                Value::$kind(self.clone())
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$kind(v) => Some(v),
                    _ => None,
                }
            }
        }
    )*};
}

prim_syncable! {
    bool => Bool,
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    String => Str,
}

impl Syncable for ScopeId {
    fn type_ref() -> TypeRef {
        TypeRef::scope()
    }

    fn to_value(&self) -> Value {
        Value::Scope(*self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Scope(s) => Some(s),
            _ => None,
        }
    }
}

impl<T: Syncable> Syncable for Vec<T> {
    fn type_ref() -> TypeRef {
        TypeRef::list(T::type_ref())
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(Syncable::to_value).collect())
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

impl<T: Syncable> Syncable for Option<T> {
    fn type_ref() -> TypeRef {
        TypeRef::nullable(T::type_ref())
    }

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            v => T::from_value(v).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NoEntities, RegistryBuilder};
    use tandem_wire::{ByteReader, ByteWriter};

    #[test]
    fn nested_rust_types_round_trip() {
        let reg = RegistryBuilder::new().build().unwrap();
        let v: Vec<Option<String>> = vec![Some("haul".into()), None, Some(String::new())];
        let mut w = ByteWriter::new();
        reg.encode_typed(&mut w, &v).unwrap();
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        let back: Vec<Option<String>> = reg.decode_typed(&mut r, &NoEntities).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn scope_is_syncable() {
        let reg = RegistryBuilder::new().build().unwrap();
        let mut w = ByteWriter::new();
        reg.encode_typed(&mut w, &ScopeId::Map(3)).unwrap();
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(reg.decode_typed::<ScopeId>(&mut r, &NoEntities).unwrap(), ScopeId::Map(3));
    }

    #[test]
    fn shape_mismatch_is_reported() {
        assert_eq!(u32::from_value(Value::I32(1)), None);
        assert_eq!(Option::<u8>::from_value(Value::Null), Some(None));
    }
}
