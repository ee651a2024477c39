//! The frozen type registry and its encode/decode dispatch.

use indexmap::IndexMap;
use tandem_core::ScopeId;
use tandem_wire::{ByteReader, ByteWriter, Fnv1a};

use crate::descriptor::{collect_named, TypeDescriptor};
use crate::error::{DecodeError, EncodeError};
use crate::reference::{read_reference, write_reference, EntityResolver};
use crate::typed::Syncable;
use crate::value::{TypeName, TypeRef, Value};
use crate::MAX_DECODE_DEPTH;

/// Immutable table from type name to descriptor.
///
/// Dispatch is always by the static [`TypeRef`] the caller requests; a
/// value whose runtime shape is not assignable to it is rejected.
#[derive(Clone, Debug)]
pub struct TypeRegistry {
    types: IndexMap<TypeName, TypeDescriptor>,
}

impl TypeRegistry {
    pub(crate) fn from_types(types: IndexMap<TypeName, TypeDescriptor>) -> Self {
        Self { types }
    }

    /// Descriptor of a named type.
    pub fn descriptor(&self, name: &TypeName) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    /// Number of named types, including the built-in scope type.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Always false: the scope type is pre-registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Closed, name-sorted implementation list of an interface.
    pub fn implementations(&self, interface: &TypeName) -> Option<&[TypeName]> {
        match self.types.get(interface) {
            Some(TypeDescriptor::Interface { implementations }) => Some(implementations),
            _ => None,
        }
    }

    /// Verify every named type reachable from `ty` is registered.
    pub fn check(&self, ty: &TypeRef) -> Result<(), EncodeError> {
        let mut names = Vec::new();
        collect_named(ty, &mut names);
        match names.into_iter().find(|n| !self.types.contains_key(*n)) {
            Some(missing) => Err(EncodeError::UnknownType {
                ty: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Digest of every descriptor, in name order.
    ///
    /// Peers with different registries produce different fingerprints.
    pub fn fingerprint(&self) -> u64 {
        let mut h = Fnv1a::new();
        for (name, descriptor) in &self.types {
            h.write_str(name.as_str());
            descriptor.digest(&mut h);
        }
        h.finish()
    }

    /// Encode `value` as static type `ty`.
    pub fn encode(&self, w: &mut ByteWriter, ty: &TypeRef, value: &Value) -> Result<(), EncodeError> {
        match (ty, value) {
            (TypeRef::Unit, Value::Unit) => Ok(()),
            (TypeRef::Prim(kind), v) => kind.write(w, v),
            (TypeRef::List(elem), Value::List(items)) => {
                w.write_len_u16(items.len())?;
                for item in items {
                    self.encode(w, elem, item)?;
                }
                Ok(())
            }
            (TypeRef::Nullable(_), Value::Null) => {
                w.write_bool(true);
                Ok(())
            }
            (TypeRef::Nullable(inner), v) => {
                w.write_bool(false);
                w.write_bool(true);
                self.encode(w, inner, v)
            }
            (TypeRef::Named(name), v) => self.encode_named(w, name, v),
            (ty, v) => Err(EncodeError::TypeMismatch {
                expected: ty.to_string(),
                found: v.describe(),
            }),
        }
    }

    fn encode_named(&self, w: &mut ByteWriter, name: &TypeName, value: &Value) -> Result<(), EncodeError> {
        let descriptor = self.types.get(name).ok_or_else(|| EncodeError::UnknownType {
            ty: name.to_string(),
        })?;
        let mismatch = || EncodeError::TypeMismatch {
            expected: name.to_string(),
            found: value.describe(),
        };
        match descriptor {
            TypeDescriptor::Enum {
                repr,
                discriminants,
            } => match value {
                Value::Enum { ty, discriminant } if ty == name => {
                    if !discriminants.contains(discriminant) {
                        return Err(EncodeError::BadDiscriminant {
                            ty: name.to_string(),
                            discriminant: *discriminant,
                        });
                    }
                    repr.write_discriminant(w, *discriminant, name.as_str())
                }
                _ => Err(mismatch()),
            },
            TypeDescriptor::Record { fields } => match value {
                Value::Record { ty, fields: values } if ty == name => {
                    if values.len() != fields.len() {
                        return Err(EncodeError::FieldCount {
                            ty: name.to_string(),
                            expected: fields.len(),
                            found: values.len(),
                        });
                    }
                    for ((_, field_ty), v) in fields.iter().zip(values) {
                        self.encode(w, field_ty, v)?;
                    }
                    Ok(())
                }
                _ => Err(mismatch()),
            },
            TypeDescriptor::Reference { category } => write_reference(w, name, *category, value),
            TypeDescriptor::Scope => match value {
                Value::Scope(scope) if scope.is_wire_representable() => {
                    w.write_i32(scope.to_wire());
                    Ok(())
                }
                Value::Null => {
                    w.write_i32(i32::MIN);
                    Ok(())
                }
                _ => Err(mismatch()),
            },
            TypeDescriptor::Interface { implementations } => match value {
                Value::Null => {
                    w.write_u16(u16::MAX);
                    Ok(())
                }
                Value::Object { ty, payload } => {
                    let index = implementations.binary_search(ty).map_err(|_| {
                        EncodeError::UnknownImplementation {
                            interface: name.to_string(),
                            concrete: ty.to_string(),
                        }
                    })?;
                    w.write_u16(index as u16);
                    self.encode_named(w, ty, payload)
                }
                _ => Err(mismatch()),
            },
        }
    }

    /// Decode one value of static type `ty`.
    ///
    /// References resolve against `resolver` in the scope carried by the
    /// reader's context; unresolved references decode to [`Value::Null`].
    pub fn decode(
        &self,
        r: &mut ByteReader<'_>,
        ty: &TypeRef,
        resolver: &dyn EntityResolver,
    ) -> Result<Value, DecodeError> {
        self.decode_at(r, ty, resolver, 0)
    }

    fn decode_at(
        &self,
        r: &mut ByteReader<'_>,
        ty: &TypeRef,
        resolver: &dyn EntityResolver,
        depth: usize,
    ) -> Result<Value, DecodeError> {
        if depth > MAX_DECODE_DEPTH {
            return Err(DecodeError::TooDeep {
                max: MAX_DECODE_DEPTH,
            });
        }
        match ty {
            TypeRef::Unit => Ok(Value::Unit),
            TypeRef::Prim(kind) => kind.read(r),
            TypeRef::List(elem) => {
                let len = r.read_len_u16()?;
                let mut items = Vec::with_capacity(len.min(r.remaining()));
                for _ in 0..len {
                    items.push(self.decode_at(r, elem, resolver, depth + 1)?);
                }
                Ok(Value::List(items))
            }
            TypeRef::Nullable(inner) => {
                if r.read_bool()? {
                    return Ok(Value::Null);
                }
                // Legacy "present but without value" marker.
                if !r.read_bool()? {
                    return Ok(Value::Null);
                }
                self.decode_at(r, inner, resolver, depth + 1)
            }
            TypeRef::Named(name) => self.decode_named(r, name, resolver, depth),
        }
    }

    fn decode_named(
        &self,
        r: &mut ByteReader<'_>,
        name: &TypeName,
        resolver: &dyn EntityResolver,
        depth: usize,
    ) -> Result<Value, DecodeError> {
        let descriptor = self.types.get(name).ok_or_else(|| DecodeError::UnknownType {
            ty: name.to_string(),
        })?;
        match descriptor {
            TypeDescriptor::Enum {
                repr,
                discriminants,
            } => {
                let discriminant = repr.read_discriminant(r)?;
                if !discriminants.contains(&discriminant) {
                    return Err(DecodeError::BadEnumDiscriminant {
                        ty: name.to_string(),
                        discriminant,
                    });
                }
                Ok(Value::Enum {
                    ty: name.clone(),
                    discriminant,
                })
            }
            TypeDescriptor::Record { fields } => {
                let mut values = Vec::with_capacity(fields.len());
                for (_, field_ty) in fields {
                    values.push(self.decode_at(r, field_ty, resolver, depth + 1)?);
                }
                Ok(Value::Record {
                    ty: name.clone(),
                    fields: values,
                })
            }
            TypeDescriptor::Reference { category } => read_reference(r, name, *category, resolver),
            TypeDescriptor::Scope => {
                let raw = r.read_i32()?;
                if raw == i32::MIN {
                    return Ok(Value::Null);
                }
                let scope = ScopeId::from_wire(raw).ok_or(DecodeError::BadScope { raw })?;
                if resolver.resolve_scope(scope) {
                    Ok(Value::Scope(scope))
                } else {
                    log::debug!("scope reference {scope} no longer exists; treating as absent");
                    Ok(Value::Null)
                }
            }
            TypeDescriptor::Interface { implementations } => {
                let index = r.read_u16()?;
                if index == u16::MAX {
                    return Ok(Value::Null);
                }
                let concrete = implementations.get(index as usize).ok_or_else(|| {
                    DecodeError::BadImplementationIndex {
                        interface: name.to_string(),
                        index,
                    }
                })?;
                let payload = self.decode_named(r, concrete, resolver, depth + 1)?;
                if payload.is_null() {
                    return Ok(Value::Null);
                }
                Ok(Value::Object {
                    ty: concrete.clone(),
                    payload: Box::new(payload),
                })
            }
        }
    }

    /// Encode `value` into a fresh buffer.
    pub fn to_bytes(&self, ty: &TypeRef, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let mut w = ByteWriter::new();
        self.encode(&mut w, ty, value)?;
        Ok(w.into_bytes())
    }

    /// Encode a statically-typed Rust value.
    pub fn encode_typed<T: Syncable>(&self, w: &mut ByteWriter, value: &T) -> Result<(), EncodeError> {
        self.encode(w, &T::type_ref(), &value.to_value())
    }

    /// Decode a statically-typed Rust value.
    pub fn decode_typed<T: Syncable>(
        &self,
        r: &mut ByteReader<'_>,
        resolver: &dyn EntityResolver,
    ) -> Result<T, DecodeError> {
        let ty = T::type_ref();
        let value = self.decode(r, &ty, resolver)?;
        T::from_value(value).ok_or_else(|| DecodeError::ShapeMismatch {
            expected: ty.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityRef, NoEntities, PrimKind, RefCategory, RegistryBuilder};
    use tandem_core::{DefId, EntityId, SessionId};
    use tandem_wire::WireContext;

    struct Live;

    impl EntityResolver for Live {
        fn resolve_entity(&self, scope: ScopeId, _: &TypeName, r: &EntityRef) -> Option<EntityRef> {
            // Only ids below 100 exist, and only in map 1 or the global scope.
            (r.id().0 < 100 && matches!(scope, ScopeId::Map(1) | ScopeId::Global)).then_some(*r)
        }

        fn resolve_session(&self, _: &TypeName, id: SessionId) -> bool {
            id.0 == 7
        }
    }

    fn registry() -> TypeRegistry {
        RegistryBuilder::new()
            .enumeration("Priority", PrimKind::U8, &[0, 1, 2, 3, 4, 5])
            .reference("Worker", &[RefCategory::Spawned])
            .reference("Item", &[RefCategory::Spawned, RefCategory::Thing])
            .reference("Trade", &[RefCategory::Session])
            .reference("Recipe", &[RefCategory::Definition])
            .reference("Colony", &[RefCategory::WorldObject])
            .record("Cell", &[("x", PrimKind::I32.into()), ("z", PrimKind::I32.into())])
            .interface("Job")
            .record("Haul", &[("item", TypeRef::named("Item"))])
            .record("Dig", &[("at", TypeRef::named("Cell"))])
            .implementation("Job", "Haul")
            .implementation("Job", "Dig")
            .build()
            .unwrap()
    }

    fn round_trip(reg: &TypeRegistry, ty: &TypeRef, v: &Value, resolver: &dyn EntityResolver) -> Value {
        let bytes = reg.to_bytes(ty, v).unwrap();
        let mut r = ByteReader::with_context(&bytes, WireContext::for_scope(ScopeId::Map(1)));
        let out = reg.decode(&mut r, ty, resolver).unwrap();
        r.finish().unwrap();
        out
    }

    #[test]
    fn enum_round_trips_through_repr() {
        let reg = registry();
        let ty = TypeRef::named("Priority");
        let v = Value::enumeration("Priority", 5);
        assert_eq!(reg.to_bytes(&ty, &v).unwrap(), vec![5]);
        assert_eq!(round_trip(&reg, &ty, &v, &NoEntities), v);
    }

    #[test]
    fn undeclared_discriminant_rejected_both_ways() {
        let reg = registry();
        let ty = TypeRef::named("Priority");
        assert!(matches!(
            reg.to_bytes(&ty, &Value::enumeration("Priority", 9)),
            Err(EncodeError::BadDiscriminant { discriminant: 9, .. })
        ));
        let mut r = ByteReader::new(&[9]);
        assert!(matches!(
            reg.decode(&mut r, &ty, &NoEntities),
            Err(DecodeError::BadEnumDiscriminant { discriminant: 9, .. })
        ));
    }

    #[test]
    fn unknown_type_is_hard_failure() {
        let reg = registry();
        let ty = TypeRef::named("Mystery");
        assert_eq!(
            reg.to_bytes(&ty, &Value::Unit).unwrap_err(),
            EncodeError::UnknownType { ty: "Mystery".into() }
        );
        let mut r = ByteReader::new(&[0]);
        assert!(matches!(
            reg.decode(&mut r, &ty, &NoEntities),
            Err(DecodeError::UnknownType { .. })
        ));
    }

    #[test]
    fn runtime_type_must_match_static_type() {
        let reg = registry();
        let err = reg
            .to_bytes(&TypeRef::named("Worker"), &Value::entity("Item", 3))
            .unwrap_err();
        assert_eq!(
            err,
            EncodeError::TypeMismatch {
                expected: "Worker".into(),
                found: "Item".into()
            }
        );
    }

    #[test]
    fn list_length_is_u16() {
        let reg = registry();
        let ty = TypeRef::list(PrimKind::U8.into());
        let long = Value::List(vec![Value::U8(0); u16::MAX as usize + 1]);
        assert!(matches!(reg.to_bytes(&ty, &long), Err(EncodeError::Wire(_))));
        let short = Value::List(vec![Value::U8(1), Value::U8(2)]);
        assert_eq!(reg.to_bytes(&ty, &short).unwrap(), vec![2, 0, 1, 2]);
    }

    #[test]
    fn nullable_encodings() {
        let reg = registry();
        let ty = TypeRef::nullable(PrimKind::I32.into());
        assert_eq!(reg.to_bytes(&ty, &Value::Null).unwrap(), vec![1]);
        assert_eq!(
            reg.to_bytes(&ty, &Value::I32(3)).unwrap(),
            vec![0, 1, 3, 0, 0, 0]
        );
        // Legacy: not null, but no value.
        let mut r = ByteReader::new(&[0, 0]);
        assert_eq!(reg.decode(&mut r, &ty, &NoEntities).unwrap(), Value::Null);
        assert!(r.is_empty());
    }

    #[test]
    fn entity_resolves_in_reader_scope() {
        let reg = registry();
        let ty = TypeRef::named("Worker");
        let v = Value::entity("Worker", 42);
        assert_eq!(round_trip(&reg, &ty, &v, &Live), v);

        let bytes = reg.to_bytes(&ty, &v).unwrap();
        let mut r = ByteReader::with_context(&bytes, WireContext::for_scope(ScopeId::Map(2)));
        assert_eq!(reg.decode(&mut r, &ty, &Live).unwrap(), Value::Null);
    }

    #[test]
    fn world_objects_resolve_globally() {
        let reg = registry();
        let ty = TypeRef::named("Colony");
        let v = Value::entity("Colony", 3);
        let bytes = reg.to_bytes(&ty, &v).unwrap();
        let mut r = ByteReader::with_context(&bytes, WireContext::for_scope(ScopeId::Map(9)));
        assert_eq!(reg.decode(&mut r, &ty, &Live).unwrap(), v);
    }

    #[test]
    fn missing_entity_is_absent_not_error() {
        let reg = registry();
        let ty = TypeRef::named("Worker");
        assert_eq!(round_trip(&reg, &ty, &Value::entity("Worker", 500), &Live), Value::Null);
    }

    #[test]
    fn multi_category_uses_container_path() {
        let reg = registry();
        let ty = TypeRef::named("Item");
        let v = Value::Entity {
            ty: TypeName::new("Item"),
            reference: EntityRef::InComponent {
                owner: EntityId(4),
                slot: 1,
                id: EntityId(9),
            },
        };
        let bytes = reg.to_bytes(&ty, &v).unwrap();
        assert_eq!(bytes[0], 2);
        assert_eq!(bytes.len(), 1 + 4 + 2 + 4);
        assert_eq!(round_trip(&reg, &ty, &v, &Live), v);
    }

    #[test]
    fn sessions_and_definitions() {
        let reg = registry();
        let trade = Value::Session {
            ty: TypeName::new("Trade"),
            id: SessionId(7),
        };
        assert_eq!(round_trip(&reg, &TypeRef::named("Trade"), &trade, &Live), trade);
        let stale = Value::Session {
            ty: TypeName::new("Trade"),
            id: SessionId(8),
        };
        assert_eq!(round_trip(&reg, &TypeRef::named("Trade"), &stale, &Live), Value::Null);

        let recipe = Value::Def {
            ty: TypeName::new("Recipe"),
            id: DefId(1234),
        };
        assert_eq!(round_trip(&reg, &TypeRef::named("Recipe"), &recipe, &NoEntities), recipe);
        assert_eq!(
            reg.to_bytes(&TypeRef::named("Recipe"), &Value::Null).unwrap(),
            vec![0xFF, 0xFF]
        );
    }

    #[test]
    fn scope_references() {
        let reg = registry();
        let ty = TypeRef::scope();
        assert_eq!(
            reg.to_bytes(&ty, &Value::Scope(ScopeId::Global)).unwrap(),
            (-1i32).to_le_bytes().to_vec()
        );
        let v = Value::Scope(ScopeId::Map(12));
        assert_eq!(round_trip(&reg, &ty, &v, &NoEntities), v);

        let bytes = (-5i32).to_le_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(
            reg.decode(&mut r, &ty, &NoEntities).unwrap_err(),
            DecodeError::BadScope { raw: -5 }
        );
    }

    #[test]
    fn interface_uses_sorted_index() {
        let reg = registry();
        let ty = TypeRef::named("Job");
        let dig = Value::Object {
            ty: TypeName::new("Dig"),
            payload: Box::new(Value::record("Dig", vec![Value::record(
                "Cell",
                vec![Value::I32(1), Value::I32(-2)],
            )])),
        };
        let bytes = reg.to_bytes(&ty, &dig).unwrap();
        // "Dig" sorts before "Haul".
        assert_eq!(&bytes[..2], &[0, 0]);
        assert_eq!(round_trip(&reg, &ty, &dig, &NoEntities), dig);
        assert_eq!(reg.to_bytes(&ty, &Value::Null).unwrap(), vec![0xFF, 0xFF]);

        let mut r = ByteReader::new(&[5, 0]);
        assert!(matches!(
            reg.decode(&mut r, &ty, &NoEntities),
            Err(DecodeError::BadImplementationIndex { index: 5, .. })
        ));
    }

    #[test]
    fn unlisted_implementation_rejected() {
        let reg = registry();
        let v = Value::Object {
            ty: TypeName::new("Cell"),
            payload: Box::new(Value::record("Cell", vec![Value::I32(0), Value::I32(0)])),
        };
        assert!(matches!(
            reg.to_bytes(&TypeRef::named("Job"), &v),
            Err(EncodeError::UnknownImplementation { .. })
        ));
    }

    #[test]
    fn record_field_count_checked() {
        let reg = registry();
        let err = reg
            .to_bytes(&TypeRef::named("Cell"), &Value::record("Cell", vec![Value::I32(0)]))
            .unwrap_err();
        assert_eq!(
            err,
            EncodeError::FieldCount {
                ty: "Cell".into(),
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let reg = registry();
        let mut ty = TypeRef::Prim(PrimKind::U8);
        for _ in 0..(MAX_DECODE_DEPTH + 2) {
            ty = TypeRef::list(ty);
        }
        let bytes = vec![1u8; 2 * (MAX_DECODE_DEPTH + 4)];
        let mut r = ByteReader::new(&bytes);
        assert!(matches!(
            reg.decode(&mut r, &ty, &NoEntities),
            Err(DecodeError::TooDeep { .. })
        ));
    }

    #[test]
    fn fingerprint_changes_with_shape() {
        let a = registry();
        let b = RegistryBuilder::new()
            .enumeration("Priority", PrimKind::U16, &[0, 1, 2, 3, 4, 5])
            .build()
            .unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), registry().fingerprint());
    }
}
