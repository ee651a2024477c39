//! Entity reference categories and resolution.
//!
//! A reference never carries entity state, only enough to find the same
//! logical entity on the receiving peer: a numeric id, plus a container
//! discriminator for entities that can live in more than one kind of
//! container. Resolution must yield the same entity on every peer, or
//! deterministically yield "absent" ([`Value::Null`](crate::Value::Null)).

use tandem_core::{DefId, EntityId, ScopeId, SessionId};
use tandem_wire::{ByteReader, ByteWriter};

use crate::error::{DecodeError, EncodeError};
use crate::value::{TypeName, Value};

/// Reference category of a named type.
///
/// A type may be declared under several categories; the registry always
/// picks the first in this declaration order, so every peer encodes the
/// same type the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefCategory {
    /// Interactive session, by [`SessionId`]. Encoded as `i32`, `-1` = null.
    Session,
    /// Entity that may live directly in a scope, inside another entity, or
    /// inside a component of another entity. Encoded as a `u8` container
    /// discriminator followed by the path ids; `0xFF` = null.
    Thing,
    /// Entity that only ever lives directly in its scope. Encoded as `i32`
    /// id, `-1` = null.
    Spawned,
    /// Entity that lives in the global scope regardless of the payload's
    /// scope. Encoded as `i32` id, `-1` = null.
    WorldObject,
    /// Static definition data, by [`DefId`]. Encoded as `u16`, `u16::MAX` = null.
    Definition,
}

impl RefCategory {
    /// Pick the category a multi-category type resolves to.
    pub fn select(categories: &[RefCategory]) -> Option<RefCategory> {
        categories.iter().copied().min()
    }

    /// Name used in fingerprints.
    pub fn name(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Thing => "thing",
            Self::Spawned => "spawned",
            Self::WorldObject => "world_object",
            Self::Definition => "definition",
        }
    }
}

/// Where an entity lives, as seen from its scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityRef {
    /// Spawned directly in the scope.
    Spawned(EntityId),
    /// Held inside another entity.
    Nested {
        /// The holding entity.
        parent: EntityId,
        /// The held entity.
        id: EntityId,
    },
    /// Held inside a component slot of another entity.
    InComponent {
        /// The entity owning the component.
        owner: EntityId,
        /// Component slot index on the owner.
        slot: u16,
        /// The held entity.
        id: EntityId,
    },
}

impl EntityRef {
    const TAG_SPAWNED: u8 = 0;
    const TAG_NESTED: u8 = 1;
    const TAG_IN_COMPONENT: u8 = 2;
    const TAG_NULL: u8 = 0xFF;

    /// The referenced entity's own id.
    pub fn id(&self) -> EntityId {
        match *self {
            Self::Spawned(id) | Self::Nested { id, .. } | Self::InComponent { id, .. } => id,
        }
    }
}

/// Looks up references against the receiving peer's simulation state.
///
/// Implemented by the host world. Every method must be deterministic:
/// identical state on two peers gives identical answers.
pub trait EntityResolver {
    /// Resolve an entity of type `ty` in `scope`.
    ///
    /// Returns the canonical reference if an entity of that type exists at
    /// that path, or `None`. Never returns a different entity.
    fn resolve_entity(&self, scope: ScopeId, ty: &TypeName, reference: &EntityRef)
        -> Option<EntityRef>;

    /// Whether a session of type `ty` with `id` is live.
    fn resolve_session(&self, ty: &TypeName, id: SessionId) -> bool {
        let _ = (ty, id);
        false
    }

    /// Whether a definition of type `ty` with `id` exists.
    fn resolve_def(&self, ty: &TypeName, id: DefId) -> bool {
        let _ = (ty, id);
        true
    }

    /// Whether `scope` exists.
    fn resolve_scope(&self, scope: ScopeId) -> bool {
        let _ = scope;
        true
    }
}

/// Resolver for payloads that contain no references.
///
/// Every entity and session lookup yields "absent".
#[derive(Clone, Copy, Debug, Default)]
pub struct NoEntities;

impl EntityResolver for NoEntities {
    fn resolve_entity(&self, _: ScopeId, _: &TypeName, _: &EntityRef) -> Option<EntityRef> {
        None
    }
}

/// Negative values mark null, so ids above `i32::MAX` do not encode.
fn write_entity_id(w: &mut ByteWriter, ty: &TypeName, id: EntityId) -> Result<(), EncodeError> {
    w.write_i32(signed_id(ty, id.0)?);
    Ok(())
}

fn signed_id(ty: &TypeName, id: u32) -> Result<i32, EncodeError> {
    i32::try_from(id).map_err(|_| EncodeError::IdOutOfRange {
        ty: ty.to_string(),
        id: u64::from(id),
    })
}

fn read_entity_id(r: &mut ByteReader<'_>) -> Result<Option<EntityId>, DecodeError> {
    let raw = r.read_i32()?;
    Ok((raw >= 0).then_some(EntityId(raw as u32)))
}

/// Encode a reference-category value.
pub(crate) fn write_reference(
    w: &mut ByteWriter,
    ty: &TypeName,
    category: RefCategory,
    value: &Value,
) -> Result<(), EncodeError> {
    let mismatch = || EncodeError::TypeMismatch {
        expected: ty.to_string(),
        found: value.describe(),
    };
    match (category, value) {
        (RefCategory::Session, Value::Null) => w.write_i32(-1),
        (RefCategory::Session, Value::Session { ty: vt, id }) if vt == ty => {
            w.write_i32(signed_id(ty, id.0)?)
        }
        (RefCategory::Definition, Value::Null) => w.write_u16(u16::MAX),
        (RefCategory::Definition, Value::Def { ty: vt, id }) if vt == ty => {
            if id.0 == u16::MAX {
                return Err(EncodeError::IdOutOfRange {
                    ty: ty.to_string(),
                    id: u64::from(id.0),
                });
            }
            w.write_u16(id.0)
        }
        (RefCategory::Spawned | RefCategory::WorldObject, Value::Null) => w.write_i32(-1),
        (
            RefCategory::Spawned | RefCategory::WorldObject,
            Value::Entity {
                ty: vt,
                reference: EntityRef::Spawned(id),
            },
        ) if vt == ty => write_entity_id(w, ty, *id)?,
        (RefCategory::Thing, Value::Null) => w.write_u8(EntityRef::TAG_NULL),
        (RefCategory::Thing, Value::Entity { ty: vt, reference }) if vt == ty => match *reference {
            EntityRef::Spawned(id) => {
                w.write_u8(EntityRef::TAG_SPAWNED);
                write_entity_id(w, ty, id)?;
            }
            EntityRef::Nested { parent, id } => {
                w.write_u8(EntityRef::TAG_NESTED);
                write_entity_id(w, ty, parent)?;
                write_entity_id(w, ty, id)?;
            }
            EntityRef::InComponent { owner, slot, id } => {
                w.write_u8(EntityRef::TAG_IN_COMPONENT);
                write_entity_id(w, ty, owner)?;
                w.write_u16(slot);
                write_entity_id(w, ty, id)?;
            }
        },
        _ => return Err(mismatch()),
    }
    Ok(())
}

/// Decode a reference-category value and resolve it.
///
/// Unresolvable references decode to [`Value::Null`]; that is not an
/// error. Only malformed bytes are.
pub(crate) fn read_reference(
    r: &mut ByteReader<'_>,
    ty: &TypeName,
    category: RefCategory,
    resolver: &dyn EntityResolver,
) -> Result<Value, DecodeError> {
    let scope = r.context().scope_or_global();
    let resolved = match category {
        RefCategory::Session => {
            let raw = r.read_i32()?;
            if raw < 0 {
                return Ok(Value::Null);
            }
            let id = SessionId(raw as u32);
            resolver.resolve_session(ty, id).then(|| Value::Session {
                ty: ty.clone(),
                id,
            })
        }
        RefCategory::Definition => {
            let raw = r.read_u16()?;
            if raw == u16::MAX {
                return Ok(Value::Null);
            }
            let id = DefId(raw);
            resolver.resolve_def(ty, id).then(|| Value::Def {
                ty: ty.clone(),
                id,
            })
        }
        RefCategory::Spawned | RefCategory::WorldObject => {
            let Some(id) = read_entity_id(r)? else {
                return Ok(Value::Null);
            };
            let lookup_scope = if category == RefCategory::WorldObject {
                ScopeId::Global
            } else {
                scope
            };
            resolve(resolver, lookup_scope, ty, EntityRef::Spawned(id))
        }
        RefCategory::Thing => {
            let tag = r.read_u8()?;
            let reference = match tag {
                EntityRef::TAG_NULL => return Ok(Value::Null),
                EntityRef::TAG_SPAWNED => read_entity_id(r)?.map(EntityRef::Spawned),
                EntityRef::TAG_NESTED => {
                    let parent = read_entity_id(r)?;
                    let id = read_entity_id(r)?;
                    parent.zip(id).map(|(parent, id)| EntityRef::Nested { parent, id })
                }
                EntityRef::TAG_IN_COMPONENT => {
                    let owner = read_entity_id(r)?;
                    let slot = r.read_u16()?;
                    let id = read_entity_id(r)?;
                    owner
                        .zip(id)
                        .map(|(owner, id)| EntityRef::InComponent { owner, slot, id })
                }
                tag => return Err(DecodeError::BadReferenceDiscriminant { tag }),
            };
            match reference {
                Some(reference) => resolve(resolver, scope, ty, reference),
                None => None,
            }
        }
    };
    if resolved.is_none() {
        log::debug!("{ty} reference did not resolve in {scope}; treating as absent");
    }
    Ok(resolved.unwrap_or(Value::Null))
}

fn resolve(
    resolver: &dyn EntityResolver,
    scope: ScopeId,
    ty: &TypeName,
    reference: EntityRef,
) -> Option<Value> {
    resolver
        .resolve_entity(scope, ty, &reference)
        .map(|reference| Value::Entity {
            ty: ty.clone(),
            reference,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_priority_is_fixed() {
        assert_eq!(
            RefCategory::select(&[RefCategory::Spawned, RefCategory::Thing]),
            Some(RefCategory::Thing)
        );
        assert_eq!(
            RefCategory::select(&[RefCategory::Definition, RefCategory::Session]),
            Some(RefCategory::Session)
        );
        assert_eq!(RefCategory::select(&[]), None);
    }

    #[test]
    fn entity_ref_id_is_the_leaf() {
        let r = EntityRef::InComponent {
            owner: EntityId(1),
            slot: 2,
            id: EntityId(3),
        };
        assert_eq!(r.id(), EntityId(3));
    }

    #[test]
    fn spawned_category_rejects_nested_paths() {
        let mut w = ByteWriter::new();
        let ty = TypeName::new("Worker");
        let value = Value::Entity {
            ty: ty.clone(),
            reference: EntityRef::Nested {
                parent: EntityId(1),
                id: EntityId(2),
            },
        };
        assert!(matches!(
            write_reference(&mut w, &ty, RefCategory::Spawned, &value),
            Err(EncodeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn no_entities_resolves_to_null() {
        let mut w = ByteWriter::new();
        let ty = TypeName::new("Worker");
        write_reference(&mut w, &ty, RefCategory::Spawned, &Value::entity("Worker", 4)).unwrap();
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        let v = read_reference(&mut r, &ty, RefCategory::Spawned, &NoEntities).unwrap();
        assert_eq!(v, Value::Null);
        assert!(r.is_empty());
    }

    #[test]
    fn unknown_container_tag_is_malformed() {
        let ty = TypeName::new("Item");
        let mut r = ByteReader::new(&[7]);
        assert_eq!(
            read_reference(&mut r, &ty, RefCategory::Thing, &NoEntities).unwrap_err(),
            DecodeError::BadReferenceDiscriminant { tag: 7 }
        );
    }
}
