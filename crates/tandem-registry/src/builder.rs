//! Startup-time construction of the type registry.

use indexmap::IndexMap;

use crate::descriptor::TypeDescriptor;
use crate::error::RegistryError;
use crate::prim::PrimKind;
use crate::reference::RefCategory;
use crate::registry::TypeRegistry;
use crate::value::{TypeName, TypeRef};

/// Collects type declarations and validates them into a [`TypeRegistry`].
///
/// Declaration order does not matter: every shared ordering (interface
/// implementation lists, the fingerprint) is by type name. Errors are
/// collected as declarations arrive and the first one is reported by
/// [`build`](Self::build).
///
/// # Examples
///
/// ```
/// use tandem_registry::{PrimKind, RefCategory, RegistryBuilder, TypeRef};
///
/// let registry = RegistryBuilder::new()
///     .enumeration("Priority", PrimKind::U8, &[0, 1, 2, 3])
///     .reference("Worker", &[RefCategory::Spawned])
///     .record("Cell", &[("x", PrimKind::I32.into()), ("z", PrimKind::I32.into())])
///     .build()
///     .unwrap();
///
/// assert!(registry.check(&TypeRef::list(TypeRef::named("Cell"))).is_ok());
/// ```
#[derive(Debug)]
pub struct RegistryBuilder {
    types: IndexMap<TypeName, TypeDescriptor>,
    pending_impls: Vec<(TypeName, TypeName)>,
    errors: Vec<RegistryError>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// Start a builder with the scope reference type pre-registered.
    pub fn new() -> Self {
        let mut b = Self {
            types: IndexMap::new(),
            pending_impls: Vec::new(),
            errors: Vec::new(),
        };
        b.insert(TypeName::new(crate::SCOPE_TYPE), TypeDescriptor::Scope);
        b
    }

    fn insert(&mut self, name: TypeName, descriptor: TypeDescriptor) {
        if self.types.contains_key(&name) {
            self.errors.push(RegistryError::DuplicateType {
                name: name.to_string(),
            });
            return;
        }
        self.types.insert(name, descriptor);
    }

    /// Declare an enum over an integer representation.
    pub fn enumeration(mut self, name: &str, repr: PrimKind, discriminants: &[i64]) -> Self {
        if !repr.is_integer() {
            self.errors.push(RegistryError::NonIntegerEnum { name: name.into() });
            return self;
        }
        let (lo, hi) = repr_bounds(repr);
        if let Some(&d) = discriminants.iter().find(|d| !(lo..=hi).contains(&(**d as i128))) {
            self.errors.push(RegistryError::DiscriminantOutOfRange {
                name: name.into(),
                discriminant: d,
            });
            return self;
        }
        self.insert(
            TypeName::new(name),
            TypeDescriptor::Enum {
                repr,
                discriminants: discriminants.to_vec(),
            },
        );
        self
    }

    /// Declare a fixed-shape value record.
    pub fn record(mut self, name: &str, fields: &[(&str, TypeRef)]) -> Self {
        let fields = fields
            .iter()
            .map(|(n, t)| ((*n).to_string(), t.clone()))
            .collect();
        self.insert(TypeName::new(name), TypeDescriptor::Record { fields });
        self
    }

    /// Declare an entity-like type under one or more reference categories.
    ///
    /// The highest-priority category wins (see [`RefCategory`]).
    pub fn reference(mut self, name: &str, categories: &[RefCategory]) -> Self {
        match RefCategory::select(categories) {
            Some(category) => self.insert(TypeName::new(name), TypeDescriptor::Reference { category }),
            None => self.errors.push(RegistryError::NoCategory { name: name.into() }),
        }
        self
    }

    /// Declare a polymorphic interface.
    pub fn interface(mut self, name: &str) -> Self {
        self.insert(
            TypeName::new(name),
            TypeDescriptor::Interface {
                implementations: Vec::new(),
            },
        );
        self
    }

    /// Declare `concrete` as an implementation of `interface`.
    ///
    /// Either may be declared before or after this call.
    pub fn implementation(mut self, interface: &str, concrete: &str) -> Self {
        self.pending_impls
            .push((TypeName::new(interface), TypeName::new(concrete)));
        self
    }

    /// Validate every declaration and freeze the registry.
    pub fn build(mut self) -> Result<TypeRegistry, RegistryError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        for (interface, concrete) in std::mem::take(&mut self.pending_impls) {
            match self.types.get(&concrete) {
                None => {
                    return Err(RegistryError::UnresolvedType {
                        owner: interface.to_string(),
                        missing: concrete.to_string(),
                    })
                }
                Some(TypeDescriptor::Interface { .. }) => {
                    return Err(RegistryError::AbstractImplementation {
                        name: concrete.to_string(),
                    })
                }
                Some(_) => {}
            }
            match self.types.get_mut(&interface) {
                Some(TypeDescriptor::Interface { implementations }) => {
                    if !implementations.contains(&concrete) {
                        implementations.push(concrete);
                    }
                }
                _ => {
                    return Err(RegistryError::NotAnInterface {
                        name: interface.to_string(),
                    })
                }
            }
        }

        for (name, descriptor) in self.types.iter_mut() {
            if let TypeDescriptor::Interface { implementations } = descriptor {
                implementations.sort();
                // u16::MAX is the null marker.
                if implementations.len() >= u16::MAX as usize {
                    return Err(RegistryError::TooManyImplementations {
                        name: name.to_string(),
                        count: implementations.len(),
                    });
                }
            }
        }

        for (name, descriptor) in &self.types {
            for dep in descriptor.dependencies() {
                if !self.types.contains_key(dep) {
                    return Err(RegistryError::UnresolvedType {
                        owner: name.to_string(),
                        missing: dep.to_string(),
                    });
                }
            }
        }

        self.types.sort_keys();
        log::debug!("type registry built with {} named types", self.types.len());
        Ok(TypeRegistry::from_types(self.types))
    }
}

fn repr_bounds(repr: PrimKind) -> (i128, i128) {
    match repr {
        PrimKind::U8 => (0, u8::MAX as i128),
        PrimKind::I8 => (i8::MIN as i128, i8::MAX as i128),
        PrimKind::U16 => (0, u16::MAX as i128),
        PrimKind::I16 => (i16::MIN as i128, i16::MAX as i128),
        PrimKind::U32 => (0, u32::MAX as i128),
        PrimKind::I32 => (i32::MIN as i128, i32::MAX as i128),
        PrimKind::U64 => (0, u64::MAX as i128),
        _ => (i64::MIN as i128, i64::MAX as i128),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_are_rejected() {
        let err = RegistryBuilder::new()
            .record("Cell", &[])
            .reference("Cell", &[RefCategory::Spawned])
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateType { name: "Cell".into() });
    }

    #[test]
    fn scope_name_is_reserved() {
        let err = RegistryBuilder::new().record("Scope", &[]).build().unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateType { .. }));
    }

    #[test]
    fn missing_field_type_is_reported() {
        let err = RegistryBuilder::new()
            .record("Order", &[("who", TypeRef::named("Worker"))])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnresolvedType {
                owner: "Order".into(),
                missing: "Worker".into()
            }
        );
    }

    #[test]
    fn enum_bounds_are_checked() {
        let err = RegistryBuilder::new()
            .enumeration("Mode", PrimKind::U8, &[0, 256])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::DiscriminantOutOfRange { discriminant: 256, .. }
        ));
        let err = RegistryBuilder::new()
            .enumeration("Mode", PrimKind::F32, &[0])
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::NonIntegerEnum { .. }));
    }

    #[test]
    fn implementations_sorted_regardless_of_declaration_order() {
        let a = RegistryBuilder::new()
            .interface("Job")
            .record("Mine", &[])
            .record("Haul", &[])
            .implementation("Job", "Mine")
            .implementation("Job", "Haul")
            .build()
            .unwrap();
        let b = RegistryBuilder::new()
            .implementation("Job", "Haul")
            .record("Haul", &[])
            .implementation("Job", "Mine")
            .record("Mine", &[])
            .interface("Job")
            .build()
            .unwrap();
        let names: Vec<&str> = a
            .implementations(&TypeName::new("Job"))
            .unwrap()
            .iter()
            .map(TypeName::as_str)
            .collect();
        assert_eq!(names, vec!["Haul", "Mine"]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn interface_cannot_implement_interface() {
        let err = RegistryBuilder::new()
            .interface("Job")
            .interface("Task")
            .implementation("Job", "Task")
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::AbstractImplementation { name: "Task".into() });
    }

    #[test]
    fn implementation_of_non_interface_is_rejected() {
        let err = RegistryBuilder::new()
            .record("Haul", &[])
            .record("Job", &[])
            .implementation("Job", "Haul")
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::NotAnInterface { name: "Job".into() });
    }

    #[test]
    fn reference_without_category_is_rejected() {
        let err = RegistryBuilder::new().reference("Ghost", &[]).build().unwrap_err();
        assert_eq!(err, RegistryError::NoCategory { name: "Ghost".into() });
    }
}
