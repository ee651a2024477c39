//! Action shapes for closure handlers.
//!
//! A closure handler stands in for a call site that only holds a unit of
//! work, not a named operation. Each distinct shape is declared once at
//! startup as an ordered list of named captured fields; nested shapes are
//! flattened into that list at declaration time, so the wire layout is
//! fixed before the first capture.

use indexmap::IndexMap;
use tandem_registry::{TypeRef, Value};

/// The fixed, flattened field list of one action shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClosureShape {
    name: String,
    fields: Vec<(String, TypeRef)>,
}

impl ClosureShape {
    /// Start an empty shape.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    /// Append a captured field.
    pub fn field(mut self, path: &str, ty: TypeRef) -> Self {
        self.fields.push((path.to_string(), ty));
        self
    }

    /// Append every field of `inner`, each path prefixed with `prefix.`.
    pub fn nested(mut self, prefix: &str, inner: &ClosureShape) -> Self {
        self.fields.extend(
            inner
                .fields
                .iter()
                .map(|(path, ty)| (format!("{prefix}.{path}"), ty.clone())),
        );
        self
    }

    /// Shape name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flattened fields in wire order.
    pub fn fields(&self) -> &[(String, TypeRef)] {
        &self.fields
    }
}

/// Captured values of one action instance, by flattened path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClosureEnv {
    values: IndexMap<String, Value>,
}

impl ClosureEnv {
    /// An empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `path` and return the environment.
    pub fn with(mut self, path: &str, value: Value) -> Self {
        self.set(path, value);
        self
    }

    /// Set `path`.
    pub fn set(&mut self, path: &str, value: Value) {
        self.values.insert(path.to_string(), value);
    }

    /// Value at `path`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.values.get(path)
    }

    /// Number of captured values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is captured.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
