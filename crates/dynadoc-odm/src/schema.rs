//! Field schemas
//!
//! An ordered mapping from field name to [`FieldDescriptor`]. Equality ignores
//! insertion order, so two schemas built from the same fields in a different
//! order compare equal.

use std::ops::Index;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::descriptor::FieldDescriptor;
use crate::error::OdmError;
use crate::Result;

/// Join a field name onto a dotted path prefix.
pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Ordered `name -> descriptor` mapping owned by one declared type or scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSchema {
    fields: IndexMap<String, FieldDescriptor>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`declare`](Self::declare) for static declarations.
    pub fn with_field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.insert(name.into(), descriptor);
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn lookup(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Declare a field. Re-declaring with an identical descriptor is a no-op;
    /// a different descriptor is a [`OdmError::SchemaConflict`].
    pub fn declare(&mut self, name: &str, descriptor: FieldDescriptor) -> Result<()> {
        match self.fields.get(name) {
            Some(existing) if *existing == descriptor => Ok(()),
            Some(existing) => Err(OdmError::SchemaConflict {
                path: name.to_string(),
                existing: existing.to_string(),
                incoming: descriptor.to_string(),
            }),
            None => {
                self.fields.insert(name.to_string(), descriptor);
                Ok(())
            }
        }
    }

    /// Schema of the embedded type reached through field `name`.
    pub fn nested_schema(&self, name: &str) -> Option<&FieldSchema> {
        self.lookup(name).and_then(FieldDescriptor::nested_schema)
    }

    /// Resolve a dotted path such as `"label.confidence"`, looking through
    /// list and dict wrappers at every embedded boundary.
    pub fn get_path(&self, path: &str) -> Option<&FieldDescriptor> {
        let (parent, leaf) = split_path(path);
        let schema = match parent {
            Some(parent) => self.nested_at(parent).ok()?,
            None => self,
        };
        schema.lookup(leaf)
    }

    /// Schema of the embedded document living at `path` (`""` is this schema).
    pub fn nested_at(&self, path: &str) -> Result<&FieldSchema> {
        let mut schema = self;
        let mut walked = String::new();
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            walked = join_path(&walked, segment);
            let descriptor = schema
                .fields
                .get(segment)
                .ok_or_else(|| OdmError::FieldNotFound {
                    path: walked.clone(),
                })?;
            schema = descriptor
                .nested_schema()
                .ok_or_else(|| not_embedded(&walked, descriptor))?;
        }
        Ok(schema)
    }

    pub fn nested_at_mut(&mut self, path: &str) -> Result<&mut FieldSchema> {
        let mut schema = self;
        let mut walked = String::new();
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            walked = join_path(&walked, segment);
            let descriptor =
                schema
                    .fields
                    .get_mut(segment)
                    .ok_or_else(|| OdmError::FieldNotFound {
                        path: walked.clone(),
                    })?;
            let existing = descriptor.to_string();
            schema = descriptor
                .nested_schema_mut()
                .ok_or_else(|| OdmError::SchemaConflict {
                    path: walked.clone(),
                    existing,
                    incoming: "embedded document".to_string(),
                })?;
        }
        Ok(schema)
    }

    /// Merge `descriptor` at dotted `path`.
    ///
    /// Idempotent for equivalent descriptors, a [`OdmError::SchemaConflict`]
    /// for incompatible ones. Returns whether the schema changed. On error the
    /// schema is untouched.
    pub fn merge_field(&mut self, path: &str, descriptor: &FieldDescriptor) -> Result<bool> {
        let (parent, leaf) = split_path(path);
        let target = self.nested_at_mut(parent.unwrap_or(""))?;
        let merged = match target.lookup(leaf) {
            Some(existing) => existing.merge(descriptor, path)?,
            None => descriptor.clone(),
        };
        let changed = target.lookup(leaf) != Some(&merged);
        if changed {
            target.upsert(leaf, merged);
        }
        Ok(changed)
    }

    /// Union of two schemas; conflicting fields fail the whole merge.
    pub fn merged(&self, other: &FieldSchema, prefix: &str) -> Result<FieldSchema> {
        let mut out = self.clone();
        for (name, incoming) in other.iter() {
            let merged = match out.lookup(name) {
                Some(existing) => existing.merge(incoming, &join_path(prefix, name))?,
                None => incoming.clone(),
            };
            out.upsert(name, merged);
        }
        Ok(out)
    }

    pub(crate) fn upsert(&mut self, name: impl Into<String>, descriptor: FieldDescriptor) {
        self.fields.insert(name.into(), descriptor);
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<FieldDescriptor> {
        self.fields.shift_remove(name)
    }
}

impl Index<&str> for FieldSchema {
    type Output = FieldDescriptor;

    /// Panics when nothing is declared at `path`; use
    /// [`get_path`](FieldSchema::get_path) for a fallible lookup.
    fn index(&self, path: &str) -> &FieldDescriptor {
        match self.get_path(path) {
            Some(descriptor) => descriptor,
            None => panic!("no field declared at {path}"),
        }
    }
}

fn split_path(path: &str) -> (Option<&str>, &str) {
    match path.rsplit_once('.') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, path),
    }
}

fn not_embedded(path: &str, descriptor: &FieldDescriptor) -> OdmError {
    OdmError::SchemaConflict {
        path: path.to_string(),
        existing: descriptor.to_string(),
        incoming: "embedded document".to_string(),
    }
}
