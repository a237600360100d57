//! Dynamic field access
//!
//! [`FieldAccess`] is the get/set/has/delete contract shared by
//! [`Document`](crate::Document) and [`EmbeddedDocument`](crate::EmbeddedDocument).
//! Both delegate to a [`FieldStore`], which holds the instance values, the
//! descriptors of fields added on this instance, and, once the owning document
//! is attached to a collection, a link to the collection's shared schema at the
//! instance's path.
//!
//! Three read surfaces are equivalent for every field that exists:
//! `get_field(name)`, `get(name)` and indexing with `doc[name]`. Writes go
//! through `set_field(name, value, create)`; `set(name, value)` is the
//! creating form.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::{infer_descriptor, FieldDescriptor};
use crate::embedded::EmbeddedDocument;
use crate::error::OdmError;
use crate::registry::{DocumentType, SchemaHandle};
use crate::schema::{join_path, FieldSchema};
use crate::value::{Value, NULL};
use crate::Result;

/// Capability interface over a document's dynamic fields.
pub trait FieldAccess {
    fn document_type(&self) -> &DocumentType;

    /// Value of `name`. Declared fields without a value read as `Null`.
    fn get_field(&self, name: &str) -> Result<&Value>;

    /// Write `name`.
    ///
    /// Existing fields (set on the instance or declared in its schema) accept
    /// only values compatible with their descriptor. Unknown fields are created
    /// with an inferred descriptor when `create` is true and rejected with
    /// [`OdmError::FieldCreationDisabled`] otherwise. A failed call leaves the
    /// instance and every schema untouched.
    fn set_field(&mut self, name: &str, value: Value, create: bool) -> Result<()>;

    fn has_field(&self, name: &str) -> bool;

    /// Clear the instance value of `name`. Schema declarations are kept.
    fn delete_field(&mut self, name: &str) -> Result<()>;

    /// Every field name visible on this instance, declared ones first.
    fn field_names(&self) -> Vec<String>;

    /// Schema in effect for this instance: the collection's schema at the
    /// instance's path when attached, otherwise the type defaults plus the
    /// fields added on the instance.
    fn field_schema(&self) -> FieldSchema;

    fn get(&self, name: &str) -> Option<&Value> {
        self.get_field(name).ok()
    }

    fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()>
    where
        Self: Sized,
    {
        self.set_field(name, value.into(), true)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SchemaLink {
    handle: SchemaHandle,
    path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FieldStore {
    document_type: DocumentType,
    values: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "FieldSchema::is_empty")]
    dynamic: FieldSchema,
    #[serde(skip)]
    link: Option<SchemaLink>,
    /// Schema captured when a snapshot was taken; read-only views resolve
    /// declared fields against it instead of the live collection schema.
    #[serde(skip)]
    frozen: Option<FieldSchema>,
}

/// Clones are detached. Only the instance a collection holds writes through
/// to the collection schema.
impl Clone for FieldStore {
    fn clone(&self) -> Self {
        Self {
            document_type: self.document_type.clone(),
            values: self.values.clone(),
            dynamic: self.dynamic.clone(),
            link: None,
            frozen: None,
        }
    }
}

impl FieldStore {
    pub(crate) fn new(document_type: DocumentType) -> Self {
        Self {
            document_type,
            values: IndexMap::new(),
            dynamic: FieldSchema::new(),
            link: None,
            frozen: None,
        }
    }

    pub(crate) fn document_type(&self) -> &DocumentType {
        &self.document_type
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.link.is_some()
    }

    /// Stored value of `name`, without consulting any schema.
    pub(crate) fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Type defaults overlaid with the descriptors recorded on this instance.
    pub(crate) fn local_schema(&self) -> FieldSchema {
        let mut schema = self.document_type.default_fields().clone();
        for (name, descriptor) in self.dynamic.iter() {
            schema.upsert(name, descriptor.clone());
        }
        schema
    }

    fn local_descriptor(&self, name: &str) -> Option<FieldDescriptor> {
        self.dynamic
            .lookup(name)
            .or_else(|| self.document_type.default_fields().lookup(name))
            .cloned()
    }

    pub(crate) fn path_of(&self, name: &str) -> String {
        match &self.link {
            Some(link) => join_path(&link.path, name),
            None => name.to_string(),
        }
    }

    fn is_declared(&self, name: &str) -> bool {
        match (&self.link, &self.frozen) {
            (Some(link), _) => link
                .handle
                .read(|schema| schema.nested_at(&link.path).map(|s| s.contains(name)))
                .unwrap_or(false),
            (None, Some(frozen)) => frozen.contains(name),
            (None, None) => self.local_descriptor(name).is_some(),
        }
    }

    pub(crate) fn get(&self, name: &str) -> Result<&Value> {
        if let Some(value) = self.values.get(name) {
            return Ok(value);
        }
        if self.is_declared(name) {
            return Ok(&NULL);
        }
        Err(OdmError::FieldNotFound {
            path: self.path_of(name),
        })
    }

    pub(crate) fn has(&self, name: &str) -> bool {
        self.values.contains_key(name) || self.is_declared(name)
    }

    pub(crate) fn set(&mut self, name: &str, value: Value, create: bool) -> Result<()> {
        let path = self.path_of(name);
        let descriptor = match &self.link {
            Some(link) => link.handle.transact(|schema| {
                let scope = schema.nested_at_mut(&link.path)?;
                let descriptor = resolve(scope.lookup(name), &value, create, &path)?;
                scope.upsert(name, descriptor.clone());
                Ok(descriptor)
            })?,
            None => resolve(self.local_descriptor(name).as_ref(), &value, create, &path)?,
        };

        if !self.values.contains_key(name) && !value.is_null() {
            debug!(path = %path, descriptor = %descriptor, attached = self.link.is_some(), "field set");
        }

        let mut value = descriptor.conform(value);
        if let Some(link) = &self.link {
            link_value(&mut value, &link.handle, &path);
        }
        self.record_descriptor(name, descriptor);
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    fn record_descriptor(&mut self, name: &str, descriptor: FieldDescriptor) {
        if self.document_type.default_fields().lookup(name) == Some(&descriptor) {
            self.dynamic.remove(name);
        } else {
            self.dynamic.upsert(name, descriptor);
        }
    }

    pub(crate) fn delete(&mut self, name: &str) -> Result<()> {
        let had_value = self.values.shift_remove(name).is_some();
        if had_value || self.has(name) {
            self.dynamic.remove(name);
            return Ok(());
        }
        Err(OdmError::FieldNotFound {
            path: self.path_of(name),
        })
    }

    /// Drop the value and any instance-level descriptor of `name`, whether or
    /// not it exists. Used when a field is removed from a whole collection.
    pub(crate) fn purge(&mut self, name: &str) {
        self.values.shift_remove(name);
        self.dynamic.remove(name);
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.effective_schema().names().map(String::from).collect();
        for name in self.values.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    pub(crate) fn effective_schema(&self) -> FieldSchema {
        match (&self.link, &self.frozen) {
            (Some(link), _) => link
                .handle
                .read(|schema| schema.nested_at(&link.path).cloned())
                .unwrap_or_else(|_| self.local_schema()),
            (None, Some(frozen)) => frozen.clone(),
            (None, None) => self.local_schema(),
        }
    }

    /// Detached copy that keeps resolving declared fields against the schema
    /// in effect right now, for itself and every embedded document below it.
    pub(crate) fn frozen_copy(&self) -> FieldStore {
        let mut copy = self.clone();
        copy.freeze(self.effective_schema());
        copy
    }

    fn freeze(&mut self, schema: FieldSchema) {
        for (name, value) in self.values.iter_mut() {
            if let Some(nested) = schema.nested_schema(name) {
                value.for_each_embedded_mut(&mut |doc: &mut EmbeddedDocument| {
                    doc.store_mut().freeze(nested.clone())
                });
            }
        }
        self.frozen = Some(schema);
    }

    /// Merge every field on this instance into `schema`.
    ///
    /// Values are checked against descriptors the schema already holds with
    /// the same rules as [`FieldStore::set`], so an integer joins an existing
    /// float field here as it would on a direct write. Value mismatches are
    /// reported as schema conflicts at the offending path.
    pub(crate) fn merge_into(&self, schema: &mut FieldSchema) -> Result<usize> {
        let local = self.local_schema();
        let mut changed = 0;
        for (name, declared) in local.iter() {
            let value = self.values.get(name).filter(|v| !v.is_null());
            let descriptor = match (schema.lookup(name), value) {
                (Some(existing), Some(value)) => existing.reconcile(value, name),
                (None, Some(value)) => declared.reconcile(value, name),
                (_, None) => Ok(declared.clone()),
            }
            .map_err(as_conflict)?;
            if schema.merge_field(name, &descriptor)? {
                changed += 1;
            }
        }
        for (name, value) in &self.values {
            if local.contains(name) || value.is_null() {
                continue;
            }
            let descriptor = infer_descriptor(value, name)?;
            if schema.merge_field(name, &descriptor)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Descriptors for every field on this instance, reconciled against the
    /// values so that new fields on nested embedded documents are included.
    pub(crate) fn discovered_fields(&self) -> Result<FieldSchema> {
        let mut fields = self.local_schema();
        for (name, value) in &self.values {
            let descriptor = match fields.lookup(name) {
                Some(existing) => existing.reconcile(value, name)?,
                None if value.is_null() => continue,
                None => infer_descriptor(value, name)?,
            };
            fields.upsert(name.as_str(), descriptor);
        }
        Ok(fields)
    }

    pub(crate) fn embedded_mut(&mut self, name: &str) -> Result<&mut EmbeddedDocument> {
        let path = self.path_of(name);
        match self.values.get_mut(name) {
            Some(Value::Embedded(doc)) => Ok(doc),
            Some(other) => Err(OdmError::FieldTypeMismatch {
                path,
                expected: "embedded".to_string(),
                actual: other.kind_name(),
            }),
            None => Err(OdmError::FieldNotFound { path }),
        }
    }

    pub(crate) fn list_element_mut(
        &mut self,
        name: &str,
        index: usize,
    ) -> Result<&mut EmbeddedDocument> {
        let path = self.path_of(name);
        let items = match self.values.get_mut(name) {
            Some(Value::List(items)) => items,
            Some(other) => {
                return Err(OdmError::FieldTypeMismatch {
                    path,
                    expected: "list".to_string(),
                    actual: other.kind_name(),
                })
            }
            None => return Err(OdmError::FieldNotFound { path }),
        };
        match items.get_mut(index) {
            Some(Value::Embedded(doc)) => Ok(doc),
            Some(other) => Err(OdmError::FieldTypeMismatch {
                path,
                expected: "embedded".to_string(),
                actual: other.kind_name(),
            }),
            None => Err(OdmError::FieldNotFound {
                path: format!("{path}[{index}]"),
            }),
        }
    }

    pub(crate) fn dict_value_mut(&mut self, name: &str, key: &str) -> Result<&mut EmbeddedDocument> {
        let path = self.path_of(name);
        let map = match self.values.get_mut(name) {
            Some(Value::Dict(map)) => map,
            Some(other) => {
                return Err(OdmError::FieldTypeMismatch {
                    path,
                    expected: "dict".to_string(),
                    actual: other.kind_name(),
                })
            }
            None => return Err(OdmError::FieldNotFound { path }),
        };
        match map.get_mut(key) {
            Some(Value::Embedded(doc)) => Ok(doc),
            Some(other) => Err(OdmError::FieldTypeMismatch {
                path,
                expected: "embedded".to_string(),
                actual: other.kind_name(),
            }),
            None => Err(OdmError::FieldNotFound {
                path: format!("{path}[{key}]"),
            }),
        }
    }

    /// Point this instance, and every embedded document below it, at the
    /// shared schema rooted at `path`.
    pub(crate) fn link(&mut self, handle: &SchemaHandle, path: &str) {
        for (name, value) in self.values.iter_mut() {
            link_value(value, handle, &join_path(path, name));
        }
        self.link = Some(SchemaLink {
            handle: handle.clone(),
            path: path.to_string(),
        });
    }

    pub(crate) fn unlink(&mut self) {
        for value in self.values.values_mut() {
            value.for_each_embedded_mut(&mut |doc: &mut EmbeddedDocument| doc.store_mut().unlink());
        }
        self.link = None;
    }

    pub(crate) fn conform_to(&mut self, schema: &FieldSchema) {
        for (name, value) in self.values.iter_mut() {
            if let Some(descriptor) = schema.lookup(name) {
                let taken = std::mem::replace(value, Value::Null);
                *value = descriptor.conform(taken);
            }
        }
    }

    pub(crate) fn values_eq(&self, other: &FieldStore) -> bool {
        self.document_type.name() == other.document_type.name() && self.values == other.values
    }
}

fn resolve(
    existing: Option<&FieldDescriptor>,
    value: &Value,
    create: bool,
    path: &str,
) -> Result<FieldDescriptor> {
    match existing {
        Some(descriptor) => descriptor.reconcile(value, path),
        None if !create => Err(OdmError::FieldCreationDisabled {
            path: path.to_string(),
        }),
        None => infer_descriptor(value, path),
    }
}

fn as_conflict(err: OdmError) -> OdmError {
    match err {
        OdmError::FieldTypeMismatch {
            path,
            expected,
            actual,
        } => OdmError::SchemaConflict {
            path,
            existing: expected,
            incoming: actual,
        },
        other => other,
    }
}

fn link_value(value: &mut Value, handle: &SchemaHandle, path: &str) {
    value.for_each_embedded_mut(&mut |doc: &mut EmbeddedDocument| {
        doc.store_mut().link(handle, path)
    });
}
