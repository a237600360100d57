//! Embedded documents
//!
//! Identity-less documents nested inside a [`Document`](crate::Document) field
//! or inside a list/dict field of another embedded document. Once the owner is
//! attached, fields added here are merged into the collection schema at this
//! document's path; list and dict elements share one element schema.

use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::accessor::{FieldAccess, FieldStore};
use crate::registry::DocumentType;
use crate::schema::FieldSchema;
use crate::value::Value;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddedDocument {
    store: FieldStore,
}

impl EmbeddedDocument {
    pub fn new(document_type: DocumentType) -> Self {
        Self {
            store: FieldStore::new(document_type),
        }
    }

    /// Builder that sets (creating if needed) one field.
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.store.set(name, value.into(), true)?;
        Ok(self)
    }

    pub fn document_type(&self) -> &DocumentType {
        self.store.document_type()
    }

    pub fn is_attached(&self) -> bool {
        self.store.is_attached()
    }

    /// Dotted path of `name` from the owning document's root, or just `name`
    /// while detached.
    pub fn path_of(&self, name: &str) -> String {
        self.store.path_of(name)
    }

    /// Stored `(name, value)` pairs in insertion order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.store.values()
    }

    /// Type defaults plus the fields added on this instance, ignoring any
    /// collection the owner is attached to.
    pub fn local_schema(&self) -> FieldSchema {
        self.store.local_schema()
    }

    /// Mutable access to an embedded-document field of this document.
    pub fn embedded_mut(&mut self, name: &str) -> Result<&mut EmbeddedDocument> {
        self.store.embedded_mut(name)
    }

    /// Mutable access to the embedded document at `index` of list field `name`.
    pub fn list_element_mut(&mut self, name: &str, index: usize) -> Result<&mut EmbeddedDocument> {
        self.store.list_element_mut(name, index)
    }

    /// Mutable access to the embedded document under `key` of dict field `name`.
    pub fn dict_value_mut(&mut self, name: &str, key: &str) -> Result<&mut EmbeddedDocument> {
        self.store.dict_value_mut(name, key)
    }

    pub(crate) fn stored(&self, name: &str) -> Option<&Value> {
        self.store.value(name)
    }

    pub(crate) fn store_mut(&mut self) -> &mut FieldStore {
        &mut self.store
    }

    pub(crate) fn conform_to(&mut self, schema: &FieldSchema) {
        self.store.conform_to(schema);
    }
}

impl FieldAccess for EmbeddedDocument {
    fn document_type(&self) -> &DocumentType {
        self.store.document_type()
    }

    fn get_field(&self, name: &str) -> Result<&Value> {
        self.store.get(name)
    }

    fn set_field(&mut self, name: &str, value: Value, create: bool) -> Result<()> {
        self.store.set(name, value, create)
    }

    fn has_field(&self, name: &str) -> bool {
        self.store.has(name)
    }

    fn delete_field(&mut self, name: &str) -> Result<()> {
        self.store.delete(name)
    }

    fn field_names(&self) -> Vec<String> {
        self.store.names()
    }

    fn field_schema(&self) -> FieldSchema {
        self.store.effective_schema()
    }
}

/// Two embedded documents are equal when they have the same type and the same
/// stored values; attachment state is not compared.
impl PartialEq for EmbeddedDocument {
    fn eq(&self, other: &Self) -> bool {
        self.store.values_eq(&other.store)
    }
}

impl Index<&str> for EmbeddedDocument {
    type Output = Value;

    fn index(&self, name: &str) -> &Value {
        match self.store.get(name) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}
