//! Top-level documents
//!
//! A [`Document`] has a stable identity and a dynamic field set. It is created
//! detached; [`Document::attach`] is the single synchronization point that
//! merges every field on the instance, recursively through embedded, list and
//! dict fields, into a collection schema and links the instance to it so later
//! additions propagate on the mutating call itself.

use std::fmt;
use std::ops::{Deref, Index};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::accessor::{FieldAccess, FieldStore};
use crate::embedded::EmbeddedDocument;
use crate::registry::{DocumentType, SchemaHandle};
use crate::schema::FieldSchema;
use crate::value::Value;
use crate::Result;

/// Unique identifier of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    /// Generate a new random DocumentId
    pub fn new() -> Self {
        DocumentId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId(s.to_string())
    }
}

/// A document with identity.
///
/// Cloning yields a detached copy: only the instance held by a collection
/// propagates new fields to the collection schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    fields: FieldStore,
}

impl Document {
    pub fn new(document_type: DocumentType) -> Self {
        Self::with_id(DocumentId::new(), document_type)
    }

    pub fn with_id(id: DocumentId, document_type: DocumentType) -> Self {
        Self {
            id,
            fields: FieldStore::new(document_type),
        }
    }

    /// Builder that sets (creating if needed) one field.
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.fields.set(name, value.into(), true)?;
        Ok(self)
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn document_type(&self) -> &DocumentType {
        self.fields.document_type()
    }

    pub fn is_attached(&self) -> bool {
        self.fields.is_attached()
    }

    /// Stored `(name, value)` pairs in insertion order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.values()
    }

    /// Every field this instance would contribute to a collection schema:
    /// type defaults, fields added on the instance, and fields added on any
    /// embedded document below it.
    pub fn discovered_fields(&self) -> Result<FieldSchema> {
        self.fields.discovered_fields()
    }

    /// Merge this instance's fields into `schema` as one transaction, then
    /// link the instance and all of its embedded documents to it.
    ///
    /// Values meet fields the schema already declares under the same rules as
    /// [`FieldAccess::set_field`]; integers stored in float fields are widened.
    /// On failure neither the schema nor the instance changes.
    pub fn attach(&mut self, schema: &SchemaHandle) -> Result<()> {
        let changed = schema.transact(|committed| self.fields.merge_into(committed))?;
        self.fields.conform_to(&schema.snapshot());
        self.fields.link(schema, "");
        debug!(document_id = %self.id, scope = %schema.type_name(), changed, "document attached");
        Ok(())
    }

    /// Unlink this instance from its collection schema.
    pub fn detach(&mut self) {
        self.fields.unlink();
    }

    /// Drop the value and any instance-level descriptor of `name`, without
    /// failing when the field is absent.
    pub fn clear_field(&mut self, name: &str) {
        self.fields.purge(name);
    }

    /// Mutable access to an embedded-document field.
    pub fn embedded_mut(&mut self, name: &str) -> Result<&mut EmbeddedDocument> {
        self.fields.embedded_mut(name)
    }

    /// Mutable access to the embedded document at `index` of list field `name`.
    pub fn list_element_mut(&mut self, name: &str, index: usize) -> Result<&mut EmbeddedDocument> {
        self.fields.list_element_mut(name, index)
    }

    /// Mutable access to the embedded document under `key` of dict field `name`.
    pub fn dict_value_mut(&mut self, name: &str, key: &str) -> Result<&mut EmbeddedDocument> {
        self.fields.dict_value_mut(name, key)
    }

    /// Read-only copy of the committed field values, resolving declared
    /// fields against the schema as it stands now.
    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot(Document {
            id: self.id.clone(),
            fields: self.fields.frozen_copy(),
        })
    }
}

impl FieldAccess for Document {
    fn document_type(&self) -> &DocumentType {
        self.fields.document_type()
    }

    fn get_field(&self, name: &str) -> Result<&Value> {
        self.fields.get(name)
    }

    fn set_field(&mut self, name: &str, value: Value, create: bool) -> Result<()> {
        self.fields.set(name, value, create)
    }

    fn has_field(&self, name: &str) -> bool {
        self.fields.has(name)
    }

    fn delete_field(&mut self, name: &str) -> Result<()> {
        self.fields.delete(name)
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.names()
    }

    fn field_schema(&self) -> FieldSchema {
        self.fields.effective_schema()
    }
}

impl Index<&str> for Document {
    type Output = Value;

    fn index(&self, name: &str) -> &Value {
        match self.fields.get(name) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

/// Immutable view of a document as last committed.
///
/// Dereferences to [`Document`] for reads; offers no way to mutate. The view
/// is detached, and fields declared on the collection after it was taken do
/// not appear in it.
#[derive(Debug)]
pub struct DocumentSnapshot(Document);

impl Clone for DocumentSnapshot {
    fn clone(&self) -> Self {
        self.0.snapshot()
    }
}

impl Deref for DocumentSnapshot {
    type Target = Document;

    fn deref(&self) -> &Document {
        &self.0
    }
}
