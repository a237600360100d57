//! Schema registry
//!
//! Maps each declared document type (or collection scope) to its evolving
//! [`FieldSchema`]. The registry is an explicit object: create one per process
//! or per test and pass it by reference to whatever needs schema resolution.
//!
//! Each schema lives in its own cell behind an `RwLock`. Mutations run as
//! transactions on a copy that is swapped in only on success, so readers never
//! observe a partially merged path and failed merges leave no trace.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::FieldDescriptor;
use crate::error::OdmError;
use crate::schema::FieldSchema;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TypeInfo {
    name: String,
    default_fields: FieldSchema,
}

/// Handle to a declared document type: its name plus the default fields it
/// declares at definition time. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TypeInfo", into = "TypeInfo")]
pub struct DocumentType(Arc<TypeInfo>);

impl DocumentType {
    pub fn new(name: impl Into<String>, default_fields: FieldSchema) -> Self {
        Self(Arc::new(TypeInfo {
            name: name.into(),
            default_fields,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn default_fields(&self) -> &FieldSchema {
        &self.0.default_fields
    }

    /// Same default fields under another name; used for per-collection scopes.
    pub fn derive(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.0.default_fields.clone())
    }
}

impl From<TypeInfo> for DocumentType {
    fn from(info: TypeInfo) -> Self {
        Self(Arc::new(info))
    }
}

impl From<DocumentType> for TypeInfo {
    fn from(doc_type: DocumentType) -> Self {
        doc_type.0.as_ref().clone()
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct SchemaCell {
    type_name: String,
    defaults: FieldSchema,
    schema: RwLock<FieldSchema>,
}

/// Shared, lock-protected schema of one declared type or collection scope.
#[derive(Clone)]
pub struct SchemaHandle(Arc<SchemaCell>);

impl SchemaHandle {
    fn new(doc_type: &DocumentType) -> Self {
        Self(Arc::new(SchemaCell {
            type_name: doc_type.name().to_string(),
            defaults: doc_type.default_fields().clone(),
            schema: RwLock::new(doc_type.default_fields().clone()),
        }))
    }

    pub fn type_name(&self) -> &str {
        &self.0.type_name
    }

    /// Copy of the schema as of the last committed merge.
    pub fn snapshot(&self) -> FieldSchema {
        self.0.schema.read().clone()
    }

    /// Run `f` against the committed schema without copying it.
    pub fn read<R>(&self, f: impl FnOnce(&FieldSchema) -> R) -> R {
        f(&self.0.schema.read())
    }

    /// Run `f` against a copy of the schema under the write lock and commit the
    /// copy only if `f` succeeds.
    pub fn transact<R>(&self, f: impl FnOnce(&mut FieldSchema) -> Result<R>) -> Result<R> {
        let mut guard = self.0.schema.write();
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        *guard = draft;
        Ok(out)
    }

    /// Merge one descriptor at a dotted path.
    pub fn merge_field(&self, path: &str, descriptor: &FieldDescriptor) -> Result<()> {
        let changed = self.transact(|schema| schema.merge_field(path, descriptor))?;
        if changed {
            debug!(scope = %self.type_name(), path = %path, descriptor = %descriptor, "schema field merged");
        }
        Ok(())
    }

    /// Merge a batch of descriptors as one transaction.
    pub fn merge_fields<'a>(
        &self,
        entries: impl IntoIterator<Item = (&'a str, &'a FieldDescriptor)>,
    ) -> Result<usize> {
        let changed = self.transact(|schema| {
            let mut changed = 0;
            for (path, descriptor) in entries {
                if schema.merge_field(path, descriptor)? {
                    changed += 1;
                }
            }
            Ok(changed)
        })?;
        if changed > 0 {
            debug!(scope = %self.type_name(), changed, "schema fields merged");
        }
        Ok(changed)
    }

    /// Remove a top-level dynamic field. Default fields of the scope's type
    /// are protected; removing an undeclared field is a `FieldNotFound`.
    pub fn remove_field(&self, name: &str) -> Result<FieldDescriptor> {
        if self.0.defaults.contains(name) {
            return Err(OdmError::ProtectedField {
                path: name.to_string(),
                document_type: self.type_name().to_string(),
            });
        }
        let removed = self.transact(|schema| {
            schema.remove(name).ok_or_else(|| OdmError::FieldNotFound {
                path: name.to_string(),
            })
        })?;
        debug!(scope = %self.type_name(), field = %name, "schema field removed");
        Ok(removed)
    }

    pub fn ptr_eq(&self, other: &SchemaHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SchemaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaHandle")
            .field("type_name", &self.type_name())
            .field("fields", &self.read(FieldSchema::len))
            .finish()
    }
}

/// Process- or test-scoped registry of declared types and their schemas.
#[derive(Default)]
pub struct SchemaRegistry {
    types: RwLock<HashMap<String, DocumentType>>,
    schemas: RwLock<HashMap<String, SchemaHandle>>,
}

impl SchemaRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in sample, metadata and label types.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        {
            let mut types = registry.types.write();
            for doc_type in crate::labels::builtin_types() {
                types.insert(doc_type.name().to_string(), doc_type);
            }
        }
        registry
    }

    /// Declare a type. Declaring the same name again with identical defaults
    /// returns the existing handle.
    pub fn declare(&self, doc_type: DocumentType) -> Result<DocumentType> {
        let mut types = self.types.write();
        if let Some(existing) = types.get(doc_type.name()) {
            if existing.default_fields() == doc_type.default_fields() {
                return Ok(existing.clone());
            }
            return Err(OdmError::DuplicateDocumentType {
                name: doc_type.name().to_string(),
            });
        }
        debug!(document_type = %doc_type.name(), defaults = doc_type.default_fields().len(), "document type declared");
        types.insert(doc_type.name().to_string(), doc_type.clone());
        Ok(doc_type)
    }

    pub fn declare_type(
        &self,
        name: impl Into<String>,
        default_fields: FieldSchema,
    ) -> Result<DocumentType> {
        self.declare(DocumentType::new(name, default_fields))
    }

    pub fn document_type(&self, name: &str) -> Result<DocumentType> {
        self.types
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| OdmError::UnknownDocumentType {
                name: name.to_string(),
            })
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    /// Shared schema of `name`, created and seeded with the type's default
    /// fields on first access.
    pub fn schema_handle(&self, name: &str) -> Result<SchemaHandle> {
        if let Some(handle) = self.schemas.read().get(name) {
            return Ok(handle.clone());
        }
        let doc_type = self.document_type(name)?;
        let mut schemas = self.schemas.write();
        let handle = schemas
            .entry(name.to_string())
            .or_insert_with(|| SchemaHandle::new(&doc_type));
        Ok(handle.clone())
    }

    /// Current schema of `name`, including every merged dynamic field.
    pub fn schema_for(&self, name: &str) -> Result<FieldSchema> {
        Ok(self.schema_handle(name)?.snapshot())
    }

    /// Merge `descriptor` at dotted `path` of type `name`'s schema.
    pub fn merge_field(&self, name: &str, path: &str, descriptor: &FieldDescriptor) -> Result<()> {
        self.schema_handle(name)?.merge_field(path, descriptor)
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("SchemaRegistry").field("types", &names).finish()
    }
}
