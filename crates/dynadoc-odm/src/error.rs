//! Error types for dynadoc-odm

use thiserror::Error;

/// Errors raised by the document model.
///
/// Every variant names the offending field path. Failures are all-or-nothing:
/// the instance or schema involved is left exactly as it was before the call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OdmError {
    /// Read of a field that is neither set on the instance nor declared in its schema
    #[error("field not found: {path}")]
    FieldNotFound { path: String },

    /// Write to an unknown field with `create = false`
    #[error("field {path} does not exist and creation is disabled")]
    FieldCreationDisabled { path: String },

    /// Write of a value whose kind is incompatible with the existing field
    #[error("type mismatch for field {path}: expected {expected}, got {actual}")]
    FieldTypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Two different descriptors meet at the same schema path
    #[error("schema conflict at {path}: existing {existing}, incoming {incoming}")]
    SchemaConflict {
        path: String,
        existing: String,
        incoming: String,
    },

    /// No descriptor can be inferred from the value
    #[error("cannot infer a field type for {path}: {reason}")]
    UnsupportedValue { path: String, reason: String },

    /// Lookup of a document type the registry has never seen
    #[error("unknown document type: {name}")]
    UnknownDocumentType { name: String },

    /// A type name was declared twice with different default fields
    #[error("document type {name} is already declared with different fields")]
    DuplicateDocumentType { name: String },

    /// Attempt to remove a field the document type declares by default
    #[error("field {path} is a default field of {document_type} and cannot be removed")]
    ProtectedField { path: String, document_type: String },

    /// Media type string that is not image, video or point-cloud
    #[error("unknown media type: {value}")]
    UnknownMediaType { value: String },
}
