//! Error types for dynadoc-state

use dynadoc_odm::{MediaType, OdmError};
use thiserror::Error;

/// Errors raised by collection operations
#[derive(Error, Debug)]
pub enum StateError {
    /// Field or schema failure from the document model
    #[error(transparent)]
    Odm(#[from] OdmError),

    /// No document with this id in the collection
    #[error("document not found: {id}")]
    DocumentNotFound { id: String },

    /// A document with this id is already in the collection
    #[error("document already in collection: {id}")]
    DuplicateDocument { id: String },

    /// Document of a type other than the collection's sample type
    #[error("collection {collection} holds {expected} documents, got {actual}")]
    DocumentTypeMismatch {
        collection: String,
        expected: String,
        actual: String,
    },

    /// Sample whose media differs from the collection's media type
    #[error("sample {filepath} is {actual} but the collection holds {expected} media")]
    MediaTypeMismatch {
        filepath: String,
        expected: MediaType,
        actual: MediaType,
    },

    /// Metadata probing failed
    #[error("metadata probe failed for {filepath}: {reason}")]
    Metadata { filepath: String, reason: String },

    /// Required configuration missing or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Run storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised by run and results storage
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// A run with this key already exists
    #[error("run key already exists: {key}")]
    DuplicateRunKey { key: String },

    /// No run with this key
    #[error("run not found: {key}")]
    RunNotFound { key: String },

    /// Results were already attached to the run; the reference is immutable
    #[error("results already attached to run {key}")]
    ResultsAlreadyAttached { key: String },

    /// Run is pending, or its results blob is missing from the store
    #[error("results not found: {id}")]
    ResultsNotFound { id: String },

    /// Stored results do not hash to the digest recorded on the run
    #[error("digest mismatch for results {id}: expected {expected}, got {actual}")]
    DigestMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    /// Digest string is not 64 hex characters
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Results could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A run record field rejected its value
    #[error("run record: {0}")]
    Record(#[from] OdmError),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
