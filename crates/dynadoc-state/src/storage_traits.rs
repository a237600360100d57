//! Storage trait definitions for runs
//!
//! - `RunStore`: lightweight run metadata keyed by run key
//! - `ResultsStore`: out-of-line results blobs addressed by `ResultsRef`
//!
//! A run's results live in the results store and are referenced from the
//! run record, so listing runs never loads results and replacing a blob never
//! rewrites run metadata. In-memory implementations live in `memory`.

use std::ops::Index;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dynadoc_odm::{
    Document, DocumentId, DocumentRef, DocumentType, EmbeddedDocument, FieldAccess,
    FieldDescriptor, FieldSchema, Value,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Free-form run configuration, outside the field-schema rules.
pub type RunConfig = serde_json::Map<String, serde_json::Value>;

/// Name of the document type backing every results blob.
pub const RUN_RESULTS: &str = "RunResults";
/// Name of the document type backing every run record.
pub const RUN: &str = "Run";

const KEY: &str = "key";
const TIMESTAMP: &str = "timestamp";
const VIEW_STAGES: &str = "view_stages";
const RESULTS: &str = "results";
const RESULTS_DIGEST: &str = "results_digest";

// ---------------------------------------------------------------------------
// Digests and references
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private so the string is always valid lowercase hex
/// produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pointer from a run record to its results blob.
///
/// The blob is addressed like any other out-of-line document, by a
/// [`DocumentRef`] of type `RunResults`; a fresh id is minted for every
/// stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultsRef {
    pub document: DocumentRef,
    /// Digest of the blob's serialized bytes, checked on every load
    pub digest: ContentDigest,
}

impl ResultsRef {
    /// Reference to a blob that will be stored under a fresh id.
    pub fn new(digest: ContentDigest) -> Self {
        Self {
            document: DocumentRef::new(RUN_RESULTS, DocumentId::new()),
            digest,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.document.id
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Metadata for one executed pipeline run.
///
/// Backed by an embedded document of type `Run`, so key, timestamp, view
/// stages and the results reference are ordinary typed fields. The free-form
/// `config` lives beside the document and is not subject to field-schema
/// rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    run: EmbeddedDocument,
    config: RunConfig,
}

impl RunRecord {
    /// The `Run` document type and its default fields.
    pub fn run_type() -> DocumentType {
        DocumentType::new(
            RUN,
            FieldSchema::new()
                .with_field(KEY, FieldDescriptor::String)
                .with_field(TIMESTAMP, FieldDescriptor::DateTime)
                .with_field(VIEW_STAGES, FieldDescriptor::list(FieldDescriptor::String))
                .with_field(RESULTS, FieldDescriptor::reference(RUN_RESULTS))
                .with_field(RESULTS_DIGEST, FieldDescriptor::String),
        )
    }

    /// A pending run stamped with the current time.
    pub fn new(
        key: impl Into<String>,
        config: RunConfig,
        view_stages: Vec<String>,
    ) -> StorageResult<Self> {
        let mut run = EmbeddedDocument::new(Self::run_type());
        run.set_field(KEY, Value::from(key.into()), false)?;
        run.set_field(TIMESTAMP, Value::from(Utc::now()), false)?;
        run.set_field(VIEW_STAGES, Value::from(view_stages), false)?;
        Ok(Self { run, config })
    }

    pub fn key(&self) -> &str {
        self.run.get(KEY).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.run.get(TIMESTAMP) {
            Some(Value::DateTime(ts)) => Some(*ts),
            _ => None,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Serialized view stages, in pipeline order.
    pub fn view_stages(&self) -> Vec<String> {
        self.run
            .get(VIEW_STAGES)
            .and_then(Value::as_list)
            .map(|stages| {
                stages
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn results(&self) -> Option<ResultsRef> {
        let document = self.run.get(RESULTS).and_then(Value::as_reference)?;
        let digest = self.run.get(RESULTS_DIGEST).and_then(Value::as_str)?;
        Some(ResultsRef {
            document: document.clone(),
            digest: ContentDigest(digest.to_string()),
        })
    }

    /// A run without results is still pending.
    pub fn is_pending(&self) -> bool {
        self.run.get(RESULTS).map_or(true, Value::is_null)
    }

    /// Point the run at its results. The reference is set at most once.
    pub fn set_results(&mut self, reference: &ResultsRef) -> StorageResult<()> {
        if !self.is_pending() {
            return Err(StorageError::ResultsAlreadyAttached {
                key: self.key().to_string(),
            });
        }
        self.run
            .set_field(RESULTS, Value::from(reference.document.clone()), false)?;
        self.run.set_field(
            RESULTS_DIGEST,
            Value::from(reference.digest.as_str()),
            false,
        )?;
        Ok(())
    }

    /// The backing `Run` document.
    pub fn document(&self) -> &EmbeddedDocument {
        &self.run
    }
}

/// Schema-less output of a run.
///
/// A detached `RunResults` document; every field is dynamic and created on
/// first write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunResults(Document);

impl RunResults {
    pub fn results_type() -> DocumentType {
        DocumentType::new(RUN_RESULTS, FieldSchema::new())
    }

    pub fn new() -> Self {
        Self(Document::new(Self::results_type()))
    }

    /// Builder that sets one field.
    pub fn with_field(self, name: &str, value: impl Into<Value>) -> dynadoc_odm::Result<Self> {
        Ok(Self(self.0.with_field(name, value)?))
    }

    pub fn document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }

    /// Canonical byte encoding used for storage and digests.
    pub fn to_bytes(&self) -> StorageResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> StorageResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

impl Default for RunResults {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldAccess for RunResults {
    fn document_type(&self) -> &DocumentType {
        self.0.document_type()
    }

    fn get_field(&self, name: &str) -> dynadoc_odm::Result<&Value> {
        self.0.get_field(name)
    }

    fn set_field(&mut self, name: &str, value: Value, create: bool) -> dynadoc_odm::Result<()> {
        self.0.set_field(name, value, create)
    }

    fn has_field(&self, name: &str) -> bool {
        self.0.has_field(name)
    }

    fn delete_field(&mut self, name: &str) -> dynadoc_odm::Result<()> {
        self.0.delete_field(name)
    }

    fn field_names(&self) -> Vec<String> {
        self.0.field_names()
    }

    fn field_schema(&self) -> FieldSchema {
        self.0.field_schema()
    }
}

impl Index<&str> for RunResults {
    type Output = Value;

    fn index(&self, name: &str) -> &Value {
        &self.0[name]
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Out-of-line results storage.
///
/// Guarantees:
/// - `put` returns a reference whose digest matches the stored bytes.
/// - `get` fails with `DigestMismatch` if the stored bytes no longer match.
#[async_trait]
pub trait ResultsStore: Send + Sync {
    /// Store a results blob under a fresh id.
    async fn put(&self, results: &RunResults) -> StorageResult<ResultsRef>;

    /// Load a blob. `ResultsNotFound` if absent.
    async fn get(&self, reference: &ResultsRef) -> StorageResult<RunResults>;

    /// Delete a blob. No-op if absent.
    async fn delete(&self, id: &DocumentId) -> StorageResult<()>;
}

/// Run metadata store for one collection.
///
/// Guarantees:
/// - Keys are unique; concurrent `create_run` calls with one key admit
///   exactly one winner.
/// - A run's results reference is set at most once.
/// - `list_runs` never reads results blobs.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Create a pending run. `DuplicateRunKey` if `key` exists.
    async fn create_run(
        &self,
        key: &str,
        config: RunConfig,
        view_stages: Vec<String>,
    ) -> StorageResult<RunRecord>;

    /// Store `results` and reference them from the run.
    async fn attach_results(&self, key: &str, results: RunResults) -> StorageResult<ResultsRef>;

    async fn get_run(&self, key: &str) -> StorageResult<RunRecord>;

    /// All runs in creation order.
    async fn list_runs(&self) -> StorageResult<Vec<RunRecord>>;

    /// Load a run's results. `ResultsNotFound` while the run is pending.
    async fn load_results(&self, key: &str) -> StorageResult<RunResults>;

    /// Delete a run and its results blob.
    async fn delete_run(&self, key: &str) -> StorageResult<()>;
}
