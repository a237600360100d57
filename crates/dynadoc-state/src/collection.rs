//! In-memory sample collection
//!
//! A [`Collection`] owns a set of attached sample documents, the shared
//! schema scope they are merged into, and the store holding its runs.
//! Adding a document is the attach point: every field on the instance,
//! including fields on nested embedded documents, is merged into the
//! collection schema as one transaction before the document is stored.
//!
//! Lock order is samples first, then schema. The schema lock is only ever
//! taken inside `SchemaHandle` calls.

use std::sync::Arc;

use dynadoc_odm::{
    get_media_type, Document, DocumentId, DocumentSnapshot, DocumentType, FieldAccess,
    FieldDescriptor, FieldSchema, MediaType, SchemaHandle, SchemaRegistry, Value,
};
use futures::future::try_join_all;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::CollectionConfig;
use crate::error::StateError;
use crate::memory::MemoryRunStore;
use crate::metadata::MetadataProber;
use crate::obs;
use crate::storage_traits::{RunRecord, RunResults, RunStore};
use crate::Result;

/// Field every sample carries its media path in.
pub const FILEPATH: &str = "filepath";
/// Field holding probed media metadata.
pub const METADATA: &str = "metadata";

/// Registry name of the schema scope backing collection `name`.
///
/// Scopes live under their own prefix so a collection never collides with,
/// or silently reuses, a declared document type of the same name.
pub fn scope_name(name: &str) -> String {
    format!("collection:{name}")
}

#[derive(Debug, Default)]
struct CollectionState {
    samples: IndexMap<DocumentId, Document>,
    media_type: Option<MediaType>,
}

pub struct Collection {
    config: CollectionConfig,
    registry: Arc<SchemaRegistry>,
    sample_type: DocumentType,
    schema: SchemaHandle,
    state: RwLock<CollectionState>,
    runs: Arc<dyn RunStore>,
}

impl Collection {
    /// Open a collection with an in-memory run store.
    pub fn new(config: CollectionConfig, registry: Arc<SchemaRegistry>) -> Result<Self> {
        Self::with_run_store(config, registry, Arc::new(MemoryRunStore::new()))
    }

    /// Open a collection whose schema scope is registered under
    /// [`scope_name`] and seeded with the sample type's default fields. The
    /// run and results document types are declared alongside it.
    pub fn with_run_store(
        config: CollectionConfig,
        registry: Arc<SchemaRegistry>,
        runs: Arc<dyn RunStore>,
    ) -> Result<Self> {
        let sample_type = registry.document_type(&config.sample_type)?;
        let scope = scope_name(&config.name);
        registry.declare(sample_type.derive(scope.as_str()))?;
        registry.declare(RunRecord::run_type())?;
        registry.declare(RunResults::results_type())?;
        let schema = registry.schema_handle(&scope)?;
        debug!(collection = %config.name, sample_type = %sample_type, "collection opened");

        let state = CollectionState {
            samples: IndexMap::new(),
            media_type: config.media_type,
        };
        Ok(Self {
            config,
            registry,
            sample_type,
            schema,
            state: RwLock::new(state),
            runs,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn sample_type(&self) -> &DocumentType {
        &self.sample_type
    }

    /// Media type of the collection, once fixed by config or the first sample.
    pub fn media_type(&self) -> Option<MediaType> {
        self.state.read().media_type
    }

    pub fn len(&self) -> usize {
        self.state.read().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().samples.is_empty()
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.state.read().samples.contains_key(id)
    }

    /// Sample ids in insertion order.
    pub fn ids(&self) -> Vec<DocumentId> {
        self.state.read().samples.keys().cloned().collect()
    }

    /// Attach `document` and store it.
    ///
    /// Fails without touching the schema if the id is taken, the document
    /// type is not the sample type, or the sample's media type differs from
    /// the collection's.
    pub fn add(&self, mut document: Document) -> Result<DocumentId> {
        self.check_type(&document)?;
        let media = media_type_of(&document);

        let mut state = self.state.write();
        if state.samples.contains_key(document.id()) {
            return Err(StateError::DuplicateDocument {
                id: document.id().to_string(),
            });
        }
        if let (Some(expected), Some(actual)) = (state.media_type, media) {
            if expected != actual {
                return Err(StateError::MediaTypeMismatch {
                    filepath: filepath_of(&document).unwrap_or_default().to_string(),
                    expected,
                    actual,
                });
            }
        }

        document.attach(&self.schema)?;
        if state.media_type.is_none() {
            state.media_type = media;
        }
        let id = document.id().clone();
        obs::emit_sample_added(self.name(), id.as_str(), document.values().count());
        state.samples.insert(id.clone(), document);
        Ok(id)
    }

    /// Add documents in order. Stops at the first failure; documents added
    /// before it stay in the collection.
    pub fn add_many(&self, documents: impl IntoIterator<Item = Document>) -> Result<Vec<DocumentId>> {
        let _span = obs::CollectionSpan::enter(self.name());
        documents.into_iter().map(|doc| self.add(doc)).collect()
    }

    /// Read-only snapshot of a sample's committed values.
    pub fn get(&self, id: &DocumentId) -> Result<DocumentSnapshot> {
        self.state
            .read()
            .samples
            .get(id)
            .map(Document::snapshot)
            .ok_or_else(|| StateError::DocumentNotFound { id: id.to_string() })
    }

    /// Snapshots of every sample in insertion order.
    pub fn snapshots(&self) -> Vec<DocumentSnapshot> {
        self.state
            .read()
            .samples
            .values()
            .map(Document::snapshot)
            .collect()
    }

    /// Mutate a sample in place under the collection write lock. New fields
    /// reach the collection schema on the mutating call.
    pub fn update<R>(
        &self,
        id: &DocumentId,
        f: impl FnOnce(&mut Document) -> dynadoc_odm::Result<R>,
    ) -> Result<R> {
        let mut state = self.state.write();
        let document = state
            .samples
            .get_mut(id)
            .ok_or_else(|| StateError::DocumentNotFound { id: id.to_string() })?;
        Ok(f(document)?)
    }

    /// Remove a sample and return it detached. The schema keeps its fields.
    pub fn remove(&self, id: &DocumentId) -> Result<Document> {
        let mut document = self
            .state
            .write()
            .samples
            .shift_remove(id)
            .ok_or_else(|| StateError::DocumentNotFound { id: id.to_string() })?;
        document.detach();
        obs::emit_sample_removed(self.name(), id.as_str());
        Ok(document)
    }

    /// Current merged schema, including every field ever added by any
    /// attached sample.
    pub fn get_field_schema(&self) -> FieldSchema {
        self.schema.snapshot()
    }

    pub fn schema_handle(&self) -> &SchemaHandle {
        &self.schema
    }

    /// Declare a field on the collection schema without inferring it from a
    /// value. `path` may be dotted to reach into embedded fields.
    pub fn add_sample_field(&self, path: &str, descriptor: FieldDescriptor) -> Result<()> {
        self.schema.merge_field(path, &descriptor)?;
        obs::emit_field_merged(self.name(), path, &descriptor);
        Ok(())
    }

    /// Remove a top-level dynamic field from the schema and clear it on every
    /// sample. Default fields of the sample type cannot be removed.
    pub fn delete_sample_field(&self, name: &str) -> Result<()> {
        let mut state = self.state.write();
        self.schema.remove_field(name)?;
        for document in state.samples.values_mut() {
            document.clear_field(name);
        }
        obs::emit_field_deleted(self.name(), name);
        Ok(())
    }

    /// Probe every sample's media and store the result in its `metadata`
    /// field. Returns the number of samples updated.
    ///
    /// Probes run concurrently with no lock held; the first failure aborts
    /// the call before any sample is written.
    pub async fn compute_metadata(&self, prober: &dyn MetadataProber) -> Result<usize> {
        let targets: Vec<(DocumentId, String)> = self
            .state
            .read()
            .samples
            .iter()
            .filter_map(|(id, doc)| filepath_of(doc).map(|fp| (id.clone(), fp.to_string())))
            .collect();

        let probed = try_join_all(targets.into_iter().map(|(id, filepath)| async move {
            let metadata = prober.probe(&filepath).await?;
            let embedded = metadata.to_embedded().map_err(|e| match e {
                StateError::Metadata { reason, .. } => StateError::Metadata {
                    filepath: filepath.clone(),
                    reason,
                },
                other => other,
            })?;
            Ok::<_, StateError>((id, embedded))
        }))
        .await?;

        let mut state = self.state.write();
        let mut updated = 0;
        for (id, embedded) in probed {
            // Samples removed while probing are skipped.
            if let Some(document) = state.samples.get_mut(&id) {
                document.set(METADATA, embedded)?;
                updated += 1;
            }
        }
        debug!(collection = %self.name(), updated, "metadata computed");
        Ok(updated)
    }

    /// The collection's run store.
    pub fn runs(&self) -> &dyn RunStore {
        self.runs.as_ref()
    }

    fn check_type(&self, document: &Document) -> Result<()> {
        let actual = document.document_type().name();
        if actual != self.sample_type.name() {
            return Err(StateError::DocumentTypeMismatch {
                collection: self.name().to_string(),
                expected: self.sample_type.name().to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.config.name)
            .field("samples", &self.len())
            .field("media_type", &self.media_type())
            .finish()
    }
}

fn filepath_of(document: &Document) -> Option<&str> {
    document.get(FILEPATH).and_then(Value::as_str)
}

fn media_type_of(document: &Document) -> Option<MediaType> {
    filepath_of(document).map(get_media_type)
}
