//! In-memory run and results stores
//!
//! `MemoryResultsStore` and `MemoryRunStore` satisfy the storage trait
//! contracts without any external dependencies. Every check-then-act sequence
//! on a run key runs inside a single lock scope, and no lock is held across
//! an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dynadoc_odm::DocumentId;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::StorageError;
use crate::obs;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryResultsStore
// ---------------------------------------------------------------------------

/// Results blobs held as serialized bytes, keyed by blob id.
#[derive(Debug, Default)]
pub struct MemoryResultsStore {
    blobs: Mutex<HashMap<DocumentId, Vec<u8>>>,
}

impl MemoryResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

#[async_trait]
impl ResultsStore for MemoryResultsStore {
    async fn put(&self, results: &RunResults) -> StorageResult<ResultsRef> {
        let bytes = results.to_bytes()?;
        let reference = ResultsRef::new(ContentDigest::from_bytes(&bytes));
        self.blobs.lock().insert(reference.id().clone(), bytes);
        debug!(results_id = %reference.id(), digest = %reference.digest.short(), "results stored");
        Ok(reference)
    }

    async fn get(&self, reference: &ResultsRef) -> StorageResult<RunResults> {
        let bytes = self
            .blobs
            .lock()
            .get(reference.id())
            .cloned()
            .ok_or_else(|| StorageError::ResultsNotFound {
                id: reference.id().to_string(),
            })?;
        let actual = ContentDigest::from_bytes(&bytes);
        if actual != reference.digest {
            return Err(StorageError::DigestMismatch {
                id: reference.id().to_string(),
                expected: reference.digest.to_string(),
                actual: actual.to_string(),
            });
        }
        RunResults::from_bytes(&bytes)
    }

    async fn delete(&self, id: &DocumentId) -> StorageResult<()> {
        self.blobs.lock().remove(id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryRunStore
// ---------------------------------------------------------------------------

/// Run records in creation order, with results kept in a separate store.
pub struct MemoryRunStore {
    runs: Mutex<IndexMap<String, RunRecord>>,
    results: Arc<dyn ResultsStore>,
}

impl MemoryRunStore {
    /// Run store backed by a fresh `MemoryResultsStore`.
    pub fn new() -> Self {
        Self::with_results_store(Arc::new(MemoryResultsStore::new()))
    }

    pub fn with_results_store(results: Arc<dyn ResultsStore>) -> Self {
        Self {
            runs: Mutex::new(IndexMap::new()),
            results,
        }
    }

    fn check_attachable(&self, key: &str) -> StorageResult<()> {
        match self.runs.lock().get(key) {
            None => Err(StorageError::RunNotFound {
                key: key.to_string(),
            }),
            Some(run) if !run.is_pending() => Err(StorageError::ResultsAlreadyAttached {
                key: key.to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    fn commit_results(&self, key: &str, reference: &ResultsRef) -> StorageResult<()> {
        let mut runs = self.runs.lock();
        let run = runs.get_mut(key).ok_or_else(|| StorageError::RunNotFound {
            key: key.to_string(),
        })?;
        run.set_results(reference)
    }

    fn results_ref(&self, key: &str) -> StorageResult<ResultsRef> {
        let runs = self.runs.lock();
        let run = runs.get(key).ok_or_else(|| StorageError::RunNotFound {
            key: key.to_string(),
        })?;
        run.results()
            .ok_or_else(|| StorageError::ResultsNotFound {
                id: format!("pending run {key}"),
            })
    }

    fn remove_record(&self, key: &str) -> StorageResult<RunRecord> {
        self.runs
            .lock()
            .shift_remove(key)
            .ok_or_else(|| StorageError::RunNotFound {
                key: key.to_string(),
            })
    }
}

impl Default for MemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryRunStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRunStore")
            .field("runs", &self.runs.lock().len())
            .finish()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(
        &self,
        key: &str,
        config: RunConfig,
        view_stages: Vec<String>,
    ) -> StorageResult<RunRecord> {
        let record = RunRecord::new(key, config, view_stages)?;
        {
            let mut runs = self.runs.lock();
            if runs.contains_key(key) {
                return Err(StorageError::DuplicateRunKey {
                    key: key.to_string(),
                });
            }
            runs.insert(key.to_string(), record.clone());
        }
        obs::emit_run_created(key, record.view_stages().len());
        Ok(record)
    }

    async fn attach_results(&self, key: &str, results: RunResults) -> StorageResult<ResultsRef> {
        self.check_attachable(key)?;
        let reference = self.results.put(&results).await?;

        // Another attach or a delete may have won while the blob was written.
        if let Err(err) = self.commit_results(key, &reference) {
            if let Err(cleanup) = self.results.delete(reference.id()).await {
                obs::emit_orphan_cleanup_error(key, &cleanup);
            }
            return Err(err);
        }

        obs::emit_results_attached(key, reference.digest.as_str());
        Ok(reference)
    }

    async fn get_run(&self, key: &str) -> StorageResult<RunRecord> {
        self.runs
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::RunNotFound {
                key: key.to_string(),
            })
    }

    async fn list_runs(&self) -> StorageResult<Vec<RunRecord>> {
        Ok(self.runs.lock().values().cloned().collect())
    }

    async fn load_results(&self, key: &str) -> StorageResult<RunResults> {
        let reference = self.results_ref(key)?;
        self.results.get(&reference).await
    }

    async fn delete_run(&self, key: &str) -> StorageResult<()> {
        let record = self.remove_record(key)?;
        if let Some(reference) = record.results() {
            self.results.delete(reference.id()).await?;
        }
        obs::emit_run_deleted(key);
        Ok(())
    }
}
