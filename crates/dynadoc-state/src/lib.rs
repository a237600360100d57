//! Dynadoc-State: collections and run storage
//!
//! This crate hosts the layer that consumes the `dynadoc-odm` document
//! model: collections that attach samples to a shared schema scope, and the
//! storage of pipeline runs with their out-of-line results.
//!
//! ## Key Components
//!
//! - `Collection`: attach point for samples, schema introspection, metadata
//! - `RunStore` / `ResultsStore`: run metadata and results blob storage
//! - `MemoryRunStore` / `MemoryResultsStore`: in-memory implementations
//! - `CollectionConfig`: builder and environment configuration

pub mod collection;
pub mod config;
mod error;
pub mod memory;
pub mod metadata;
pub mod obs;
pub mod storage_traits;

pub use collection::Collection;
pub use config::CollectionConfig;
pub use error::{StateError, StorageError};
pub use memory::{MemoryResultsStore, MemoryRunStore};
pub use metadata::{MediaMetadata, MetadataProber, StatProber};
pub use storage_traits::{
    ContentDigest, ResultsRef, ResultsStore, RunConfig, RunRecord, RunResults, RunStore,
    StorageResult, RUN, RUN_RESULTS,
};

/// Result type for dynadoc-state operations
pub type Result<T> = std::result::Result<T, StateError>;
