//! Structured observability hooks for collection and run lifecycle events.
//!
//! Events are emitted at `info!` level with a fixed `event` key so they can be
//! filtered through `RUST_LOG`. For JSON output, set `DYNADOC_LOG_FORMAT=json`
//! and initialise with `dynadoc_odm::telemetry::init_from_env`.

use tracing::info;

/// RAII guard that enters a collection-scoped tracing span.
pub struct CollectionSpan {
    _span: tracing::span::EnteredSpan,
}

impl CollectionSpan {
    pub fn enter(collection: &str) -> Self {
        let span = tracing::info_span!("dynadoc.collection", collection = %collection);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: sample attached to a collection.
///
/// ```ignore
/// emit_sample_added("quickstart", "4f1c...", 3);
/// // logs: event=collection.sample_added collection=quickstart sample_id=4f1c... fields=3
/// ```
pub fn emit_sample_added(collection: &str, sample_id: &str, fields: usize) {
    info!(
        event = "collection.sample_added",
        collection = %collection,
        sample_id = %sample_id,
        fields = fields,
    );
}

pub fn emit_sample_removed(collection: &str, sample_id: &str) {
    info!(event = "collection.sample_removed", collection = %collection, sample_id = %sample_id);
}

/// Emit event: a field was declared explicitly on a collection schema.
pub fn emit_field_merged(collection: &str, path: &str, descriptor: &dyn std::fmt::Display) {
    info!(
        event = "schema.field_merged",
        collection = %collection,
        path = %path,
        descriptor = %descriptor,
    );
}

pub fn emit_field_deleted(collection: &str, path: &str) {
    info!(event = "schema.field_deleted", collection = %collection, path = %path);
}

pub fn emit_run_created(key: &str, stages: usize) {
    info!(event = "run.created", run_key = %key, stages = stages);
}

pub fn emit_results_attached(key: &str, digest: &str) {
    info!(event = "run.results_attached", run_key = %key, digest = %digest);
}

pub fn emit_run_deleted(key: &str) {
    info!(event = "run.deleted", run_key = %key);
}

/// Emit event: results blob left behind after a failed attach (warning level).
pub fn emit_orphan_cleanup_error(key: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "run.orphan_cleanup_error", run_key = %key, error = %error);
}
