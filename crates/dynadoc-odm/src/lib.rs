//! dynadoc-odm: dynamic, schema-on-write document model
//!
//! Documents and embedded documents carry a statically declared set of typed
//! fields plus an open set of dynamically added ones. Field types are inferred
//! on first write and stay stable afterwards; attaching a document to a
//! collection merges everything it carries into the collection's schema.
//!
//! ## Key Components
//!
//! - [`FieldDescriptor`]: type tag of one field (scalar, container, structural)
//! - [`FieldSchema`]: ordered `name -> descriptor` mapping
//! - [`SchemaRegistry`]: declared types and their evolving schemas
//! - [`FieldAccess`]: get/set/has/delete contract
//! - [`Document`] / [`EmbeddedDocument`]: the two entity kinds

mod accessor;
mod descriptor;
mod document;
mod embedded;
mod error;
pub mod labels;
pub mod media;
mod registry;
mod schema;
pub mod telemetry;
mod value;

pub use accessor::FieldAccess;
pub use descriptor::{infer_descriptor, EmbeddedSchema, FieldDescriptor, FieldKind};
pub use document::{Document, DocumentId, DocumentSnapshot};
pub use embedded::EmbeddedDocument;
pub use error::OdmError;
pub use media::{get_media_type, MediaType};
pub use registry::{DocumentType, SchemaHandle, SchemaRegistry};
pub use schema::{join_path, FieldSchema};
pub use value::{DocumentRef, Value};

/// Result type for document model operations
pub type Result<T> = std::result::Result<T, OdmError>;
