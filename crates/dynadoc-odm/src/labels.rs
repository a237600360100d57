//! Built-in document types
//!
//! Samples, media metadata and the common label types, each declared with the
//! default fields it carries at definition time.

use crate::descriptor::FieldDescriptor;
use crate::embedded::EmbeddedDocument;
use crate::registry::DocumentType;
use crate::schema::FieldSchema;
use crate::value::Value;
use crate::Result;

pub const SAMPLE: &str = "Sample";
pub const METADATA: &str = "Metadata";
pub const IMAGE_METADATA: &str = "ImageMetadata";
pub const LABEL: &str = "Label";
pub const CLASSIFICATION: &str = "Classification";
pub const CLASSIFICATIONS: &str = "Classifications";
pub const DETECTION: &str = "Detection";
pub const DETECTIONS: &str = "Detections";

fn metadata_fields() -> FieldSchema {
    FieldSchema::new()
        .with_field("size_bytes", FieldDescriptor::Int)
        .with_field("mime_type", FieldDescriptor::String)
}

/// Media-agnostic metadata.
pub fn metadata_type() -> DocumentType {
    DocumentType::new(METADATA, metadata_fields())
}

/// Image metadata, the type of every sample's `metadata` field.
pub fn image_metadata_type() -> DocumentType {
    DocumentType::new(
        IMAGE_METADATA,
        metadata_fields()
            .with_field("width", FieldDescriptor::Int)
            .with_field("height", FieldDescriptor::Int)
            .with_field("num_channels", FieldDescriptor::Int),
    )
}

pub fn sample_type() -> DocumentType {
    DocumentType::new(
        SAMPLE,
        FieldSchema::new()
            .with_field("filepath", FieldDescriptor::String)
            .with_field("tags", FieldDescriptor::list(FieldDescriptor::String))
            .with_field("metadata", FieldDescriptor::embedded(&image_metadata_type())),
    )
}

/// Base label with no declared fields; everything on it is dynamic.
pub fn label_type() -> DocumentType {
    DocumentType::new(LABEL, FieldSchema::new())
}

pub fn classification_type() -> DocumentType {
    DocumentType::new(
        CLASSIFICATION,
        FieldSchema::new()
            .with_field("label", FieldDescriptor::String)
            .with_field("confidence", FieldDescriptor::Float),
    )
}

pub fn classifications_type() -> DocumentType {
    DocumentType::new(
        CLASSIFICATIONS,
        FieldSchema::new().with_field(
            "classifications",
            FieldDescriptor::list(FieldDescriptor::embedded(&classification_type())),
        ),
    )
}

pub fn detection_type() -> DocumentType {
    DocumentType::new(
        DETECTION,
        FieldSchema::new()
            .with_field("label", FieldDescriptor::String)
            .with_field("bounding_box", FieldDescriptor::list(FieldDescriptor::Float))
            .with_field("confidence", FieldDescriptor::Float),
    )
}

pub fn detections_type() -> DocumentType {
    DocumentType::new(
        DETECTIONS,
        FieldSchema::new().with_field(
            "detections",
            FieldDescriptor::list(FieldDescriptor::embedded(&detection_type())),
        ),
    )
}

pub fn builtin_types() -> Vec<DocumentType> {
    vec![
        sample_type(),
        metadata_type(),
        image_metadata_type(),
        label_type(),
        classification_type(),
        classifications_type(),
        detection_type(),
        detections_type(),
    ]
}

/// `Classification` with the given label.
pub fn classification(label: &str) -> Result<EmbeddedDocument> {
    EmbeddedDocument::new(classification_type()).with_field("label", label)
}

/// `Classifications` wrapping the given classifications.
pub fn classifications(items: Vec<EmbeddedDocument>) -> Result<EmbeddedDocument> {
    EmbeddedDocument::new(classifications_type()).with_field("classifications", items)
}

/// `Detection` with a label and a `[x, y, w, h]` box in relative coordinates.
pub fn detection(label: &str, bounding_box: [f64; 4]) -> Result<EmbeddedDocument> {
    EmbeddedDocument::new(detection_type())
        .with_field("label", label)?
        .with_field("bounding_box", Value::from(bounding_box.to_vec()))
}

/// `Detections` wrapping the given detections.
pub fn detections(items: Vec<EmbeddedDocument>) -> Result<EmbeddedDocument> {
    EmbeddedDocument::new(detections_type()).with_field("detections", items)
}
