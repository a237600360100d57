//! Collection-level schema behaviour for samples with embedded documents.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use dynadoc_odm::labels;
use dynadoc_odm::{
    Document, EmbeddedDocument, FieldAccess, FieldDescriptor, FieldKind, OdmError, SchemaRegistry,
    Value,
};
use dynadoc_state::{
    Collection, CollectionConfig, MediaMetadata, MetadataProber, StatProber, StateError,
};
use indexmap::IndexMap;

fn dataset(name: &str) -> Collection {
    let registry = Arc::new(SchemaRegistry::with_builtins());
    Collection::new(CollectionConfig::new(name), registry).unwrap()
}

fn sample() -> Document {
    Document::new(labels::sample_type())
        .with_field("filepath", "/path/to/image.jpg")
        .unwrap()
}

fn assert_field(collection: &Collection, path: &str, kind: FieldKind) {
    let schema = collection.get_field_schema();
    let descriptor = schema
        .get_path(path)
        .unwrap_or_else(|| panic!("no field at {path}"));
    assert_eq!(descriptor.kind(), kind, "kind of {path}");
}

#[test]
fn classification_defaults_visible_through_dynamic_field() {
    let dataset = dataset("classification_defaults");
    let doc = sample()
        .with_field("label", EmbeddedDocument::new(labels::classification_type()))
        .unwrap();
    dataset.add(doc).unwrap();

    assert_eq!(
        dataset.get_field_schema()["label.confidence"],
        FieldDescriptor::Float
    );
}

#[test]
fn change_value_through_collection_update() {
    let dataset = dataset("change_value");
    let id = dataset
        .add(
            sample()
                .with_field("field", EmbeddedDocument::new(labels::label_type()))
                .unwrap(),
        )
        .unwrap();

    dataset
        .update(&id, |doc| {
            let field = doc.embedded_mut("field")?;
            field.set("int", 51)?;
            field.set("int", 52)
        })
        .unwrap();

    let snapshot = dataset.get(&id).unwrap();
    let field = snapshot["field"].as_embedded().unwrap();
    assert_eq!(field["int"], Value::Int(52));
    assert_eq!(field.get_field("int").unwrap(), &Value::Int(52));
    assert_eq!(field.get("int"), Some(&Value::Int(52)));

    let err = dataset
        .update(&id, |doc| doc.embedded_mut("field")?.set("int", "string"))
        .unwrap_err();
    assert!(matches!(
        err,
        StateError::Odm(OdmError::FieldTypeMismatch { .. })
    ));
    assert_eq!(
        dataset.get(&id).unwrap()["field"].as_embedded().unwrap()["int"],
        Value::Int(52)
    );
    assert_field(&dataset, "field.int", FieldKind::Int);
}

#[test]
fn list_element_field_reaches_collection_schema() {
    let dataset = dataset("lists");
    let test = labels::detections(vec![
        labels::detection("cat", [0.0, 0.0, 1.0, 1.0]).unwrap()
    ])
    .unwrap();
    let id = dataset
        .add(sample().with_field("test", test).unwrap())
        .unwrap();

    dataset
        .update(&id, |doc| {
            doc.embedded_mut("test")?
                .list_element_mut("detections", 0)?
                .set("tp", true)
        })
        .unwrap();

    let schema = dataset.get_field_schema();
    assert!(schema
        .nested_schema("test")
        .unwrap()
        .nested_schema("detections")
        .unwrap()
        .contains("tp"));
    assert_field(&dataset, "test.detections.tp", FieldKind::Bool);
}

#[test]
fn expansion_through_reassignment() {
    let dataset = dataset("expansion");
    let id = dataset.add(sample()).unwrap();

    dataset
        .update(&id, |doc| {
            doc.set("test", EmbeddedDocument::new(labels::label_type()))?;
            doc.set(
                "test",
                EmbeddedDocument::new(labels::label_type()).with_field("attr", "value")?,
            )
        })
        .unwrap();

    assert_field(&dataset, "test", FieldKind::Embedded);
    assert_field(&dataset, "test.attr", FieldKind::String);
}

#[test]
fn default_fields_of_embedded_types() {
    let dataset = dataset("default_fields");

    // singles
    dataset
        .add_sample_field(
            "test_default",
            FieldDescriptor::embedded(&labels::classification_type()),
        )
        .unwrap();
    assert_field(&dataset, "test_default.confidence", FieldKind::Float);

    let id = dataset
        .add(
            sample()
                .with_field(
                    "test_catch_default",
                    EmbeddedDocument::new(labels::classification_type()),
                )
                .unwrap(),
        )
        .unwrap();
    assert_field(&dataset, "test_catch_default.confidence", FieldKind::Float);

    dataset
        .update(&id, |doc| {
            doc.set(
                "test_set_default",
                EmbeddedDocument::new(labels::classification_type()),
            )
        })
        .unwrap();
    assert_field(&dataset, "test_set_default.confidence", FieldKind::Float);

    // lists
    dataset
        .add_sample_field(
            "test_list_default",
            FieldDescriptor::embedded(&labels::classifications_type()),
        )
        .unwrap();
    assert_field(
        &dataset,
        "test_list_default.classifications.confidence",
        FieldKind::Float,
    );

    let id = dataset
        .add(
            sample()
                .with_field(
                    "test_catch_list_default",
                    EmbeddedDocument::new(labels::classifications_type()),
                )
                .unwrap(),
        )
        .unwrap();
    assert_field(
        &dataset,
        "test_catch_list_default.classifications.confidence",
        FieldKind::Float,
    );

    dataset
        .update(&id, |doc| {
            doc.set(
                "test_set_list_default",
                EmbeddedDocument::new(labels::classifications_type()),
            )
        })
        .unwrap();
    assert_field(
        &dataset,
        "test_set_list_default.classifications.confidence",
        FieldKind::Float,
    );
}

#[test]
fn add_sample_field_conflicts_with_existing_kind() {
    let dataset = dataset("add_field_conflict");
    dataset
        .add(sample().with_field("score", 0.5).unwrap())
        .unwrap();

    let err = dataset
        .add_sample_field("score", FieldDescriptor::String)
        .unwrap_err();
    assert!(matches!(err, StateError::Odm(OdmError::SchemaConflict { .. })));
    assert_field(&dataset, "score", FieldKind::Float);

    dataset
        .add_sample_field("score", FieldDescriptor::Float)
        .unwrap();
}

#[test]
fn snapshots_reflect_committed_values() {
    let dataset = dataset("snapshots");
    let id = dataset.add(sample()).unwrap();
    let before = dataset.get(&id).unwrap();

    dataset.update(&id, |doc| doc.set("later", 1)).unwrap();

    assert!(before.values().all(|(name, _)| name != "later"));
    assert!(!before.has_field("later"));
    assert!(!before.is_attached());
    assert_eq!(dataset.get(&id).unwrap()["later"], Value::Int(1));
    assert_eq!(dataset.snapshots().len(), 1);
}

#[test]
fn cloned_snapshot_does_not_write_to_collection() {
    let dataset = dataset("escaped_clone");
    let id = dataset
        .add(
            sample()
                .with_field("field", EmbeddedDocument::new(labels::label_type()))
                .unwrap(),
        )
        .unwrap();

    let mut escaped = Document::clone(&dataset.get(&id).unwrap());
    assert!(!escaped.is_attached());
    escaped.set("ghost", 1).unwrap();
    escaped.embedded_mut("field").unwrap().set("ghost", 1).unwrap();

    let schema = dataset.get_field_schema();
    assert!(!schema.contains("ghost"));
    assert!(schema.get_path("field.ghost").is_none());
    assert!(!dataset.get(&id).unwrap().has_field("ghost"));
}

#[test]
fn int_valued_sample_joins_float_field() {
    let dataset = dataset("int_into_float");
    dataset
        .add(sample().with_field("score", 0.5).unwrap())
        .unwrap();
    let id = dataset
        .add(sample().with_field("score", 1).unwrap())
        .unwrap();

    assert_field(&dataset, "score", FieldKind::Float);
    assert_eq!(dataset.get(&id).unwrap()["score"], Value::Float(1.0));

    let err = dataset
        .add(sample().with_field("score", "high").unwrap())
        .unwrap_err();
    assert!(matches!(err, StateError::Odm(OdmError::SchemaConflict { .. })));
}

#[test]
fn dict_element_field_reaches_collection_schema() {
    let dataset = dataset("dicts");
    let mut preds = IndexMap::new();
    preds.insert(
        "resnet".to_string(),
        labels::classification("cat").unwrap(),
    );
    preds.insert("vit".to_string(), labels::classification("dog").unwrap());
    let id = dataset
        .add(sample().with_field("preds", preds).unwrap())
        .unwrap();

    dataset
        .update(&id, |doc| {
            doc.dict_value_mut("preds", "vit")?.set("logits", vec![0.1, 0.9])
        })
        .unwrap();

    let schema = dataset.get_field_schema();
    assert_eq!(schema["preds"].kind(), FieldKind::Dict);
    assert!(schema.nested_schema("preds").unwrap().contains("logits"));
    assert_field(&dataset, "preds.logits", FieldKind::List);
    assert_field(&dataset, "preds.confidence", FieldKind::Float);

    let snapshot = dataset.get(&id).unwrap();
    let resnet = snapshot["preds"].as_dict().unwrap()["resnet"]
        .as_embedded()
        .unwrap();
    assert!(resnet.has_field("logits"));
    assert!(resnet["logits"].is_null());
}

#[tokio::test]
async fn metadata_fields_from_stat_prober() {
    let dataset = dataset("metadata_stat");
    assert_field(&dataset, "metadata.size_bytes", FieldKind::Int);
    assert_field(&dataset, "metadata.mime_type", FieldKind::String);

    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("image.jpg");
    let mut file = std::fs::File::create(&image_path).unwrap();
    file.write_all(&[0xFFu8; 2048]).unwrap();
    drop(file);

    let id = dataset
        .add(
            Document::new(labels::sample_type())
                .with_field("filepath", image_path.to_str().unwrap())
                .unwrap(),
        )
        .unwrap();
    assert_eq!(dataset.compute_metadata(&StatProber).await.unwrap(), 1);

    let snapshot = dataset.get(&id).unwrap();
    let metadata = snapshot["metadata"].as_embedded().unwrap();
    assert_eq!(metadata["size_bytes"], Value::Int(2048));
    assert_eq!(metadata["mime_type"].as_str(), Some("image/jpeg"));

    assert_field(&dataset, "metadata.num_channels", FieldKind::Int);
    assert_field(&dataset, "metadata.width", FieldKind::Int);
    assert_field(&dataset, "metadata.height", FieldKind::Int);
}

struct FixedProber;

#[async_trait]
impl MetadataProber for FixedProber {
    async fn probe(&self, filepath: &str) -> dynadoc_state::Result<MediaMetadata> {
        if filepath.contains("broken") {
            return Err(StateError::Metadata {
                filepath: filepath.to_string(),
                reason: "unreadable".to_string(),
            });
        }
        Ok(MediaMetadata {
            size_bytes: 1,
            mime_type: Some("image/png".to_string()),
            width: Some(640),
            height: Some(480),
            num_channels: Some(3),
        })
    }
}

#[tokio::test]
async fn metadata_from_custom_prober() {
    let dataset = dataset("metadata_custom");
    let ids = dataset
        .add_many([
            Document::new(labels::sample_type())
                .with_field("filepath", "/a.png")
                .unwrap(),
            Document::new(labels::sample_type())
                .with_field("filepath", "/b.png")
                .unwrap(),
        ])
        .unwrap();

    assert_eq!(dataset.compute_metadata(&FixedProber).await.unwrap(), 2);
    for id in &ids {
        let snapshot = dataset.get(id).unwrap();
        let metadata = snapshot["metadata"].as_embedded().unwrap();
        assert_eq!(metadata["width"], Value::Int(640));
        assert_eq!(metadata["num_channels"], Value::Int(3));
    }
}

#[tokio::test]
async fn metadata_failure_writes_nothing() {
    let dataset = dataset("metadata_failure");
    let ids = dataset
        .add_many([
            Document::new(labels::sample_type())
                .with_field("filepath", "/ok.png")
                .unwrap(),
            Document::new(labels::sample_type())
                .with_field("filepath", "/broken.png")
                .unwrap(),
        ])
        .unwrap();

    let err = dataset.compute_metadata(&FixedProber).await.unwrap_err();
    assert!(matches!(err, StateError::Metadata { .. }));
    for id in &ids {
        assert!(dataset.get(id).unwrap()["metadata"].is_null());
    }
}
