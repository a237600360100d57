//! Runtime field values
//!
//! A [`Value`] is the tagged variant stored in every document's field map.
//! Serialization is externally tagged so the kind of each value survives a
//! round trip through any serde format.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::document::DocumentId;
use crate::embedded::EmbeddedDocument;

/// Pointer to a document stored out of line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Name of the referenced document type
    pub document_type: String,
    /// Identity of the referenced document
    pub id: DocumentId,
}

impl DocumentRef {
    pub fn new(document_type: impl Into<String>, id: DocumentId) -> Self {
        Self {
            document_type: document_type.into(),
            id,
        }
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
    Dict(IndexMap<String, Value>),
    Embedded(EmbeddedDocument),
    Reference(DocumentRef),
}

/// Shared `Null` returned for declared fields that hold no value.
pub(crate) static NULL: Value = Value::Null;

impl Value {
    /// Human-readable kind, used in error messages.
    pub fn kind_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Bytes(_) => "bytes".to_string(),
            Value::DateTime(_) => "datetime".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Dict(_) => "dict".to_string(),
            Value::Embedded(doc) => format!("embedded<{}>", doc.document_type().name()),
            Value::Reference(r) => format!("reference<{}>", r.document_type),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float view; integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Dict(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_embedded(&self) -> Option<&EmbeddedDocument> {
        match self {
            Value::Embedded(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&DocumentRef> {
        match self {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// Visit every embedded document reachable from this value, descending
    /// through lists and dicts but not into the embedded documents themselves.
    pub(crate) fn for_each_embedded_mut(&mut self, f: &mut dyn FnMut(&mut EmbeddedDocument)) {
        match self {
            Value::Embedded(doc) => f(doc),
            Value::List(items) => items.iter_mut().for_each(|v| v.for_each_embedded_mut(f)),
            Value::Dict(map) => map.values_mut().for_each(|v| v.for_each_embedded_mut(f)),
            _ => {}
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<EmbeddedDocument> for Value {
    fn from(v: EmbeddedDocument) -> Self {
        Value::Embedded(v)
    }
}

impl From<DocumentRef> for Value {
    fn from(v: DocumentRef) -> Self {
        Value::Reference(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<IndexMap<String, T>> for Value {
    fn from(map: IndexMap<String, T>) -> Self {
        Value::Dict(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
