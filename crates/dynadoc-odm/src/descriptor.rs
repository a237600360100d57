//! Field descriptors
//!
//! A [`FieldDescriptor`] is the type tag of one field. Container descriptors
//! (`List`, `Dict`) always carry exactly one element descriptor and structural
//! descriptors (`Embedded`, `Reference`) always carry exactly one referenced
//! type; both invariants hold by construction.
//!
//! Three operations drive the whole schema machinery:
//!
//! - [`infer_descriptor`]: derive a descriptor from a runtime value
//! - [`FieldDescriptor::reconcile`]: validate a value against an existing
//!   descriptor, returning the descriptor extended with any new nested fields
//! - [`FieldDescriptor::merge`]: commutative union of two descriptors

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::OdmError;
use crate::registry::DocumentType;
use crate::schema::{join_path, FieldSchema};
use crate::value::Value;
use crate::Result;

/// Kind tag of a descriptor, without its nested information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Int,
    Float,
    String,
    Bool,
    Bytes,
    DateTime,
    List,
    Dict,
    Embedded,
    Reference,
}

impl FieldKind {
    pub fn is_scalar(self) -> bool {
        !self.is_container() && !self.is_structural()
    }

    pub fn is_container(self) -> bool {
        matches!(self, FieldKind::List | FieldKind::Dict)
    }

    pub fn is_structural(self) -> bool {
        matches!(self, FieldKind::Embedded | FieldKind::Reference)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::String => "string",
            FieldKind::Bool => "bool",
            FieldKind::Bytes => "bytes",
            FieldKind::DateTime => "datetime",
            FieldKind::List => "list",
            FieldKind::Dict => "dict",
            FieldKind::Embedded => "embedded",
            FieldKind::Reference => "reference",
        };
        f.write_str(s)
    }
}

/// Schema of an embedded document field: the declared type plus every field
/// known for it at this position, defaults and dynamically added ones alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedSchema {
    pub document_type: String,
    pub fields: FieldSchema,
}

/// Type tag of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDescriptor {
    Int,
    Float,
    String,
    Bool,
    Bytes,
    DateTime,
    List(Box<FieldDescriptor>),
    Dict(Box<FieldDescriptor>),
    Embedded(EmbeddedSchema),
    Reference(String),
}

impl FieldDescriptor {
    pub fn list(element: FieldDescriptor) -> Self {
        FieldDescriptor::List(Box::new(element))
    }

    pub fn dict(element: FieldDescriptor) -> Self {
        FieldDescriptor::Dict(Box::new(element))
    }

    /// Embedded descriptor seeded with the type's default fields.
    pub fn embedded(document_type: &DocumentType) -> Self {
        FieldDescriptor::Embedded(EmbeddedSchema {
            document_type: document_type.name().to_string(),
            fields: document_type.default_fields().clone(),
        })
    }

    pub fn reference(document_type: impl Into<String>) -> Self {
        FieldDescriptor::Reference(document_type.into())
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldDescriptor::Int => FieldKind::Int,
            FieldDescriptor::Float => FieldKind::Float,
            FieldDescriptor::String => FieldKind::String,
            FieldDescriptor::Bool => FieldKind::Bool,
            FieldDescriptor::Bytes => FieldKind::Bytes,
            FieldDescriptor::DateTime => FieldKind::DateTime,
            FieldDescriptor::List(_) => FieldKind::List,
            FieldDescriptor::Dict(_) => FieldKind::Dict,
            FieldDescriptor::Embedded(_) => FieldKind::Embedded,
            FieldDescriptor::Reference(_) => FieldKind::Reference,
        }
    }

    /// Element descriptor; present iff this is a list or dict.
    pub fn element(&self) -> Option<&FieldDescriptor> {
        match self {
            FieldDescriptor::List(e) | FieldDescriptor::Dict(e) => Some(e),
            _ => None,
        }
    }

    /// Referenced type name; present iff this is an embedded or reference field.
    pub fn referenced_type(&self) -> Option<&str> {
        match self {
            FieldDescriptor::Embedded(es) => Some(&es.document_type),
            FieldDescriptor::Reference(name) => Some(name),
            _ => None,
        }
    }

    /// Strip one container layer; non-containers are returned unchanged.
    pub fn unwrap_container(&self) -> &FieldDescriptor {
        self.element().unwrap_or(self)
    }

    /// Schema of the embedded type this descriptor leads to, looking through
    /// any number of container layers.
    pub fn nested_schema(&self) -> Option<&FieldSchema> {
        match self {
            FieldDescriptor::List(e) | FieldDescriptor::Dict(e) => e.nested_schema(),
            FieldDescriptor::Embedded(es) => Some(&es.fields),
            _ => None,
        }
    }

    pub fn nested_schema_mut(&mut self) -> Option<&mut FieldSchema> {
        match self {
            FieldDescriptor::List(e) | FieldDescriptor::Dict(e) => e.nested_schema_mut(),
            FieldDescriptor::Embedded(es) => Some(&mut es.fields),
            _ => None,
        }
    }

    /// Validate `value` against this descriptor.
    ///
    /// Returns the descriptor to keep for the field: unchanged for scalars, or
    /// extended with the new nested fields carried by embedded values. Null is
    /// accepted by every descriptor; integers are accepted by float fields.
    pub fn reconcile(&self, value: &Value, path: &str) -> Result<FieldDescriptor> {
        match (self, value) {
            (_, Value::Null)
            | (FieldDescriptor::Int, Value::Int(_))
            | (FieldDescriptor::Float, Value::Float(_) | Value::Int(_))
            | (FieldDescriptor::String, Value::String(_))
            | (FieldDescriptor::Bool, Value::Bool(_))
            | (FieldDescriptor::Bytes, Value::Bytes(_))
            | (FieldDescriptor::DateTime, Value::DateTime(_)) => Ok(self.clone()),
            (FieldDescriptor::List(element), Value::List(items)) => {
                let mut element = element.as_ref().clone();
                for item in items {
                    element = element.reconcile(item, path)?;
                }
                Ok(FieldDescriptor::List(Box::new(element)))
            }
            (FieldDescriptor::Dict(element), Value::Dict(map)) => {
                let mut element = element.as_ref().clone();
                for item in map.values() {
                    element = element.reconcile(item, path)?;
                }
                Ok(FieldDescriptor::Dict(Box::new(element)))
            }
            (FieldDescriptor::Embedded(es), Value::Embedded(doc))
                if doc.document_type().name() == es.document_type =>
            {
                let mut fields = es.fields.clone();
                for (name, declared) in doc.local_schema().iter() {
                    let field_path = join_path(path, name);
                    let has_value = doc.stored(name).is_some_and(|v| !v.is_null());
                    let merged = match fields.lookup(name) {
                        // The value is checked against the existing descriptor below.
                        Some(_) if has_value => continue,
                        Some(existing) => existing.merge(declared, &field_path)?,
                        None => declared.clone(),
                    };
                    fields.upsert(name, merged);
                }
                for (name, item) in doc.values() {
                    let field_path = join_path(path, name);
                    let descriptor = match fields.lookup(name) {
                        Some(existing) => existing.reconcile(item, &field_path)?,
                        None if item.is_null() => continue,
                        None => infer_descriptor(item, &field_path)?,
                    };
                    fields.upsert(name, descriptor);
                }
                Ok(FieldDescriptor::Embedded(EmbeddedSchema {
                    document_type: es.document_type.clone(),
                    fields,
                }))
            }
            (FieldDescriptor::Reference(name), Value::Reference(r)) if *name == r.document_type => {
                Ok(self.clone())
            }
            _ => Err(OdmError::FieldTypeMismatch {
                path: path.to_string(),
                expected: self.to_string(),
                actual: value.kind_name(),
            }),
        }
    }

    /// Union of two descriptors for the same path.
    ///
    /// Commutative: `a.merge(b) == b.merge(a)` whenever either succeeds.
    /// Different kinds or different referenced types are a conflict.
    pub fn merge(&self, incoming: &FieldDescriptor, path: &str) -> Result<FieldDescriptor> {
        match (self, incoming) {
            (FieldDescriptor::List(a), FieldDescriptor::List(b)) => {
                Ok(FieldDescriptor::List(Box::new(a.merge(b, path)?)))
            }
            (FieldDescriptor::Dict(a), FieldDescriptor::Dict(b)) => {
                Ok(FieldDescriptor::Dict(Box::new(a.merge(b, path)?)))
            }
            (FieldDescriptor::Embedded(a), FieldDescriptor::Embedded(b))
                if a.document_type == b.document_type =>
            {
                Ok(FieldDescriptor::Embedded(EmbeddedSchema {
                    document_type: a.document_type.clone(),
                    fields: a.fields.merged(&b.fields, path)?,
                }))
            }
            (a, b) if a.kind().is_scalar() && a == b => Ok(a.clone()),
            (FieldDescriptor::Reference(a), FieldDescriptor::Reference(b)) if a == b => {
                Ok(self.clone())
            }
            _ => Err(OdmError::SchemaConflict {
                path: path.to_string(),
                existing: self.to_string(),
                incoming: incoming.to_string(),
            }),
        }
    }

    /// Bring a value that already passed [`reconcile`](Self::reconcile) into
    /// the stored form for this descriptor (integers widen to floats).
    pub fn conform(&self, value: Value) -> Value {
        match (self, value) {
            (FieldDescriptor::Float, Value::Int(i)) => Value::Float(i as f64),
            (FieldDescriptor::List(element), Value::List(items)) => {
                Value::List(items.into_iter().map(|v| element.conform(v)).collect())
            }
            (FieldDescriptor::Dict(element), Value::Dict(map)) => Value::Dict(
                map.into_iter()
                    .map(|(k, v)| (k, element.conform(v)))
                    .collect(),
            ),
            (FieldDescriptor::Embedded(es), Value::Embedded(mut doc)) => {
                doc.conform_to(&es.fields);
                Value::Embedded(doc)
            }
            (_, value) => value,
        }
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDescriptor::List(e) => write!(f, "list<{e}>"),
            FieldDescriptor::Dict(e) => write!(f, "dict<{e}>"),
            FieldDescriptor::Embedded(es) => write!(f, "embedded<{}>", es.document_type),
            FieldDescriptor::Reference(name) => write!(f, "reference<{name}>"),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Infer a descriptor from a value's runtime shape.
///
/// Fails closed with [`OdmError::UnsupportedValue`] when the shape carries no
/// type information (null, empty containers) or when a container mixes
/// element kinds. Integers and floats in the same container widen to float.
pub fn infer_descriptor(value: &Value, path: &str) -> Result<FieldDescriptor> {
    match value {
        Value::Null => Err(unsupported(path, "a null value has no type")),
        Value::Int(_) => Ok(FieldDescriptor::Int),
        Value::Float(_) => Ok(FieldDescriptor::Float),
        Value::String(_) => Ok(FieldDescriptor::String),
        Value::Bool(_) => Ok(FieldDescriptor::Bool),
        Value::Bytes(_) => Ok(FieldDescriptor::Bytes),
        Value::DateTime(_) => Ok(FieldDescriptor::DateTime),
        Value::List(items) => Ok(FieldDescriptor::list(infer_element(items.iter(), path)?)),
        Value::Dict(map) => Ok(FieldDescriptor::dict(infer_element(map.values(), path)?)),
        Value::Embedded(doc) => FieldDescriptor::Embedded(EmbeddedSchema {
            document_type: doc.document_type().name().to_string(),
            fields: FieldSchema::new(),
        })
        .reconcile(value, path),
        Value::Reference(r) => Ok(FieldDescriptor::Reference(r.document_type.clone())),
    }
}

fn infer_element<'a>(
    items: impl Iterator<Item = &'a Value>,
    path: &str,
) -> Result<FieldDescriptor> {
    let mut element: Option<FieldDescriptor> = None;
    for item in items.filter(|v| !v.is_null()) {
        let inferred = infer_descriptor(item, path)?;
        element = Some(match element {
            None => inferred,
            Some(FieldDescriptor::Int) if inferred == FieldDescriptor::Float => inferred,
            Some(FieldDescriptor::Float) if inferred == FieldDescriptor::Int => {
                FieldDescriptor::Float
            }
            Some(current) => current.merge(&inferred, path).map_err(|_| {
                unsupported(
                    path,
                    &format!("container mixes element kinds {current} and {inferred}"),
                )
            })?,
        });
    }
    element.ok_or_else(|| unsupported(path, "an empty container has no element type"))
}

fn unsupported(path: &str, reason: &str) -> OdmError {
    OdmError::UnsupportedValue {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}
