//! Metadata schema attached to a process
//!
//! A schema is an ordered list of field definitions. On the wire each field is a flat
//! object (`{"name", "type", "required", "options"}`); in memory the field type is a
//! closed enum so every consumer dispatches with a single match.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Free-form instance metadata, keyed by field name
pub type MetadataValues = serde_json::Map<String, serde_json::Value>;

/// Input kind of a metadata field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Textarea,
    Number,
    /// Choice among options, kept in schema order
    Select { options: Vec<String> },
}

impl FieldKind {
    /// Name used on the wire and in listings
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Textarea => "textarea",
            FieldKind::Number => "number",
            FieldKind::Select { .. } => "select",
        }
    }
}

/// One field of a process's metadata schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawField", into = "RawField")]
pub struct FieldDefinition {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, kind: FieldKind, required: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            required,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawFieldType {
    Text,
    Textarea,
    Number,
    Select,
}

#[derive(Serialize, Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    field_type: RawFieldType,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    options: Option<Vec<String>>,
}

impl From<RawField> for FieldDefinition {
    fn from(raw: RawField) -> Self {
        let kind = match raw.field_type {
            RawFieldType::Text => FieldKind::Text,
            RawFieldType::Textarea => FieldKind::Textarea,
            RawFieldType::Number => FieldKind::Number,
            RawFieldType::Select => FieldKind::Select {
                options: raw.options.unwrap_or_default(),
            },
        };
        FieldDefinition {
            name: raw.name,
            kind,
            required: raw.required,
        }
    }
}

impl From<FieldDefinition> for RawField {
    fn from(field: FieldDefinition) -> Self {
        let (field_type, options) = match field.kind {
            FieldKind::Text => (RawFieldType::Text, Vec::new()),
            FieldKind::Textarea => (RawFieldType::Textarea, Vec::new()),
            FieldKind::Number => (RawFieldType::Number, Vec::new()),
            FieldKind::Select { options } => (RawFieldType::Select, options),
        };
        RawField {
            name: field.name,
            field_type,
            required: field.required,
            options: Some(options),
        }
    }
}

/// Ordered field list of a process, serialized as `{"fields": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSchema {
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

impl MetadataSchema {
    pub fn new(fields: Vec<FieldDefinition>) -> Self {
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names must be non-empty and unique within the schema
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err("Metadata field name must not be empty".to_string());
            }
            if !seen.insert(field.name.as_str()) {
                return Err(format!("Duplicate metadata field name '{}'", field.name));
            }
        }
        Ok(())
    }
}
