//! Data model for a migration run.
//!
//! Everything here is either fetched fresh from the repository per run or
//! threaded through one run and discarded; nothing is cached across runs.
//! Field payloads are closed tagged unions keyed by the schema's field type,
//! so the transformer can match exhaustively instead of duck-typing untyped
//! dictionaries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Deterministic codename for the migrated counterpart of a source item.
///
/// Re-running a migration against the same source is safe because this name
/// never changes; the pre-creation existence probe keys off it.
pub fn migrated_codename(source_codename: &str) -> String {
    format!("{source_codename}_migrated")
}

/// The fixed field-type enumeration the remote repository exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    RichText,
    UrlSlug,
    Number,
    DateTime,
    Asset,
    MultipleChoice,
    Taxonomy,
    ModularContent,
    Guidelines,
    #[serde(other)]
    Unknown,
}

impl FieldType {
    /// Linked-content fields carry references to other items.
    pub fn is_reference_bearing(self) -> bool {
        matches!(self, Self::ModularContent)
    }
}

/// One typed field (element) of a content type schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(default)]
    pub id: String,
    /// Guidelines elements may arrive without one from the management API.
    #[serde(default)]
    pub codename: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub is_required: bool,
}

/// A content type schema, re-fetched per migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTypeInfo {
    #[serde(default)]
    pub id: String,
    pub codename: String,
    #[serde(default)]
    pub name: String,
    pub elements: Vec<FieldSchema>,
}

impl ContentTypeInfo {
    pub fn element(&self, codename: &str) -> Option<&FieldSchema> {
        self.elements.iter().find(|e| e.codename == codename)
    }
}

/// One source-field mapping, produced by the (out-of-scope) mapping editor.
/// Read-only to the engine; `target_field: None` means "drop this field".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_field: FieldSchema,
    pub target_field: Option<FieldSchema>,
    #[serde(default)]
    pub transformation_needed: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Lightweight reference to a source content item. Selected items are the
/// seed set; auto-discovered items are synthesized into the same shape and
/// merged by id, so each item migrates at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationItem {
    pub id: String,
    pub name: String,
    pub codename: String,
    pub type_codename: String,
}

/// Append-only registry entry: one per item the migrator creates or resolves
/// during a run. Threaded through the run explicitly, never stored on a
/// long-lived service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedItemInfo {
    pub original_codename: String,
    pub original_name: String,
    pub original_type: String,
    pub new_codename: String,
    pub new_name: String,
    pub new_type: String,
    pub new_id: String,
    /// Pulled in transitively through reference-following rather than
    /// directly selected.
    pub was_auto_migrated: bool,
    /// A prior run already produced this migrated codename; nothing was
    /// written this run.
    pub already_existed: bool,
}

/// Aggregate counts over the created-items registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub total: usize,
    pub main: usize,
    pub auto_migrated: usize,
    pub created: usize,
    pub already_existed: usize,
}

impl RegistrySummary {
    pub fn tally(registry: &[CreatedItemInfo]) -> Self {
        let mut summary = Self {
            total: registry.len(),
            ..Self::default()
        };
        for entry in registry {
            if entry.was_auto_migrated {
                summary.auto_migrated += 1;
            } else {
                summary.main += 1;
            }
            if entry.already_existed {
                summary.already_existed += 1;
            } else {
                summary.created += 1;
            }
        }
        summary
    }
}

/// Closed runtime value of one element, classified by the schema field type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    DateTime(Option<String>),
    /// Linked-item codenames, in order.
    References(Vec<String>),
    /// Opaque ordered payloads (assets, choices, taxonomy terms).
    Sequence(Vec<serde_json::Value>),
    Missing,
}

impl FieldValue {
    /// Classify a raw wire value under its schema field type.
    pub fn classify(field_type: FieldType, value: serde_json::Value) -> Self {
        use serde_json::Value;
        match field_type {
            FieldType::Text | FieldType::RichText | FieldType::UrlSlug | FieldType::Guidelines => {
                match value {
                    Value::String(s) => Self::Text(s),
                    Value::Null => Self::Missing,
                    other => Self::Text(other.to_string()),
                }
            }
            FieldType::Number => match value {
                Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Missing),
                _ => Self::Missing,
            },
            FieldType::DateTime => match value {
                Value::String(s) => Self::DateTime(Some(s)),
                _ => Self::Missing,
            },
            FieldType::ModularContent => match value {
                Value::Array(items) => Self::References(
                    items
                        .into_iter()
                        .filter_map(|v| match v {
                            Value::String(codename) => Some(codename),
                            _ => None,
                        })
                        .collect(),
                ),
                _ => Self::Missing,
            },
            FieldType::Asset | FieldType::MultipleChoice | FieldType::Taxonomy => match value {
                Value::Array(items) => Self::Sequence(items),
                _ => Self::Missing,
            },
            FieldType::Unknown => Self::Missing,
        }
    }
}

/// One element of a fetched item: display name, schema type, classified value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementData {
    pub name: String,
    pub field_type: FieldType,
    pub value: FieldValue,
}

#[derive(Deserialize)]
struct WireElement {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    field_type: FieldType,
    #[serde(default)]
    value: serde_json::Value,
}

impl<'de> Deserialize<'de> for ElementData {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = WireElement::deserialize(deserializer)?;
        Ok(ElementData {
            value: FieldValue::classify(wire.field_type, wire.value),
            name: wire.name,
            field_type: wire.field_type,
        })
    }
}

/// System metadata of a delivered item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSystem {
    pub id: String,
    pub name: String,
    pub codename: String,
    #[serde(rename = "type")]
    pub type_codename: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// Full element data for one item in one language, as read from the delivery
/// side. `linked_items` holds the one-level expansion payload when fetched
/// with depth 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub system: ItemSystem,
    pub elements: BTreeMap<String, ElementData>,
    #[serde(default)]
    pub linked_items: BTreeMap<String, ItemSystem>,
}

/// Management-side view of an item shell; reference fields store ids, and the
/// write API resolves codenames through this shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedItem {
    pub id: String,
    pub name: String,
    pub codename: String,
    pub type_id: String,
}

/// Management-side view of a language variant's current element list.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedVariant {
    pub item_id: String,
    pub elements: Vec<VariantElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantElement {
    pub element_id: String,
    pub value: serde_json::Value,
}

impl ManagedVariant {
    pub fn element(&self, element_id: &str) -> Option<&VariantElement> {
        self.elements.iter().find(|e| e.element_id == element_id)
    }
}

/// How a write-side element payload addresses its schema element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ElementRef {
    ByCodename { codename: String },
    ById { id: String },
}

/// Write-side element value; the upsert accepts partial lists, so a single
/// payload can update one field without resending the rest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementPayload {
    pub element: ElementRef,
    pub value: serde_json::Value,
}

impl ElementPayload {
    pub fn by_codename(codename: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            element: ElementRef::ByCodename {
                codename: codename.into(),
            },
            value,
        }
    }

    pub fn by_id(id: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            element: ElementRef::ById { id: id.into() },
            value,
        }
    }

    pub fn codename(&self) -> Option<&str> {
        match &self.element {
            ElementRef::ByCodename { codename } => Some(codename),
            ElementRef::ById { .. } => None,
        }
    }
}

/// An item referenced from a linked-content field, as seen in the expansion
/// payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedItem {
    pub id: String,
    pub name: String,
    pub codename: String,
    pub type_codename: String,
}

/// One outgoing linked-content field and the items it points to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipInfo {
    pub field_name: String,
    pub field_type: FieldType,
    pub related_items: Vec<RelatedItem>,
}

/// A reference from some other item pointing at the item being examined.
/// `field` is the exact element codename holding the reference, not the
/// display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingRelationship {
    pub from_item_id: String,
    pub from_item_name: String,
    pub from_item_codename: String,
    pub from_item_type: String,
    pub field: String,
    pub language: String,
    pub needs_language_variant: bool,
}

/// Discovered relationship graph entry for one item. Built fresh per run,
/// read-only to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRelationship {
    pub item_id: String,
    pub item_name: String,
    pub item_codename: String,
    pub item_type: String,
    pub outgoing: Vec<RelationshipInfo>,
    pub incoming: Vec<IncomingRelationship>,
}

/// A newly created (or reference-rewritten) item still in the draft workflow
/// step, eligible for batch publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftItem {
    pub id: String,
    pub name: String,
    pub codename: String,
    pub type_codename: String,
    pub language: String,
    pub was_auto_migrated: bool,
}
