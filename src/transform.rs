//! Pure field transformation.
//!
//! Maps a source element's runtime value to the shape a target field expects,
//! and supplies schema-appropriate defaults for unmapped target fields so the
//! write API never receives a payload missing required elements. No I/O,
//! deterministic, exhaustive over the field-type enum.

use serde_json::{json, Value};

use crate::logging::RunLog;
use crate::types::{
    ContentTypeInfo, ElementData, ElementPayload, FieldMapping, FieldSchema, FieldType, FieldValue,
};

/// Transforms one source element into the target field's expected shape.
///
/// Guidelines are never transformed: their text is type-specific and must not
/// be copied across types. Unknown target types fail the transformation
/// (`None`) so the caller can warn and drop the field rather than default it.
pub fn transform(source: &ElementData, target: &FieldSchema) -> Option<ElementPayload> {
    let value = match target.field_type {
        FieldType::Text | FieldType::RichText | FieldType::UrlSlug => match &source.value {
            FieldValue::Text(s) => json!(s),
            _ => json!(""),
        },
        FieldType::Number => match source.value {
            FieldValue::Number(n) => json!(n),
            _ => json!(0),
        },
        FieldType::DateTime => match &source.value {
            FieldValue::DateTime(Some(s)) => json!(s),
            _ => Value::Null,
        },
        FieldType::ModularContent => match &source.value {
            FieldValue::References(codenames) => Value::Array(
                codenames
                    .iter()
                    .map(|codename| json!({ "codename": codename }))
                    .collect(),
            ),
            _ => json!([]),
        },
        FieldType::Asset | FieldType::MultipleChoice | FieldType::Taxonomy => {
            match &source.value {
                FieldValue::Sequence(items) => Value::Array(items.clone()),
                _ => json!([]),
            }
        }
        FieldType::Guidelines | FieldType::Unknown => return None,
    };
    Some(ElementPayload::by_codename(target.codename.clone(), value))
}

/// Schema-appropriate default for an unmapped target field. Guidelines are
/// always skipped; unknown types yield `None` and the caller warns.
pub fn default_for(target: &FieldSchema) -> Option<ElementPayload> {
    let value = match target.field_type {
        FieldType::Text | FieldType::RichText | FieldType::UrlSlug => json!(""),
        FieldType::Number => json!(0),
        FieldType::ModularContent
        | FieldType::Asset
        | FieldType::MultipleChoice
        | FieldType::Taxonomy => json!([]),
        FieldType::DateTime => Value::Null,
        FieldType::Guidelines | FieldType::Unknown => return None,
    };
    Some(ElementPayload::by_codename(target.codename.clone(), value))
}

/// Builds the full element list for a new variant: mapped fields first, then
/// defaults for every unmapped target field (guidelines excepted). Mappings
/// whose source or target element is missing are warned about and skipped,
/// never fatal. The result carries no duplicate codenames.
pub fn build_elements(
    mappings: &[FieldMapping],
    source_elements: &std::collections::BTreeMap<String, ElementData>,
    target_type: &ContentTypeInfo,
    log: &mut RunLog,
) -> Vec<ElementPayload> {
    let mut elements: Vec<ElementPayload> = Vec::new();

    for mapping in mappings {
        let Some(target_field) = &mapping.target_field else {
            continue;
        };
        let Some(target_def) = target_type.element(&target_field.codename) else {
            log.warning_with(
                format!(
                    "Skipping mapping {} -> {}: target element missing from schema",
                    mapping.source_field.codename, target_field.codename
                ),
                format!("target type: {}", target_type.codename),
            );
            continue;
        };
        let Some(source_element) = source_elements.get(&mapping.source_field.codename) else {
            log.warning_with(
                format!(
                    "Skipping mapping {} -> {}: source element absent on item",
                    mapping.source_field.codename, target_field.codename
                ),
                "field not present in fetched source data".to_string(),
            );
            continue;
        };
        if elements
            .iter()
            .any(|e| e.codename() == Some(target_def.codename.as_str()))
        {
            continue;
        }
        match transform(source_element, target_def) {
            Some(payload) => elements.push(payload),
            None => log.warning(format!(
                "Unsupported target field type for {}, field dropped",
                target_def.codename
            )),
        }
    }

    // Unmapped target fields get defaults so the upsert never trips a
    // missing-required-element rejection.
    for target_field in &target_type.elements {
        if target_field.field_type == FieldType::Guidelines {
            continue;
        }
        if elements
            .iter()
            .any(|e| e.codename() == Some(target_field.codename.as_str()))
        {
            continue;
        }
        match default_for(target_field) {
            Some(payload) => elements.push(payload),
            None => log.warning(format!(
                "No default value available for field {} of unknown type",
                target_field.codename
            )),
        }
    }

    elements
}
