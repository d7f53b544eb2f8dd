//! End-to-end migration runs against an in-memory repository.
//!
//! The mock mirrors the remote repository's observable behavior: delivery
//! reads per language, management-side items/variants, and the write API's
//! normalization of reference values from codename form to id form.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use recast::client::ContentRepository;
use recast::discover::RelationshipDiscoverer;
use recast::error::RepositoryError;
use recast::logging::RunLog;
use recast::migrate::{MigrationOrchestrator, MigrationPlan, MigrationStatus};
use recast::types::{
    ContentTypeInfo, ElementPayload, FieldMapping, FieldSchema, FieldType, IncomingRelationship,
    ItemRelationship, ItemSnapshot, ManagedItem, ManagedVariant, MigrationItem, RelatedItem,
    RelationshipInfo, VariantElement,
};
use recast::MigrationSettings;

#[derive(Default)]
struct State {
    types: Vec<ContentTypeInfo>,
    /// Delivery side: (codename, language) -> snapshot.
    delivery: BTreeMap<(String, String), ItemSnapshot>,
    default_language: String,
    managed: BTreeMap<String, ManagedItem>,
    variants: BTreeMap<(String, String), Vec<VariantElement>>,
    referenced_by: BTreeMap<String, Vec<MigrationItem>>,
    /// Delivery reads for these codenames fail with a transport error.
    failing_delivery: Vec<String>,
    create_item_calls: usize,
    upsert_calls: usize,
    publish_calls: usize,
}

struct InMemoryRepository {
    state: Mutex<State>,
}

impl InMemoryRepository {
    fn new(state: State) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    fn managed(&self, codename: &str) -> Option<ManagedItem> {
        self.state.lock().unwrap().managed.get(codename).cloned()
    }

    fn variant_value(&self, codename: &str, language: &str, element_id: &str) -> serde_json::Value {
        let state = self.state.lock().unwrap();
        state
            .variants
            .get(&(codename.to_string(), language.to_string()))
            .and_then(|elements| elements.iter().find(|e| e.element_id == element_id))
            .map(|e| e.value.clone())
            .unwrap_or(serde_json::Value::Null)
    }

    fn counters(&self) -> (usize, usize, usize) {
        let state = self.state.lock().unwrap();
        (state.create_item_calls, state.upsert_calls, state.publish_calls)
    }
}

/// The management write API accepts codename references but stores and
/// returns them as ids; the mock normalizes at upsert time the same way.
fn normalize_reference_value(state: &State, value: serde_json::Value) -> serde_json::Value {
    let serde_json::Value::Array(entries) = value else {
        return value;
    };
    serde_json::Value::Array(
        entries
            .into_iter()
            .map(|entry| {
                if let Some(codename) = entry.get("codename").and_then(|v| v.as_str()) {
                    if let Some(item) = state.managed.get(codename) {
                        return serde_json::json!({ "id": item.id });
                    }
                }
                entry
            })
            .collect(),
    )
}

#[async_trait]
impl ContentRepository for InMemoryRepository {
    async fn fetch_item(
        &self,
        codename: &str,
        language: Option<&str>,
        depth: u8,
    ) -> Result<Option<ItemSnapshot>, RepositoryError> {
        let state = self.state.lock().unwrap();
        if state.failing_delivery.iter().any(|c| c == codename) {
            return Err(RepositoryError::Transport("connection reset".to_string()));
        }
        let language = language.unwrap_or(&state.default_language);
        let mut snapshot = match state
            .delivery
            .get(&(codename.to_string(), language.to_string()))
        {
            Some(snapshot) => snapshot.clone(),
            None => return Ok(None),
        };
        if depth == 0 {
            snapshot.linked_items.clear();
        }
        Ok(Some(snapshot))
    }

    async fn fetch_type_schema(&self, codename: &str) -> Result<ContentTypeInfo, RepositoryError> {
        let state = self.state.lock().unwrap();
        state
            .types
            .iter()
            .find(|t| t.codename == codename)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("type {codename}")))
    }

    async fn fetch_type_schema_by_id(&self, id: &str) -> Result<ContentTypeInfo, RepositoryError> {
        let state = self.state.lock().unwrap();
        state
            .types
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("type id {id}")))
    }

    async fn fetch_referenced_by(
        &self,
        codename: &str,
    ) -> Result<Vec<MigrationItem>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state.referenced_by.get(codename).cloned().unwrap_or_default())
    }

    async fn view_item(&self, codename: &str) -> Result<Option<ManagedItem>, RepositoryError> {
        Ok(self.managed(codename))
    }

    async fn create_item(
        &self,
        name: &str,
        codename: Option<&str>,
        type_codename: &str,
    ) -> Result<ManagedItem, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.create_item_calls += 1;
        let codename = codename
            .map(str::to_string)
            .unwrap_or_else(|| name.to_lowercase().replace(' ', "_"));
        let type_id = state
            .types
            .iter()
            .find(|t| t.codename == type_codename)
            .map(|t| t.id.clone())
            .ok_or_else(|| RepositoryError::not_found(format!("type {type_codename}")))?;
        let item = ManagedItem {
            id: format!("mid_{codename}"),
            name: name.to_string(),
            codename: codename.clone(),
            type_id,
        };
        state.managed.insert(codename, item.clone());
        Ok(item)
    }

    async fn view_variant(
        &self,
        item_codename: &str,
        language: &str,
    ) -> Result<Option<ManagedVariant>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let Some(item) = state.managed.get(item_codename) else {
            return Ok(None);
        };
        Ok(state
            .variants
            .get(&(item_codename.to_string(), language.to_string()))
            .map(|elements| ManagedVariant {
                item_id: item.id.clone(),
                elements: elements.clone(),
            }))
    }

    async fn upsert_variant(
        &self,
        item_codename: &str,
        language: &str,
        elements: &[ElementPayload],
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.upsert_calls += 1;
        let item = state
            .managed
            .get(item_codename)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("item {item_codename}")))?;
        let item_type = state
            .types
            .iter()
            .find(|t| t.id == item.type_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("type id {}", item.type_id)))?;

        let mut resolved = Vec::new();
        for payload in elements {
            let schema_element = match payload.codename() {
                Some(codename) => item_type.element(codename),
                None => {
                    let recast::types::ElementRef::ById { id } = &payload.element else {
                        unreachable!()
                    };
                    item_type.elements.iter().find(|e| &e.id == id)
                }
            }
            .ok_or_else(|| RepositoryError::Api {
                status: 400,
                body: format!("unknown element on {item_codename}"),
            })?;
            let value = if schema_element.field_type == FieldType::ModularContent {
                normalize_reference_value(&state, payload.value.clone())
            } else {
                payload.value.clone()
            };
            resolved.push(VariantElement {
                element_id: schema_element.id.clone(),
                value,
            });
        }

        // Partial upsert: provided elements replace, others survive.
        let key = (item_codename.to_string(), language.to_string());
        let variant = state.variants.entry(key).or_default();
        for element in resolved {
            match variant.iter_mut().find(|e| e.element_id == element.element_id) {
                Some(existing) => existing.value = element.value,
                None => variant.push(element),
            }
        }
        Ok(())
    }

    async fn create_new_version(
        &self,
        _item_codename: &str,
        _language: &str,
    ) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn publish(&self, _item_id: &str, _language: &str) -> Result<(), RepositoryError> {
        self.state.lock().unwrap().publish_calls += 1;
        Ok(())
    }
}

// --- fixture helpers ---

fn field(id: &str, codename: &str, field_type: FieldType) -> FieldSchema {
    FieldSchema {
        id: id.to_string(),
        codename: codename.to_string(),
        name: codename.to_string(),
        field_type,
        is_required: false,
    }
}

fn content_type(id: &str, codename: &str, elements: Vec<FieldSchema>) -> ContentTypeInfo {
    ContentTypeInfo {
        id: id.to_string(),
        codename: codename.to_string(),
        name: codename.to_string(),
        elements,
    }
}

fn mapping(source: &FieldSchema, target: &FieldSchema) -> FieldMapping {
    FieldMapping {
        source_field: source.clone(),
        target_field: Some(target.clone()),
        transformation_needed: false,
        warnings: Vec::new(),
    }
}

fn migration_item(id: &str, codename: &str, type_codename: &str) -> MigrationItem {
    MigrationItem {
        id: id.to_string(),
        name: codename.replace('_', " "),
        codename: codename.to_string(),
        type_codename: type_codename.to_string(),
    }
}

fn managed(id: &str, codename: &str, type_id: &str) -> ManagedItem {
    ManagedItem {
        id: id.to_string(),
        name: codename.to_string(),
        codename: codename.to_string(),
        type_id: type_id.to_string(),
    }
}

fn snapshot(
    id: &str,
    codename: &str,
    type_codename: &str,
    language: &str,
    elements: Vec<(&str, FieldType, serde_json::Value)>,
    linked: Vec<(&str, &str, &str)>,
) -> ItemSnapshot {
    let body: BTreeMap<String, serde_json::Value> = elements
        .into_iter()
        .map(|(codename, field_type, value)| {
            (
                codename.to_string(),
                serde_json::json!({
                    "name": codename,
                    "type": serde_json::to_value(field_type).unwrap(),
                    "value": value,
                }),
            )
        })
        .collect();
    let linked_items: BTreeMap<String, serde_json::Value> = linked
        .into_iter()
        .map(|(item_codename, item_id, item_type)| {
            (
                item_codename.to_string(),
                serde_json::json!({
                    "id": item_id,
                    "name": item_codename,
                    "codename": item_codename,
                    "type": item_type,
                    "language": language,
                }),
            )
        })
        .collect();
    serde_json::from_value(serde_json::json!({
        "system": {
            "id": id,
            "name": codename,
            "codename": codename,
            "type": type_codename,
            "language": language,
        },
        "elements": body,
        "linked_items": linked_items,
    }))
    .unwrap()
}

fn orchestrator(repo: Arc<InMemoryRepository>) -> MigrationOrchestrator {
    MigrationOrchestrator::new(repo, MigrationSettings::default())
}

/// article {title, body} -> page {title, body, subtitle}: mapped fields are
/// copied, the unmapped subtitle is defaulted to an empty string.
fn article_page_state() -> State {
    let article = content_type(
        "t_article",
        "article",
        vec![
            field("el_a_title", "title", FieldType::Text),
            field("el_a_body", "body", FieldType::RichText),
        ],
    );
    let page = content_type(
        "t_page",
        "page",
        vec![
            field("el_p_title", "title", FieldType::Text),
            field("el_p_body", "body", FieldType::RichText),
            field("el_p_subtitle", "subtitle", FieldType::Text),
        ],
    );
    let mut state = State {
        types: vec![article, page],
        default_language: "en".to_string(),
        ..State::default()
    };
    state.delivery.insert(
        ("art_1".to_string(), "en".to_string()),
        snapshot(
            "i_art_1",
            "art_1",
            "article",
            "en",
            vec![
                ("title", FieldType::Text, serde_json::json!("Hello")),
                ("body", FieldType::RichText, serde_json::json!("<p>World</p>")),
            ],
            vec![],
        ),
    );
    state
        .managed
        .insert("art_1".to_string(), managed("i_art_1", "art_1", "t_article"));
    state
}

fn article_page_plan() -> MigrationPlan {
    let title_s = field("el_a_title", "title", FieldType::Text);
    let body_s = field("el_a_body", "body", FieldType::RichText);
    let title_t = field("el_p_title", "title", FieldType::Text);
    let body_t = field("el_p_body", "body", FieldType::RichText);
    MigrationPlan {
        source_type: "article".to_string(),
        target_type: "page".to_string(),
        mappings: vec![mapping(&title_s, &title_t), mapping(&body_s, &body_t)],
        selected_items: vec![migration_item("i_art_1", "art_1", "article")],
        relationships: Vec::new(),
        update_references: false,
        language: "en".to_string(),
    }
}

#[tokio::test]
async fn simple_migration_copies_mapped_fields_and_defaults_the_rest() {
    let repo = InMemoryRepository::new(article_page_state());
    let report = orchestrator(repo.clone())
        .run(article_page_plan())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].status, MigrationStatus::Success);
    assert_eq!(
        report.results[0].new_item_codename.as_deref(),
        Some("art_1_migrated")
    );
    assert_eq!(report.results[0].created_items.len(), 1);

    let new_item = repo.managed("art_1_migrated").unwrap();
    assert_eq!(new_item.type_id, "t_page");
    assert_eq!(
        repo.variant_value("art_1_migrated", "en", "el_p_title"),
        serde_json::json!("Hello")
    );
    assert_eq!(
        repo.variant_value("art_1_migrated", "en", "el_p_body"),
        serde_json::json!("<p>World</p>")
    );
    assert_eq!(
        repo.variant_value("art_1_migrated", "en", "el_p_subtitle"),
        serde_json::json!("")
    );

    assert_eq!(report.summary.total, 1);
    assert_eq!(report.summary.created, 1);
    assert_eq!(report.draft_items.len(), 1);
    assert_eq!(report.draft_items[0].codename, "art_1_migrated");
}

#[tokio::test]
async fn rerunning_the_same_migration_writes_nothing() {
    let repo = InMemoryRepository::new(article_page_state());
    orchestrator(repo.clone())
        .run(article_page_plan())
        .await
        .unwrap();
    let (creates_before, upserts_before, _) = repo.counters();

    let second = orchestrator(repo.clone())
        .run(article_page_plan())
        .await
        .unwrap();

    assert_eq!(second.results[0].status, MigrationStatus::AlreadyExisted);
    assert_eq!(second.summary.already_existed, 1);
    assert!(second.draft_items.is_empty());
    let (creates_after, upserts_after, _) = repo.counters();
    assert_eq!(creates_before, creates_after);
    assert_eq!(upserts_before, upserts_after);
}

/// tag_a references tag_b; only tag_a is selected. tag_b is migrated on
/// demand and tag_a_migrated ends up referencing tag_b_migrated.
#[tokio::test]
async fn outgoing_same_type_reference_is_migrated_and_rewired() {
    let tag = content_type(
        "t_tag",
        "tag",
        vec![
            field("el_name", "name", FieldType::Text),
            field("el_related", "related", FieldType::ModularContent),
        ],
    );
    let mut state = State {
        types: vec![tag],
        default_language: "en".to_string(),
        ..State::default()
    };
    state.delivery.insert(
        ("tag_a".to_string(), "en".to_string()),
        snapshot(
            "i_tag_a",
            "tag_a",
            "tag",
            "en",
            vec![
                ("name", FieldType::Text, serde_json::json!("Tag A")),
                ("related", FieldType::ModularContent, serde_json::json!(["tag_b"])),
            ],
            vec![("tag_b", "i_tag_b", "tag")],
        ),
    );
    state.delivery.insert(
        ("tag_b".to_string(), "en".to_string()),
        snapshot(
            "i_tag_b",
            "tag_b",
            "tag",
            "en",
            vec![
                ("name", FieldType::Text, serde_json::json!("Tag B")),
                ("related", FieldType::ModularContent, serde_json::json!([])),
            ],
            vec![],
        ),
    );
    state
        .managed
        .insert("tag_a".to_string(), managed("i_tag_a", "tag_a", "t_tag"));
    state
        .managed
        .insert("tag_b".to_string(), managed("i_tag_b", "tag_b", "t_tag"));
    let repo = InMemoryRepository::new(state);

    let name = field("el_name", "name", FieldType::Text);
    let related = field("el_related", "related", FieldType::ModularContent);
    let plan = MigrationPlan {
        source_type: "tag".to_string(),
        target_type: "tag".to_string(),
        mappings: vec![mapping(&name, &name), mapping(&related, &related)],
        selected_items: vec![migration_item("i_tag_a", "tag_a", "tag")],
        relationships: vec![ItemRelationship {
            item_id: "i_tag_a".to_string(),
            item_name: "Tag A".to_string(),
            item_codename: "tag_a".to_string(),
            item_type: "tag".to_string(),
            outgoing: vec![RelationshipInfo {
                field_name: "related".to_string(),
                field_type: FieldType::ModularContent,
                related_items: vec![RelatedItem {
                    id: "i_tag_b".to_string(),
                    name: "Tag B".to_string(),
                    codename: "tag_b".to_string(),
                    type_codename: "tag".to_string(),
                }],
            }],
            incoming: Vec::new(),
        }],
        update_references: true,
        language: "en".to_string(),
    };

    let report = orchestrator(repo.clone()).run(plan).await.unwrap();

    let tag_b_migrated = repo.managed("tag_b_migrated").unwrap();
    let related_value = repo.variant_value("tag_a_migrated", "en", "el_related");
    assert_eq!(
        related_value,
        serde_json::json!([{ "id": tag_b_migrated.id }])
    );

    let auto_entry = report
        .created_items
        .iter()
        .find(|e| e.original_codename == "tag_b")
        .unwrap();
    assert!(auto_entry.was_auto_migrated);
    // The on-demand migration shows up as its own result.
    let tag_b_result = report
        .results
        .iter()
        .find(|r| r.item.codename == "tag_b")
        .unwrap();
    assert_eq!(tag_b_result.status, MigrationStatus::Success);
    assert_eq!(tag_b_result.created_items.len(), 1);
    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.auto_migrated, 1);
}

/// tag_x is selected; same-type tag_y and external page_1 both reference it.
/// tag_y joins the run automatically, page_1 is rewritten in place.
#[tokio::test]
async fn incoming_references_split_into_same_type_and_external_phases() {
    let tag = content_type(
        "t_tag",
        "tag",
        vec![
            field("el_name", "name", FieldType::Text),
            field("el_related", "related", FieldType::ModularContent),
        ],
    );
    let page = content_type(
        "t_page",
        "page",
        vec![
            field("el_title", "title", FieldType::Text),
            field("el_tags", "tags", FieldType::ModularContent),
        ],
    );
    let mut state = State {
        types: vec![tag, page],
        default_language: "en".to_string(),
        ..State::default()
    };
    state.delivery.insert(
        ("tag_x".to_string(), "en".to_string()),
        snapshot(
            "i_tag_x",
            "tag_x",
            "tag",
            "en",
            vec![
                ("name", FieldType::Text, serde_json::json!("Tag X")),
                ("related", FieldType::ModularContent, serde_json::json!([])),
            ],
            vec![],
        ),
    );
    state.delivery.insert(
        ("tag_y".to_string(), "en".to_string()),
        snapshot(
            "i_tag_y",
            "tag_y",
            "tag",
            "en",
            vec![
                ("name", FieldType::Text, serde_json::json!("Tag Y")),
                ("related", FieldType::ModularContent, serde_json::json!(["tag_x"])),
            ],
            vec![("tag_x", "i_tag_x", "tag")],
        ),
    );
    state
        .managed
        .insert("tag_x".to_string(), managed("i_tag_x", "tag_x", "t_tag"));
    state
        .managed
        .insert("tag_y".to_string(), managed("i_tag_y", "tag_y", "t_tag"));
    state
        .managed
        .insert("page_1".to_string(), managed("i_page_1", "page_1", "t_page"));
    state.variants.insert(
        ("page_1".to_string(), "en".to_string()),
        vec![VariantElement {
            element_id: "el_tags".to_string(),
            value: serde_json::json!([{ "id": "i_tag_x" }]),
        }],
    );
    let repo = InMemoryRepository::new(state);

    let name = field("el_name", "name", FieldType::Text);
    let related = field("el_related", "related", FieldType::ModularContent);
    let plan = MigrationPlan {
        source_type: "tag".to_string(),
        target_type: "tag".to_string(),
        mappings: vec![mapping(&name, &name), mapping(&related, &related)],
        selected_items: vec![migration_item("i_tag_x", "tag_x", "tag")],
        relationships: vec![ItemRelationship {
            item_id: "i_tag_x".to_string(),
            item_name: "Tag X".to_string(),
            item_codename: "tag_x".to_string(),
            item_type: "tag".to_string(),
            outgoing: Vec::new(),
            incoming: vec![
                IncomingRelationship {
                    from_item_id: "i_tag_y".to_string(),
                    from_item_name: "Tag Y".to_string(),
                    from_item_codename: "tag_y".to_string(),
                    from_item_type: "tag".to_string(),
                    field: "related".to_string(),
                    language: "en".to_string(),
                    needs_language_variant: false,
                },
                IncomingRelationship {
                    from_item_id: "i_page_1".to_string(),
                    from_item_name: "Page 1".to_string(),
                    from_item_codename: "page_1".to_string(),
                    from_item_type: "page".to_string(),
                    field: "tags".to_string(),
                    language: "en".to_string(),
                    needs_language_variant: false,
                },
            ],
        }],
        update_references: true,
        language: "en".to_string(),
    };

    let report = orchestrator(repo.clone()).run(plan).await.unwrap();

    // tag_y was pulled in and migrated; page_1 was not.
    assert!(repo.managed("tag_y_migrated").is_some());
    assert!(repo.managed("page_1_migrated").is_none());

    let tag_x_migrated = repo.managed("tag_x_migrated").unwrap();
    assert_eq!(
        repo.variant_value("tag_y_migrated", "en", "el_related"),
        serde_json::json!([{ "id": tag_x_migrated.id }])
    );
    // External referrer rewritten in place.
    assert_eq!(
        repo.variant_value("page_1", "en", "el_tags"),
        serde_json::json!([{ "id": tag_x_migrated.id }])
    );

    // Both phases record the referencing item's own id.
    assert!(report
        .updated_reference_items
        .contains(&"i_tag_y".to_string()));
    assert!(report
        .updated_reference_items
        .contains(&"i_page_1".to_string()));
    assert!(report
        .draft_items
        .iter()
        .any(|d| d.codename == "page_1" && !d.was_auto_migrated));
    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.auto_migrated, 1);
}

#[tokio::test]
async fn existing_item_of_another_type_blocks_the_migrated_codename() {
    let mut state = article_page_state();
    state.types.push(content_type(
        "t_other",
        "other",
        vec![field("el_o", "label", FieldType::Text)],
    ));
    state.managed.insert(
        "art_1_migrated".to_string(),
        managed("i_occupied", "art_1_migrated", "t_other"),
    );
    let repo = InMemoryRepository::new(state);

    let report = orchestrator(repo.clone())
        .run(article_page_plan())
        .await
        .unwrap();

    assert_eq!(report.results[0].status, MigrationStatus::Failed);
    assert!(report.results[0].message.contains("already claimed"));
    assert!(report.created_items.is_empty());
    // The occupying item was not touched.
    let (_, upserts, _) = repo.counters();
    assert_eq!(upserts, 0);
}

/// Discovery reads outgoing references from a depth-1 fetch and confirms
/// reverse-index entries by locating the exact referencing field, falling
/// back to the repository default language where needed.
#[tokio::test]
async fn discovery_finds_outgoing_and_incoming_references() {
    let tag = content_type(
        "t_tag",
        "tag",
        vec![
            field("el_name", "name", FieldType::Text),
            field("el_related", "related", FieldType::ModularContent),
        ],
    );
    let page = content_type(
        "t_page",
        "page",
        vec![
            field("el_title", "title", FieldType::Text),
            field("el_tags", "tags", FieldType::ModularContent),
        ],
    );
    let mut state = State {
        types: vec![tag, page],
        default_language: "de".to_string(),
        ..State::default()
    };
    state.delivery.insert(
        ("tag_x".to_string(), "en".to_string()),
        snapshot(
            "i_tag_x",
            "tag_x",
            "tag",
            "en",
            vec![
                ("name", FieldType::Text, serde_json::json!("Tag X")),
                ("related", FieldType::ModularContent, serde_json::json!(["tag_b"])),
            ],
            vec![("tag_b", "i_tag_b", "tag")],
        ),
    );
    // page_1 only has a German variant; the reverse index still lists it.
    state.delivery.insert(
        ("page_1".to_string(), "de".to_string()),
        snapshot(
            "i_page_1",
            "page_1",
            "page",
            "de",
            vec![
                ("title", FieldType::Text, serde_json::json!("Seite 1")),
                ("tags", FieldType::ModularContent, serde_json::json!(["tag_x"])),
            ],
            vec![],
        ),
    );
    state.referenced_by.insert(
        "tag_x".to_string(),
        vec![migration_item("i_page_1", "page_1", "page")],
    );
    let repo = InMemoryRepository::new(state);

    let discoverer = RelationshipDiscoverer::new(repo, "en");
    let mut log = RunLog::new();
    let graph = discoverer
        .discover(&[migration_item("i_tag_x", "tag_x", "tag")], &mut log)
        .await
        .unwrap();

    assert_eq!(graph.len(), 1);
    assert_eq!(graph[0].item_codename, "tag_x");
    assert_eq!(graph[0].outgoing.len(), 1);
    assert_eq!(graph[0].outgoing[0].field_name, "related");
    assert_eq!(graph[0].outgoing[0].related_items[0].codename, "tag_b");
    assert_eq!(graph[0].outgoing[0].related_items[0].id, "i_tag_b");

    assert_eq!(graph[0].incoming.len(), 1);
    let incoming = &graph[0].incoming[0];
    assert_eq!(incoming.from_item_codename, "page_1");
    assert_eq!(incoming.field, "tags");
    assert_eq!(incoming.language, "de");
    assert!(incoming.needs_language_variant);
}

/// One referrer failing to re-read must not abort the scan; the healthy
/// referrer's incoming reference still comes back.
#[tokio::test]
async fn discovery_skips_a_referrer_that_fails_to_load() {
    let tag = content_type(
        "t_tag",
        "tag",
        vec![
            field("el_name", "name", FieldType::Text),
            field("el_related", "related", FieldType::ModularContent),
        ],
    );
    let page = content_type(
        "t_page",
        "page",
        vec![
            field("el_title", "title", FieldType::Text),
            field("el_tags", "tags", FieldType::ModularContent),
        ],
    );
    let mut state = State {
        types: vec![tag, page],
        default_language: "en".to_string(),
        ..State::default()
    };
    state.delivery.insert(
        ("tag_x".to_string(), "en".to_string()),
        snapshot(
            "i_tag_x",
            "tag_x",
            "tag",
            "en",
            vec![
                ("name", FieldType::Text, serde_json::json!("Tag X")),
                ("related", FieldType::ModularContent, serde_json::json!([])),
            ],
            vec![],
        ),
    );
    state.delivery.insert(
        ("page_1".to_string(), "en".to_string()),
        snapshot(
            "i_page_1",
            "page_1",
            "page",
            "en",
            vec![
                ("title", FieldType::Text, serde_json::json!("Page 1")),
                ("tags", FieldType::ModularContent, serde_json::json!(["tag_x"])),
            ],
            vec![],
        ),
    );
    state.referenced_by.insert(
        "tag_x".to_string(),
        vec![
            migration_item("i_page_2", "page_2", "page"),
            migration_item("i_page_1", "page_1", "page"),
        ],
    );
    state.failing_delivery.push("page_2".to_string());
    let repo = InMemoryRepository::new(state);

    let discoverer = RelationshipDiscoverer::new(repo, "en");
    let mut log = RunLog::new();
    let graph = discoverer
        .discover(&[migration_item("i_tag_x", "tag_x", "tag")], &mut log)
        .await
        .unwrap();

    assert_eq!(graph.len(), 1);
    assert_eq!(graph[0].incoming.len(), 1);
    assert_eq!(graph[0].incoming[0].from_item_codename, "page_1");
    assert!(log
        .entries()
        .iter()
        .any(|entry| entry.message.contains("page_2")));
}

#[tokio::test]
async fn source_readable_only_in_a_fallback_language_still_migrates() {
    let mut state = article_page_state();
    // art_2 exists only in German.
    state.delivery.insert(
        ("art_2".to_string(), "de".to_string()),
        snapshot(
            "i_art_2",
            "art_2",
            "article",
            "de",
            vec![
                ("title", FieldType::Text, serde_json::json!("Hallo")),
                ("body", FieldType::RichText, serde_json::json!("<p>Welt</p>")),
            ],
            vec![],
        ),
    );
    state
        .managed
        .insert("art_2".to_string(), managed("i_art_2", "art_2", "t_article"));
    let repo = InMemoryRepository::new(state);

    let mut plan = article_page_plan();
    plan.selected_items = vec![migration_item("i_art_2", "art_2", "article")];
    let report = orchestrator(repo.clone()).run(plan).await.unwrap();

    assert_eq!(report.results[0].status, MigrationStatus::Success);
    assert_eq!(
        repo.variant_value("art_2_migrated", "en", "el_p_title"),
        serde_json::json!("Hallo")
    );
    assert!(report
        .log
        .iter()
        .any(|entry| entry.message.contains("no en variant")));
}

/// An item sourced from a fallback language has no variant in the run
/// language, so the reference-rewriting re-read must walk the same fallback
/// chain instead of silently skipping the item.
#[tokio::test]
async fn outgoing_references_rewired_for_an_item_sourced_from_a_fallback_language() {
    let tag = content_type(
        "t_tag",
        "tag",
        vec![
            field("el_name", "name", FieldType::Text),
            field("el_related", "related", FieldType::ModularContent),
        ],
    );
    let mut state = State {
        types: vec![tag],
        default_language: "en".to_string(),
        ..State::default()
    };
    // tag_a exists only in German.
    state.delivery.insert(
        ("tag_a".to_string(), "de".to_string()),
        snapshot(
            "i_tag_a",
            "tag_a",
            "tag",
            "de",
            vec![
                ("name", FieldType::Text, serde_json::json!("Tag A")),
                ("related", FieldType::ModularContent, serde_json::json!(["tag_b"])),
            ],
            vec![("tag_b", "i_tag_b", "tag")],
        ),
    );
    state.delivery.insert(
        ("tag_b".to_string(), "en".to_string()),
        snapshot(
            "i_tag_b",
            "tag_b",
            "tag",
            "en",
            vec![
                ("name", FieldType::Text, serde_json::json!("Tag B")),
                ("related", FieldType::ModularContent, serde_json::json!([])),
            ],
            vec![],
        ),
    );
    state
        .managed
        .insert("tag_a".to_string(), managed("i_tag_a", "tag_a", "t_tag"));
    state
        .managed
        .insert("tag_b".to_string(), managed("i_tag_b", "tag_b", "t_tag"));
    let repo = InMemoryRepository::new(state);

    let name = field("el_name", "name", FieldType::Text);
    let related = field("el_related", "related", FieldType::ModularContent);
    let plan = MigrationPlan {
        source_type: "tag".to_string(),
        target_type: "tag".to_string(),
        mappings: vec![mapping(&name, &name), mapping(&related, &related)],
        selected_items: vec![migration_item("i_tag_a", "tag_a", "tag")],
        relationships: vec![ItemRelationship {
            item_id: "i_tag_a".to_string(),
            item_name: "Tag A".to_string(),
            item_codename: "tag_a".to_string(),
            item_type: "tag".to_string(),
            outgoing: vec![RelationshipInfo {
                field_name: "related".to_string(),
                field_type: FieldType::ModularContent,
                related_items: vec![RelatedItem {
                    id: "i_tag_b".to_string(),
                    name: "Tag B".to_string(),
                    codename: "tag_b".to_string(),
                    type_codename: "tag".to_string(),
                }],
            }],
            incoming: Vec::new(),
        }],
        update_references: true,
        language: "en".to_string(),
    };

    let report = orchestrator(repo.clone()).run(plan).await.unwrap();

    assert_eq!(report.results[0].status, MigrationStatus::Success);
    let tag_b_migrated = repo.managed("tag_b_migrated").unwrap();
    assert_eq!(
        repo.variant_value("tag_a_migrated", "en", "el_related"),
        serde_json::json!([{ "id": tag_b_migrated.id }])
    );
    assert_eq!(report.summary.auto_migrated, 1);
}
