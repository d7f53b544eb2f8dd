//! Run orchestration.
//!
//! Drives a migration run through its stages: plan validation, working-set
//! expansion, sequential item migration, then the three reference-rewriting
//! phases (outgoing, incoming same-type, incoming external). All run state is
//! local to `run` and returned in the report; the orchestrator holds only the
//! repository handle and policy.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::ContentRepository;
use crate::config::MigrationSettings;
use crate::error::{CoreError, RepositoryError, Result};
use crate::logging::{LogEntry, LogSink, Progress, RunLog};
use crate::types::{
    ContentTypeInfo, CreatedItemInfo, DraftItem, ElementPayload, FieldMapping, FieldType,
    FieldValue, ItemRelationship, ItemSnapshot, MigrationItem, RegistrySummary,
};

use super::item::{ItemMigrator, MigrationOutcome};

/// Everything a run needs, assembled by the caller (the out-of-scope mapping
/// wizard). Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub source_type: String,
    pub target_type: String,
    pub mappings: Vec<FieldMapping>,
    pub selected_items: Vec<MigrationItem>,
    /// Relationship graph for the selected items, discovered beforehand.
    #[serde(default)]
    pub relationships: Vec<ItemRelationship>,
    /// Gates phases 1-3; migration itself always runs.
    pub update_references: bool,
    pub language: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Success,
    AlreadyExisted,
    Failed,
}

/// Per-item record in the report, in working-set order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    pub item: MigrationItem,
    pub status: MigrationStatus,
    pub new_item_id: Option<String>,
    pub new_item_codename: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Registry entries appended while migrating this item.
    pub created_items: Vec<CreatedItemInfo>,
}

/// Complete outcome of one run.
#[derive(Debug)]
pub struct MigrationReport {
    pub results: Vec<ItemResult>,
    pub created_items: Vec<CreatedItemInfo>,
    /// New creations (minus already-existed) plus reference-rewritten
    /// external items, deduplicated by id. Input to the batch publisher.
    pub draft_items: Vec<DraftItem>,
    /// Ids of items whose references were rewritten in phases 2 and 3.
    pub updated_reference_items: Vec<String>,
    pub summary: RegistrySummary,
    pub log: Vec<LogEntry>,
}

pub struct MigrationOrchestrator {
    repo: Arc<dyn ContentRepository>,
    settings: MigrationSettings,
    sink: Option<LogSink>,
}

impl MigrationOrchestrator {
    pub fn new(repo: Arc<dyn ContentRepository>, settings: MigrationSettings) -> Self {
        Self {
            repo,
            settings,
            sink: None,
        }
    }

    /// Forwards every log entry to the caller as it is appended.
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Executes the whole run. Only plan validation and schema fetch failures
    /// abort; once items start migrating, every failure is per-item or
    /// per-reference and the run carries on.
    pub async fn run(&self, plan: MigrationPlan) -> Result<MigrationReport> {
        validate_plan(&plan)?;

        let mut log = match &self.sink {
            Some(sink) => RunLog::with_sink(Arc::clone(sink)),
            None => RunLog::new(),
        };

        // Schemas are re-fetched fresh per run; stale cached schemas were a
        // recurring source of element-id mismatches.
        let target_type = self.repo.fetch_type_schema(&plan.target_type).await?;
        let source_type = self.repo.fetch_type_schema(&plan.source_type).await?;
        log.info(format!(
            "Migrating {} -> {} ({} field mapping(s))",
            source_type.codename,
            target_type.codename,
            plan.mappings.len()
        ));

        // Expansion: same-type items referencing a selected item join the
        // working set, flagged auto-migrated. Keyed by id so nothing migrates
        // twice.
        let mut working_set: Vec<MigrationItem> = Vec::new();
        let mut auto_flagged: HashSet<String> = HashSet::new();
        let mut visited: HashSet<String> = HashSet::new();
        for item in &plan.selected_items {
            if visited.insert(item.id.clone()) {
                working_set.push(item.clone());
            }
        }
        for relationship in &plan.relationships {
            for incoming in &relationship.incoming {
                if incoming.from_item_type != plan.source_type {
                    continue;
                }
                if !visited.insert(incoming.from_item_id.clone()) {
                    continue;
                }
                log.info(format!(
                    "Auto-including {} (references {})",
                    incoming.from_item_codename, relationship.item_codename
                ));
                auto_flagged.insert(incoming.from_item_id.clone());
                working_set.push(MigrationItem {
                    id: incoming.from_item_id.clone(),
                    name: incoming.from_item_name.clone(),
                    codename: incoming.from_item_codename.clone(),
                    type_codename: incoming.from_item_type.clone(),
                });
            }
        }

        let incoming_total: usize = plan
            .relationships
            .iter()
            .map(|r| r.incoming.len())
            .sum();
        let mut progress = Progress::new(working_set.len() + incoming_total);

        let migrator = ItemMigrator::new(self.repo.as_ref(), &self.settings.fallback_languages);
        let mut registry: Vec<CreatedItemInfo> = Vec::new();
        let mut migrated_map: BTreeMap<String, String> = BTreeMap::new();
        let mut results = Vec::new();

        for item in &working_set {
            let registered_before = registry.len();
            let outcome = migrator
                .migrate(
                    item,
                    &plan.language,
                    &plan.mappings,
                    &target_type,
                    auto_flagged.contains(&item.id),
                    &mut registry,
                    &mut log,
                )
                .await;
            results.push(item_result(item, &outcome, registry[registered_before..].to_vec()));
            if let MigrationOutcome::Success { new_item_codename, .. }
            | MigrationOutcome::AlreadyMigrated { new_item_codename, .. } = &outcome
            {
                migrated_map.insert(item.codename.clone(), new_item_codename.clone());
            }
            let pct = progress.advance();
            log.info(format!("Progress: {pct:.0}%"));
        }

        let mut updated_reference_items: BTreeSet<String> = BTreeSet::new();
        let mut external_drafts: Vec<DraftItem> = Vec::new();

        if plan.update_references {
            self.rewrite_outgoing(
                &plan,
                &working_set,
                &target_type,
                &migrator,
                &mut registry,
                &mut migrated_map,
                &mut visited,
                &mut results,
                &mut log,
            )
            .await;
            self.rewrite_incoming(
                &plan,
                &migrated_map,
                &mut updated_reference_items,
                &mut external_drafts,
                &mut progress,
                &mut log,
            )
            .await;
        } else {
            // Incoming references still count toward the precomputed total.
            for _ in 0..incoming_total {
                progress.advance();
            }
        }

        progress.complete();
        log.success(format!(
            "Run complete: {} item(s), {} reference update(s)",
            working_set.len(),
            updated_reference_items.len()
        ));

        let mut draft_items: Vec<DraftItem> = Vec::new();
        let mut seen_draft_ids: BTreeSet<String> = BTreeSet::new();
        for entry in registry.iter().filter(|e| !e.already_existed) {
            if seen_draft_ids.insert(entry.new_id.clone()) {
                draft_items.push(DraftItem {
                    id: entry.new_id.clone(),
                    name: entry.new_name.clone(),
                    codename: entry.new_codename.clone(),
                    type_codename: entry.new_type.clone(),
                    language: plan.language.clone(),
                    was_auto_migrated: entry.was_auto_migrated,
                });
            }
        }
        for draft in external_drafts {
            if seen_draft_ids.insert(draft.id.clone()) {
                draft_items.push(draft);
            }
        }

        let summary = RegistrySummary::tally(&registry);
        Ok(MigrationReport {
            results,
            created_items: registry,
            draft_items,
            updated_reference_items: updated_reference_items.into_iter().collect(),
            summary,
            log: log.into_entries(),
        })
    }

    /// Phase 1: inside each migrated item, point references at migrated
    /// counterparts. A same-type reference target that was never migrated is
    /// migrated on demand first; the worklist and visited set keep cycles
    /// from recursing forever.
    #[allow(clippy::too_many_arguments)]
    async fn rewrite_outgoing(
        &self,
        plan: &MigrationPlan,
        working_set: &[MigrationItem],
        target_type: &ContentTypeInfo,
        migrator: &ItemMigrator<'_>,
        registry: &mut Vec<CreatedItemInfo>,
        migrated_map: &mut BTreeMap<String, String>,
        visited: &mut HashSet<String>,
        results: &mut Vec<ItemResult>,
        log: &mut RunLog,
    ) {
        let mut queue: VecDeque<MigrationItem> = working_set
            .iter()
            .filter(|item| migrated_map.contains_key(&item.codename))
            .cloned()
            .collect();
        let mut scanned: HashSet<String> = HashSet::new();

        while let Some(item) = queue.pop_front() {
            if !scanned.insert(item.codename.clone()) {
                continue;
            }
            let Some(migrated) = migrated_map.get(&item.codename).cloned() else {
                continue;
            };
            // Items migrated from a fallback language have no variant in the
            // plan language, so the re-read walks the same chain the migrator
            // used.
            let snapshot = match self.refetch_for_rewrite(&item.codename, &plan.language).await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    log.warning(format!(
                        "Could not re-read {} in any language, outgoing references left as-is",
                        item.codename
                    ));
                    continue;
                }
                Err(err) => {
                    log.warning_with(
                        format!("Could not re-read {} for reference rewriting", item.codename),
                        err.to_string(),
                    );
                    continue;
                }
            };

            for (element_codename, element) in &snapshot.elements {
                if !element.field_type.is_reference_bearing() {
                    continue;
                }
                let FieldValue::References(codenames) = &element.value else {
                    continue;
                };
                // The migrated variant stores this field under the mapped
                // target codename.
                let Some(target_field) = mapped_target(&plan.mappings, element_codename) else {
                    continue;
                };
                for referenced in codenames {
                    if !migrated_map.contains_key(referenced) {
                        let Some(linked) = snapshot.linked_items.get(referenced) else {
                            continue;
                        };
                        if linked.type_codename != plan.source_type {
                            continue;
                        }
                        if !visited.insert(linked.id.clone()) {
                            continue;
                        }
                        let on_demand = MigrationItem {
                            id: linked.id.clone(),
                            name: linked.name.clone(),
                            codename: linked.codename.clone(),
                            type_codename: linked.type_codename.clone(),
                        };
                        log.info(format!(
                            "Migrating {} on demand (referenced by {})",
                            on_demand.codename, item.codename
                        ));
                        let registered_before = registry.len();
                        let outcome = migrator
                            .migrate(
                                &on_demand,
                                &plan.language,
                                &plan.mappings,
                                target_type,
                                true,
                                registry,
                                log,
                            )
                            .await;
                        results.push(item_result(
                            &on_demand,
                            &outcome,
                            registry[registered_before..].to_vec(),
                        ));
                        match &outcome {
                            MigrationOutcome::Success { new_item_codename, .. }
                            | MigrationOutcome::AlreadyMigrated { new_item_codename, .. } => {
                                migrated_map
                                    .insert(on_demand.codename.clone(), new_item_codename.clone());
                                queue.push_back(on_demand);
                            }
                            MigrationOutcome::Failed { .. } => continue,
                        }
                    }
                    let new_target = migrated_map[referenced].clone();
                    if let Err(err) = self
                        .update_item_reference(
                            &migrated,
                            &target_field.codename,
                            referenced,
                            &new_target,
                            &plan.language,
                        )
                        .await
                    {
                        log.warning_with(
                            format!(
                                "Could not rewrite {referenced} -> {new_target} in {migrated}"
                            ),
                            err.to_string(),
                        );
                    } else {
                        log.success(format!(
                            "{migrated}.{}: {referenced} -> {new_target}",
                            target_field.codename
                        ));
                    }
                }
            }
        }
    }

    /// Depth-1 re-read for reference rewriting: the requested language first,
    /// then the repository default, then the configured fallbacks.
    async fn refetch_for_rewrite(
        &self,
        codename: &str,
        language: &str,
    ) -> std::result::Result<Option<ItemSnapshot>, RepositoryError> {
        if let Some(snapshot) = self.repo.fetch_item(codename, Some(language), 1).await? {
            return Ok(Some(snapshot));
        }
        if let Some(snapshot) = self.repo.fetch_item(codename, None, 1).await? {
            return Ok(Some(snapshot));
        }
        for fallback in &self.settings.fallback_languages {
            if fallback == language {
                continue;
            }
            if let Some(snapshot) = self.repo.fetch_item(codename, Some(fallback), 1).await? {
                return Ok(Some(snapshot));
            }
        }
        Ok(None)
    }

    /// Phases 2 and 3: incoming references. Same-type referrers were
    /// migrated, so the rewrite lands in their migrated counterpart;
    /// external referrers are rewritten in place.
    async fn rewrite_incoming(
        &self,
        plan: &MigrationPlan,
        migrated_map: &BTreeMap<String, String>,
        updated_reference_items: &mut BTreeSet<String>,
        external_drafts: &mut Vec<DraftItem>,
        progress: &mut Progress,
        log: &mut RunLog,
    ) {
        for relationship in &plan.relationships {
            let Some(new_target) = migrated_map.get(&relationship.item_codename) else {
                // The referenced item failed to migrate; its incoming
                // references have nothing to point at.
                for incoming in &relationship.incoming {
                    log.warning(format!(
                        "Skipping reference from {}: {} was not migrated",
                        incoming.from_item_codename, relationship.item_codename
                    ));
                    progress.advance();
                }
                continue;
            };

            for incoming in &relationship.incoming {
                if incoming.from_item_type == plan.source_type {
                    // Phase 2: the referrer itself was migrated; fix the
                    // reference inside its migrated counterpart.
                    let Some(migrated_referrer) = migrated_map.get(&incoming.from_item_codename)
                    else {
                        log.warning(format!(
                            "{} references {} but was not migrated itself",
                            incoming.from_item_codename, relationship.item_codename
                        ));
                        progress.advance();
                        continue;
                    };
                    let field = mapped_target(&plan.mappings, &incoming.field)
                        .map(|f| f.codename.clone())
                        .unwrap_or_else(|| incoming.field.clone());
                    match self
                        .update_item_reference(
                            migrated_referrer,
                            &field,
                            &relationship.item_codename,
                            new_target,
                            &plan.language,
                        )
                        .await
                    {
                        Ok(_) => {
                            // The report lists the referencing item, not its
                            // migrated counterpart.
                            updated_reference_items.insert(incoming.from_item_id.clone());
                            log.success(format!(
                                "{migrated_referrer}.{field}: {} -> {new_target}",
                                relationship.item_codename
                            ));
                        }
                        Err(err) => log.warning_with(
                            format!("Could not update reference in {migrated_referrer}"),
                            err.to_string(),
                        ),
                    }
                } else {
                    // Phase 3: external item, rewritten in place in the
                    // language the reference was found in.
                    match self
                        .update_item_reference(
                            &incoming.from_item_codename,
                            &incoming.field,
                            &relationship.item_codename,
                            new_target,
                            &incoming.language,
                        )
                        .await
                    {
                        Ok(updated_id) => {
                            updated_reference_items.insert(updated_id.clone());
                            external_drafts.push(DraftItem {
                                id: updated_id,
                                name: incoming.from_item_name.clone(),
                                codename: incoming.from_item_codename.clone(),
                                type_codename: incoming.from_item_type.clone(),
                                language: incoming.language.clone(),
                                was_auto_migrated: false,
                            });
                            log.success(format!(
                                "{}.{}: {} -> {new_target}",
                                incoming.from_item_codename, incoming.field,
                                relationship.item_codename
                            ));
                        }
                        Err(err) => log.warning_with(
                            format!(
                                "Could not update reference in {}",
                                incoming.from_item_codename
                            ),
                            err.to_string(),
                        ),
                    }
                }
                progress.advance();
            }
        }
    }

    /// Shared rewrite primitive: swap one reference target inside one field
    /// of one item, touching nothing else. Returns the updated item's id.
    async fn update_item_reference(
        &self,
        item_codename: &str,
        field_codename: &str,
        old_codename: &str,
        new_codename: &str,
        language: &str,
    ) -> Result<String> {
        let resolution_error = |detail: String| CoreError::ReferenceResolution {
            item_codename: item_codename.to_string(),
            field: field_codename.to_string(),
            detail,
        };

        let old_id = self
            .repo
            .view_item(old_codename)
            .await?
            .ok_or_else(|| resolution_error(format!("{old_codename} has no management id")))?
            .id;
        let new_id = self
            .repo
            .view_item(new_codename)
            .await?
            .ok_or_else(|| resolution_error(format!("{new_codename} has no management id")))?
            .id;
        let item = self
            .repo
            .view_item(item_codename)
            .await?
            .ok_or_else(|| resolution_error("item not found on the management side".into()))?;

        // The write API addresses elements by id; resolve through the item's
        // own type, which need not be the migration target type.
        let item_type = self.repo.fetch_type_schema_by_id(&item.type_id).await?;
        let element_id = item_type
            .element(field_codename)
            .filter(|f| f.field_type == FieldType::ModularContent)
            .map(|f| f.id.clone())
            .ok_or_else(|| {
                resolution_error(format!(
                    "type {} has no linked-content element {field_codename}",
                    item_type.codename
                ))
            })?;

        let current = self
            .repo
            .view_variant(item_codename, language)
            .await?
            .and_then(|variant| variant.element(&element_id).map(|e| e.value.clone()));
        let rewritten = match current {
            Some(serde_json::Value::Array(refs)) => serde_json::Value::Array(
                refs.into_iter()
                    .map(|r| {
                        if r.get("id").and_then(|v| v.as_str()) == Some(old_id.as_str()) {
                            serde_json::json!({ "id": new_id })
                        } else {
                            r
                        }
                    })
                    .collect(),
            ),
            // No variant (or empty field) in this language yet; the rewrite
            // itself establishes the reference.
            _ => serde_json::json!([{ "id": new_id }]),
        };

        // Published variants reject writes; a fresh draft version fixes that,
        // and the call failing because one already exists is fine.
        if let Err(err) = self.repo.create_new_version(item_codename, language).await {
            tracing::debug!(item = item_codename, error = %err, "new-version call declined");
        }
        self.repo
            .upsert_variant(
                item_codename,
                language,
                &[ElementPayload::by_id(element_id, rewritten)],
            )
            .await?;
        Ok(item.id)
    }
}

fn validate_plan(plan: &MigrationPlan) -> Result<()> {
    if plan.selected_items.is_empty() {
        return Err(CoreError::InvalidPlan {
            reason: "no items selected".to_string(),
        });
    }
    if !plan.mappings.iter().any(|m| m.target_field.is_some()) {
        return Err(CoreError::InvalidPlan {
            reason: "no field mapping has a target".to_string(),
        });
    }
    if plan.language.trim().is_empty() {
        return Err(CoreError::InvalidPlan {
            reason: "migration language is empty".to_string(),
        });
    }
    Ok(())
}

fn mapped_target<'a>(
    mappings: &'a [FieldMapping],
    source_codename: &str,
) -> Option<&'a crate::types::FieldSchema> {
    mappings
        .iter()
        .find(|m| m.source_field.codename == source_codename)
        .and_then(|m| m.target_field.as_ref())
}

fn item_result(
    item: &MigrationItem,
    outcome: &MigrationOutcome,
    created_items: Vec<CreatedItemInfo>,
) -> ItemResult {
    let (status, new_item_id, new_item_codename, message) = match outcome {
        MigrationOutcome::Success {
            new_item_id,
            new_item_codename,
        } => (
            MigrationStatus::Success,
            Some(new_item_id.clone()),
            Some(new_item_codename.clone()),
            format!("migrated as {new_item_codename}"),
        ),
        MigrationOutcome::AlreadyMigrated {
            new_item_id,
            new_item_codename,
        } => (
            MigrationStatus::AlreadyExisted,
            Some(new_item_id.clone()),
            Some(new_item_codename.clone()),
            format!("already migrated as {new_item_codename}"),
        ),
        MigrationOutcome::Failed { error } => {
            (MigrationStatus::Failed, None, None, error.to_string())
        }
    };
    ItemResult {
        item: item.clone(),
        status,
        new_item_id,
        new_item_codename,
        message,
        timestamp: Utc::now(),
        created_items,
    }
}
