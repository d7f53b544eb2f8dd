//! Single-item migration.
//!
//! Creates (or resolves) the migrated counterpart of one source item:
//! deterministic codename, existence probe, language-fallback source fetch,
//! transformed element upsert, registry entry. Every terminal state is a
//! value; callers decide what a `Failed` item means for the rest of the run.

use crate::client::ContentRepository;
use crate::error::{CoreError, RepositoryError};
use crate::logging::RunLog;
use crate::transform::build_elements;
use crate::types::{
    migrated_codename, ContentTypeInfo, CreatedItemInfo, ElementPayload, FieldMapping, FieldType,
    ItemSnapshot, MigrationItem,
};

/// Terminal state of one item migration.
#[derive(Debug)]
pub enum MigrationOutcome {
    /// Item and variant freshly created this run.
    Success {
        new_item_id: String,
        new_item_codename: String,
    },
    /// The migrated counterpart already existed; nothing was written.
    AlreadyMigrated {
        new_item_id: String,
        new_item_codename: String,
    },
    /// This item could not be migrated; siblings proceed.
    Failed { error: CoreError },
}

pub struct ItemMigrator<'a> {
    repo: &'a dyn ContentRepository,
    fallback_languages: &'a [String],
}

impl<'a> ItemMigrator<'a> {
    pub fn new(repo: &'a dyn ContentRepository, fallback_languages: &'a [String]) -> Self {
        Self {
            repo,
            fallback_languages,
        }
    }

    /// Migrates one item, appending exactly one registry entry on any
    /// non-failure outcome. Never writes over an existing variant.
    #[allow(clippy::too_many_arguments)]
    pub async fn migrate(
        &self,
        item: &MigrationItem,
        language: &str,
        mappings: &[FieldMapping],
        target_type: &ContentTypeInfo,
        was_auto_migrated: bool,
        registry: &mut Vec<CreatedItemInfo>,
        log: &mut RunLog,
    ) -> MigrationOutcome {
        // Re-entry guard: the same source item resolves to its earlier
        // registry entry instead of probing again.
        if let Some(entry) = registry
            .iter()
            .find(|e| e.original_codename == item.codename)
        {
            return MigrationOutcome::AlreadyMigrated {
                new_item_id: entry.new_id.clone(),
                new_item_codename: entry.new_codename.clone(),
            };
        }

        let new_codename = migrated_codename(&item.codename);
        if let Some(entry) = registry.iter().find(|e| e.new_codename == new_codename) {
            return MigrationOutcome::Failed {
                error: CoreError::CodenameCollision {
                    codename: new_codename,
                    first_source: entry.original_codename.clone(),
                    second_source: item.codename.clone(),
                },
            };
        }

        match self
            .migrate_inner(item, &new_codename, language, mappings, target_type, log)
            .await
        {
            Ok(Migrated {
                new_item_id,
                already_existed,
            }) => {
                registry.push(CreatedItemInfo {
                    original_codename: item.codename.clone(),
                    original_name: item.name.clone(),
                    original_type: item.type_codename.clone(),
                    new_codename: new_codename.clone(),
                    new_name: item.name.clone(),
                    new_type: target_type.codename.clone(),
                    new_id: new_item_id.clone(),
                    was_auto_migrated,
                    already_existed,
                });
                if already_existed {
                    log.info(format!(
                        "{} already migrated as {}, skipping",
                        item.codename, new_codename
                    ));
                    MigrationOutcome::AlreadyMigrated {
                        new_item_id,
                        new_item_codename: new_codename,
                    }
                } else {
                    log.success(format!("Migrated {} -> {}", item.codename, new_codename));
                    MigrationOutcome::Success {
                        new_item_id,
                        new_item_codename: new_codename,
                    }
                }
            }
            Err(error) => {
                log.error_with(format!("Migration failed for {}", item.codename), error.to_string());
                MigrationOutcome::Failed { error }
            }
        }
    }

    async fn migrate_inner(
        &self,
        item: &MigrationItem,
        new_codename: &str,
        language: &str,
        mappings: &[FieldMapping],
        target_type: &ContentTypeInfo,
        log: &mut RunLog,
    ) -> Result<Migrated, CoreError> {
        // Existence probe: item plus the migration-language variant. An item
        // shell without the variant is reused, not recreated.
        let existing = self.repo.view_item(new_codename).await?;
        if let Some(existing) = &existing {
            // An unrelated item of another type already owns the codename;
            // treating it as the migrated counterpart would overwrite it.
            if !target_type.id.is_empty() && existing.type_id != target_type.id {
                return Err(CoreError::CodenameCollision {
                    codename: new_codename.to_string(),
                    first_source: format!("an existing item of type {}", existing.type_id),
                    second_source: item.codename.clone(),
                });
            }
            if self
                .repo
                .view_variant(new_codename, language)
                .await?
                .is_some()
            {
                return Ok(Migrated {
                    new_item_id: existing.id.clone(),
                    already_existed: true,
                });
            }
        }

        let elements = self
            .source_elements(item, language, mappings, target_type, log)
            .await?;

        let new_item_id = match existing {
            Some(existing) => existing.id,
            None => {
                self.repo
                    .create_item(&item.name, Some(new_codename), &target_type.codename)
                    .await?
                    .id
            }
        };
        self.repo
            .upsert_variant(new_codename, language, &elements)
            .await?;

        Ok(Migrated {
            new_item_id,
            already_existed: false,
        })
    }

    /// Fetches the source and builds the new variant's element list. Falls
    /// back through the configured language chain; as a last resort the
    /// management-side item shell yields a defaults-only variant.
    async fn source_elements(
        &self,
        item: &MigrationItem,
        language: &str,
        mappings: &[FieldMapping],
        target_type: &ContentTypeInfo,
        log: &mut RunLog,
    ) -> Result<Vec<ElementPayload>, CoreError> {
        let mut languages_tried = Vec::new();
        if let Some(snapshot) = self
            .fetch_source(&item.codename, language, &mut languages_tried)
            .await?
        {
            if let Some(actual) = &snapshot.system.language {
                if actual != language {
                    log.warning(format!(
                        "{} read from language {actual} (no {language} variant)",
                        item.codename
                    ));
                }
            }
            let mut elements = build_elements(mappings, &snapshot.elements, target_type, log);
            substitute_name(&mut elements, mappings, target_type, &snapshot.system.name);
            return Ok(elements);
        }

        // Delivery-side data is gone in every language; the management shell
        // still names the item, so migrate a defaults-only variant.
        if let Some(managed) = self
            .repo
            .view_item(&item.codename)
            .await?
        {
            log.warning(format!(
                "{} has no readable content, migrating name and defaults only",
                item.codename
            ));
            let mut elements = build_elements(&[], &Default::default(), target_type, log);
            substitute_name(&mut elements, &[], target_type, &managed.name);
            return Ok(elements);
        }

        Err(CoreError::SourceNotFound {
            codename: item.codename.clone(),
            languages_tried,
        })
    }

    async fn fetch_source(
        &self,
        codename: &str,
        language: &str,
        languages_tried: &mut Vec<String>,
    ) -> Result<Option<ItemSnapshot>, RepositoryError> {
        languages_tried.push(language.to_string());
        if let Some(snapshot) = self.repo.fetch_item(codename, Some(language), 0).await? {
            return Ok(Some(snapshot));
        }
        languages_tried.push("(default)".to_string());
        if let Some(snapshot) = self.repo.fetch_item(codename, None, 0).await? {
            return Ok(Some(snapshot));
        }
        for fallback in self.fallback_languages {
            if fallback == language {
                continue;
            }
            languages_tried.push(fallback.clone());
            if let Some(snapshot) = self.repo.fetch_item(codename, Some(fallback), 0).await? {
                return Ok(Some(snapshot));
            }
        }
        Ok(None)
    }
}

struct Migrated {
    new_item_id: String,
    already_existed: bool,
}

/// An unmapped text field named `name` receives the source item's display
/// name instead of the empty-string default.
fn substitute_name(
    elements: &mut [ElementPayload],
    mappings: &[FieldMapping],
    target_type: &ContentTypeInfo,
    source_name: &str,
) {
    let Some(name_field) = target_type
        .element("name")
        .filter(|f| f.field_type == FieldType::Text)
    else {
        return;
    };
    let mapped = mappings.iter().any(|m| {
        m.target_field
            .as_ref()
            .is_some_and(|t| t.codename == name_field.codename)
    });
    if mapped {
        return;
    }
    if let Some(payload) = elements
        .iter_mut()
        .find(|e| e.codename() == Some(name_field.codename.as_str()))
    {
        payload.value = serde_json::json!(source_name);
    }
}
