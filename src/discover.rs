//! Relationship discovery.
//!
//! Builds the relationship graph the orchestrator plans against: outgoing
//! linked-content references read from a depth-1 item fetch, incoming
//! references from the repository's reverse-reference index confirmed by
//! re-fetching each referrer and locating the exact field that holds the
//! reference. The graph is computed fresh per run and never cached.

use std::sync::Arc;

use crate::client::ContentRepository;
use crate::error::Result;
use crate::logging::RunLog;
use crate::types::{
    FieldType, FieldValue, IncomingRelationship, ItemRelationship, ItemSnapshot, MigrationItem,
    RelatedItem, RelationshipInfo,
};

pub struct RelationshipDiscoverer {
    repo: Arc<dyn ContentRepository>,
    language: String,
}

impl RelationshipDiscoverer {
    pub fn new(repo: Arc<dyn ContentRepository>, language: impl Into<String>) -> Self {
        Self {
            repo,
            language: language.into(),
        }
    }

    /// Discovers outgoing and incoming references for each given item.
    /// Items with neither are omitted from the result. Failures on a single
    /// item are logged and skipped, never fatal to the whole pass.
    pub async fn discover(
        &self,
        items: &[MigrationItem],
        log: &mut RunLog,
    ) -> Result<Vec<ItemRelationship>> {
        let mut graph = Vec::new();

        for item in items {
            let snapshot = match self
                .repo
                .fetch_item(&item.codename, Some(&self.language), 1)
                .await
            {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    log.warning(format!(
                        "Skipping relationship scan for {}: no data in language {}",
                        item.codename, self.language
                    ));
                    continue;
                }
                Err(err) => {
                    log.warning_with(
                        format!("Relationship scan failed for {}", item.codename),
                        err.to_string(),
                    );
                    continue;
                }
            };

            let outgoing = outgoing_references(&snapshot);
            let incoming = self.incoming_references(item, log).await;

            if outgoing.is_empty() && incoming.is_empty() {
                continue;
            }
            log.info(format!(
                "{}: {} outgoing field(s), {} incoming reference(s)",
                item.codename,
                outgoing.len(),
                incoming.len()
            ));
            graph.push(ItemRelationship {
                item_id: snapshot.system.id,
                item_name: snapshot.system.name,
                item_codename: snapshot.system.codename,
                item_type: snapshot.system.type_codename,
                outgoing,
                incoming,
            });
        }

        Ok(graph)
    }

    /// Confirms each entry of the reverse-reference index by re-fetching the
    /// referrer and locating the linked-content field that actually holds the
    /// codename. Referrers with no variant in the requested language fall
    /// back to the repository default and are flagged as needing one.
    async fn incoming_references(
        &self,
        item: &MigrationItem,
        log: &mut RunLog,
    ) -> Vec<IncomingRelationship> {
        let referrers = match self.repo.fetch_referenced_by(&item.codename).await {
            Ok(referrers) => referrers,
            Err(err) => {
                log.warning_with(
                    format!("Reverse-reference lookup failed for {}", item.codename),
                    err.to_string(),
                );
                return Vec::new();
            }
        };

        let mut incoming = Vec::new();
        for referrer in referrers {
            let (snapshot, needs_language_variant) =
                match self.fetch_with_fallback(&referrer.codename).await {
                    Ok(Some(found)) => found,
                    Ok(None) => {
                        log.warning(format!(
                            "Referrer {} unreadable in any language, skipped",
                            referrer.codename
                        ));
                        continue;
                    }
                    Err(err) => {
                        log.warning_with(
                            format!("Could not re-read referrer {}", referrer.codename),
                            err.to_string(),
                        );
                        continue;
                    }
                };
            for (element_codename, element) in &snapshot.elements {
                if element.field_type != FieldType::ModularContent {
                    continue;
                }
                let FieldValue::References(codenames) = &element.value else {
                    continue;
                };
                if !codenames.iter().any(|c| c == &item.codename) {
                    continue;
                }
                incoming.push(IncomingRelationship {
                    from_item_id: snapshot.system.id.clone(),
                    from_item_name: snapshot.system.name.clone(),
                    from_item_codename: snapshot.system.codename.clone(),
                    from_item_type: snapshot.system.type_codename.clone(),
                    field: element_codename.clone(),
                    language: snapshot
                        .system
                        .language
                        .clone()
                        .unwrap_or_else(|| self.language.clone()),
                    needs_language_variant,
                });
            }
        }
        incoming
    }

    /// Requested language first, repository default second. The boolean marks
    /// whether the fallback was taken.
    async fn fetch_with_fallback(
        &self,
        codename: &str,
    ) -> Result<Option<(ItemSnapshot, bool)>> {
        if let Some(snapshot) = self
            .repo
            .fetch_item(codename, Some(&self.language), 0)
            .await?
        {
            // The delivery side serves the default-language variant under a
            // requested language it has no variant for; trust the reported
            // language, not the request.
            let fell_back = snapshot
                .system
                .language
                .as_deref()
                .is_some_and(|l| l != self.language);
            return Ok(Some((snapshot, fell_back)));
        }
        Ok(self
            .repo
            .fetch_item(codename, None, 0)
            .await?
            .map(|snapshot| (snapshot, true)))
    }
}

/// Outgoing references off a depth-1 snapshot: every non-empty
/// linked-content field, with related items resolved from the expansion
/// payload where present.
fn outgoing_references(snapshot: &ItemSnapshot) -> Vec<RelationshipInfo> {
    let mut outgoing = Vec::new();
    for element in snapshot.elements.values() {
        if element.field_type != FieldType::ModularContent {
            continue;
        }
        let FieldValue::References(codenames) = &element.value else {
            continue;
        };
        if codenames.is_empty() {
            continue;
        }
        let related_items = codenames
            .iter()
            .map(|codename| match snapshot.linked_items.get(codename) {
                Some(system) => RelatedItem {
                    id: system.id.clone(),
                    name: system.name.clone(),
                    codename: system.codename.clone(),
                    type_codename: system.type_codename.clone(),
                },
                // Unexpanded reference (deleted target or depth exhausted):
                // keep the codename so rewriting still sees it.
                None => RelatedItem {
                    id: String::new(),
                    name: codename.clone(),
                    codename: codename.clone(),
                    type_codename: String::new(),
                },
            })
            .collect();
        outgoing.push(RelationshipInfo {
            field_name: element.name.clone(),
            field_type: element.field_type,
            related_items,
        });
    }
    outgoing
}
