//! Repository client facade.
//!
//! The engine reaches the remote content repository through two logical
//! surfaces folded into one trait: delivery-side reads (item data, reverse
//! references) and management-side mutations (items, variants, workflow).
//! Every operation is an idempotent, retryable primitive; the facade itself
//! never retries; the orchestrator isolates each unit of work instead.

mod http;

pub use http::HttpRepository;

use async_trait::async_trait;

use crate::error::RepositoryError;
use crate::types::{
    ContentTypeInfo, ElementPayload, ItemSnapshot, ManagedItem, ManagedVariant, MigrationItem,
};

#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Full element data for one item in one language. `language: None` asks
    /// for the repository default; `depth: 1` includes the one-level
    /// linked-content expansion payload. `Ok(None)` when the item (or the
    /// requested variant) does not exist.
    async fn fetch_item(
        &self,
        codename: &str,
        language: Option<&str>,
        depth: u8,
    ) -> Result<Option<ItemSnapshot>, RepositoryError>;

    /// Live schema for a content type.
    async fn fetch_type_schema(&self, codename: &str)
        -> Result<ContentTypeInfo, RepositoryError>;

    /// Same, addressed by the type's id (the management API reports an item's
    /// type as an id, not a codename).
    async fn fetch_type_schema_by_id(&self, id: &str)
        -> Result<ContentTypeInfo, RepositoryError>;

    /// Every item, across all types and languages, referencing the given item
    /// in any linked-content field. Expensive; call once per selected item.
    async fn fetch_referenced_by(
        &self,
        codename: &str,
    ) -> Result<Vec<MigrationItem>, RepositoryError>;

    /// Management-side item shell, used as the existence probe and for
    /// codename-to-id resolution. `Ok(None)` when absent.
    async fn view_item(&self, codename: &str) -> Result<Option<ManagedItem>, RepositoryError>;

    /// Creates a new content item shell. An omitted codename is derived by
    /// the repository from the name; pass one explicitly when the
    /// deterministic migrated naming scheme is required.
    async fn create_item(
        &self,
        name: &str,
        codename: Option<&str>,
        type_codename: &str,
    ) -> Result<ManagedItem, RepositoryError>;

    /// Current element list of a language variant, id-keyed. `Ok(None)` when
    /// the variant does not exist.
    async fn view_variant(
        &self,
        item_codename: &str,
        language: &str,
    ) -> Result<Option<ManagedVariant>, RepositoryError>;

    /// Creates or replaces variant element values. Partial element lists are
    /// supported: one field can be updated without resending the rest.
    async fn upsert_variant(
        &self,
        item_codename: &str,
        language: &str,
        elements: &[ElementPayload],
    ) -> Result<(), RepositoryError>;

    /// Creates a new (draft) version of a possibly-published variant. Callers
    /// invoke this proactively before mutating and swallow the already-draft
    /// failure.
    async fn create_new_version(
        &self,
        item_codename: &str,
        language: &str,
    ) -> Result<(), RepositoryError>;

    /// Moves a variant to the terminal published workflow step.
    async fn publish(&self, item_id: &str, language: &str) -> Result<(), RepositoryError>;
}
