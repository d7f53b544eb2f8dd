//! Recast - Content Migration Engine
//!
//! This crate migrates content items between content types in a remote
//! headless repository: it transforms field values across schemas, creates
//! migrated counterparts under deterministic codenames, rewrites the
//! reference graph to point at them, and batch-publishes the resulting
//! drafts.

pub mod client;
pub mod config;
pub mod discover;
pub mod error;
pub mod logging;
pub mod migrate;
pub mod transform;
pub mod types;

pub use client::{ContentRepository, HttpRepository};
pub use config::{MigrationSettings, PublishConfig, RecastConfig, RepositoryConfig};
pub use discover::RelationshipDiscoverer;
pub use error::{ConfigError, CoreError, RepositoryError, Result};
pub use logging::{LogEntry, LogLevel, LogSink, Progress, RunLog};
pub use migrate::{
    BatchPublisher, ItemMigrator, MigrationOrchestrator, MigrationOutcome, MigrationPlan,
    MigrationReport, MigrationStatus, PublishReport,
};
pub use types::{
    migrated_codename, ContentTypeInfo, CreatedItemInfo, DraftItem, FieldMapping, FieldSchema,
    FieldType, FieldValue, ItemRelationship, MigrationItem, RegistrySummary,
};

pub fn recast_reqwest_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("recast/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(30)) // management API calls can be slow under load
        .connect_timeout(std::time::Duration::from_secs(5)) // 5 second connection timeout
        .build()
        .unwrap() // panics for the same reasons Client::new() would: https://docs.rs/reqwest/latest/reqwest/struct.Client.html#panics
}
