//! Migration execution: per-item migrator, run orchestrator, batch publisher.
//!
//! The orchestrator owns a run end to end; the item migrator and publisher
//! are its single-responsibility collaborators. All run state (registry,
//! migrated-codename map, progress, log) lives on the stack of one `run`
//! call and is handed back in the report.

mod item;
mod orchestrator;
mod publish;

pub use item::{ItemMigrator, MigrationOutcome};
pub use orchestrator::{
    ItemResult, MigrationOrchestrator, MigrationPlan, MigrationReport, MigrationStatus,
};
pub use publish::{BatchOutcome, BatchPublisher, PublishReport};
