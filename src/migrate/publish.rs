//! Batch publishing of draft items.
//!
//! Downstream webhook consumers choke on publish bursts, so drafts go out in
//! small sequential batches with a pause in between. Per-item failures are
//! collected, never fatal; an item observed published once in this session is
//! not published again.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::ContentRepository;
use crate::config::PublishConfig;
use crate::logging::RunLog;
use crate::types::DraftItem;

/// Result of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub published: Vec<String>,
    pub failed: Vec<String>,
    pub errors: Vec<String>,
}

/// Aggregate over all batches of one publish pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    pub batches: Vec<BatchOutcome>,
    pub published_total: usize,
    pub failed_total: usize,
}

pub struct BatchPublisher {
    repo: Arc<dyn ContentRepository>,
    config: PublishConfig,
    published: BTreeSet<String>,
}

impl BatchPublisher {
    pub fn new(repo: Arc<dyn ContentRepository>, config: PublishConfig) -> Self {
        Self {
            repo,
            config,
            published: BTreeSet::new(),
        }
    }

    /// Publishes the given drafts in clamped-size batches, pausing between
    /// batches but not after the last.
    pub async fn publish_all(&mut self, items: &[DraftItem], log: &mut RunLog) -> PublishReport {
        let batch_size = self.config.clamped_batch_size();
        let mut report = PublishReport::default();
        let batches: Vec<&[DraftItem]> = items.chunks(batch_size).collect();
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            log.info(format!(
                "Publishing batch {}/{batch_count} ({} item(s))",
                index + 1,
                batch.len()
            ));
            let outcome = self.publish_batch(batch, log).await;
            report.published_total += outcome.published.len();
            report.failed_total += outcome.failed.len();
            report.batches.push(outcome);

            if index + 1 < batch_count {
                tokio::time::sleep(self.config.inter_batch_delay()).await;
            }
        }
        log.success(format!(
            "Published {} item(s), {} failure(s)",
            report.published_total, report.failed_total
        ));
        report
    }

    async fn publish_batch(&mut self, batch: &[DraftItem], log: &mut RunLog) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for item in batch {
            if self.published.contains(&item.id) {
                log.info(format!("{} already published this session", item.codename));
                continue;
            }
            match self.repo.publish(&item.id, &item.language).await {
                Ok(()) => {
                    self.published.insert(item.id.clone());
                    outcome.published.push(item.id.clone());
                }
                Err(err) => {
                    log.warning_with(
                        format!("Publish failed for {}", item.codename),
                        err.to_string(),
                    );
                    outcome.failed.push(item.id.clone());
                    outcome.errors.push(format!("{}: {err}", item.codename));
                }
            }
        }
        outcome
    }
}
