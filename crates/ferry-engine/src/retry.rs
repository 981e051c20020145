//! Retry-batch bookkeeping for one run.
//!
//! The coordinator owns an in-memory copy of the job's retry batch for the
//! duration of a run. The recorder asks it for each row's attempt number and
//! for the membership change to persist alongside the outcome.

use std::collections::HashMap;

use ferry_core::entities::{RetryBatch, RetryEntry};
use ferry_core::enums::FailedStage;
use ferry_db::repos::checkpoint::BatchChange;

/// Scope of a run and the per-key attempt numbers it uses.
#[derive(Debug, Default)]
pub struct RetryCoordinator {
    /// Keys in first-failure order.
    order: Vec<String>,
    /// Key → attempt number of the last recorded failure.
    attempts: HashMap<String, u32>,
}

impl RetryCoordinator {
    #[must_use]
    pub fn from_batch(batch: &RetryBatch) -> Self {
        let mut coordinator = Self::default();
        for entry in &batch.entries {
            coordinator.order.push(entry.source_row_key.clone());
            coordinator
                .attempts
                .insert(entry.source_row_key.clone(), entry.attempt);
        }
        coordinator
    }

    /// Keys a retry run is scoped to, in batch order.
    #[must_use]
    pub fn scope(&self) -> &[String] {
        &self.order
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.attempts.contains_key(key)
    }

    /// Attempt number for the next outcome of `key`: one past its last
    /// recorded failure, or 1 for a key that never failed.
    #[must_use]
    pub fn next_attempt(&self, key: &str) -> u32 {
        self.attempts.get(key).map_or(1, |attempt| attempt + 1)
    }

    /// A row failed on `attempt`: add it to the batch or bump its attempt.
    pub fn record_failure(
        &mut self,
        key: &str,
        attempt: u32,
        error: &str,
        stage: FailedStage,
    ) -> BatchChange {
        if self.attempts.insert(key.to_string(), attempt).is_none() {
            self.order.push(key.to_string());
        }
        BatchChange::Upsert(RetryEntry {
            source_row_key: key.to_string(),
            attempt,
            last_error: error.to_string(),
            failed_stage: stage,
        })
    }

    /// A row succeeded: drop it from the batch if it was there.
    pub fn record_success(&mut self, key: &str) -> Option<BatchChange> {
        self.attempts.remove(key)?;
        self.order.retain(|k| k != key);
        Some(BatchChange::Remove {
            source_row_key: key.to_string(),
        })
    }
}
