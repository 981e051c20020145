use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::FailedStage;

/// A failed row waiting for a retry pass.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RetryEntry {
    pub source_row_key: String,
    /// Attempt number of the most recent failure.
    pub attempt: u32,
    pub last_error: String,
    pub failed_stage: FailedStage,
}

/// The rows of a job currently in "failed, not yet retried" state, in
/// first-failure order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RetryBatch {
    pub job_id: String,
    pub entries: Vec<RetryEntry>,
}

impl RetryBatch {
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.source_row_key.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
