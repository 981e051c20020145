use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{FailedStage, OutcomeStatus};

/// Result of one attempt at migrating one row. Immutable once recorded.
///
/// `error_message` and `failed_stage` are present iff `status` is `failed`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RowOutcome {
    pub id: String,
    pub job_id: String,
    pub run_id: String,
    pub source_row_key: String,
    /// Pass number for this key: 1 on the initial run, incremented per retry pass.
    pub attempt: u32,
    pub status: OutcomeStatus,
    pub error_message: Option<String>,
    pub failed_stage: Option<FailedStage>,
    /// In-process write tries spent on this attempt (0 when the row never reached the loader).
    pub load_tries: u32,
    pub created_at: DateTime<Utc>,
}

impl RowOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success)
    }
}
