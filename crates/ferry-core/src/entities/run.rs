use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{JobStatus, RunKind};

/// One execution of the pipeline for a job: the initial run or a retry pass.
///
/// Counters here are local to the run; the job's counters are the cumulative view.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct JobRun {
    pub id: String,
    pub job_id: String,
    pub kind: RunKind,
    pub status: JobStatus,
    /// Number of rows in scope for a retry run; `None` for initial runs.
    pub scope_size: Option<u64>,
    pub processed_rows: u64,
    pub successful_rows: u64,
    pub failed_row_count: u64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
