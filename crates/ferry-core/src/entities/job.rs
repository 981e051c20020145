use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::JobStatus;
use crate::mapping::ColumnMapping;
use crate::progress::percent_complete;

/// What a caller submits to create a job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct JobSpec {
    /// Display name; defaults to `"<source_entity> to <dest_entity>"`.
    #[serde(default)]
    pub name: Option<String>,
    pub source_environment_id: String,
    pub dest_environment_id: String,
    pub source_entity: String,
    pub dest_entity: String,
    pub mapping: ColumnMapping,
}

impl JobSpec {
    /// Name the job will be stored under.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{} to {}", self.source_entity, self.dest_entity),
        }
    }
}

/// One requested migration and its cumulative counters.
///
/// `processed_rows == successful_rows + failed_row_count` at every observation,
/// and `processed_rows <= total_rows` once the total is known.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub source_environment_id: String,
    pub dest_environment_id: String,
    pub source_entity: String,
    pub dest_entity: String,
    pub mapping: ColumnMapping,
    pub status: JobStatus,
    pub total_rows: Option<u64>,
    pub processed_rows: u64,
    pub successful_rows: u64,
    pub failed_row_count: u64,
    pub current_run_id: Option<String>,
    pub last_error: Option<String>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    #[must_use]
    pub fn percent_complete(&self) -> Option<u8> {
        percent_complete(self.processed_rows, self.total_rows)
    }
}

/// List-view shape of a job, with environment names resolved and live progress.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct JobSummary {
    pub id: String,
    pub name: String,
    pub status: JobStatus,
    pub total_rows: Option<u64>,
    pub processed_rows: u64,
    pub successful_rows: u64,
    pub failed_row_count: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub source_environment_name: String,
    pub dest_environment_name: String,
    pub percent_complete: Option<u8>,
    /// Rows per second for the active run; absent when unavailable.
    pub rows_per_second: Option<f64>,
}
