//! Checkpoints: one transaction per batch of recorded row outcomes.
//!
//! A checkpoint appends the outcomes, applies the matching retry-batch
//! membership changes, and overwrites the job and run counters, so a reader of
//! the database never sees outcomes without the counters that account for them.

use chrono::Utc;

use ferry_core::entities::RetryEntry;
use ferry_core::enums::{FailedStage, OutcomeStatus};
use ferry_core::progress::{JobCounters, RunCounters};

use crate::error::DatabaseError;
use crate::helpers::sql_int;
use crate::store::FerryStore;

/// A row outcome about to be appended to the log. The id is assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRowOutcome {
    pub source_row_key: String,
    pub attempt: u32,
    pub status: OutcomeStatus,
    pub error_message: Option<String>,
    pub failed_stage: Option<FailedStage>,
    pub load_tries: u32,
}

/// Change to one key's retry-batch membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchChange {
    /// Add the key, or refresh attempt and error if already present. A key
    /// keeps its original position.
    Upsert(RetryEntry),
    Remove { source_row_key: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pub job_id: String,
    pub run_id: String,
    pub outcomes: Vec<NewRowOutcome>,
    pub batch_changes: Vec<BatchChange>,
    pub counters: JobCounters,
    pub run_counters: RunCounters,
}

impl FerryStore {
    /// Persist a checkpoint atomically.
    ///
    /// Returns whether a cancel has been requested for the job, so the caller
    /// can observe cancels issued by other processes.
    pub async fn checkpoint(&self, cp: &Checkpoint) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();

        {
            let _guard = self.write().await;
            let tx = self.db().conn().transaction().await?;

            for outcome in &cp.outcomes {
                tx.execute(
                    "INSERT INTO row_outcomes (id, job_id, run_id, source_row_key, attempt, status,
                                               error_message, failed_stage, load_tries, created_at)
                     VALUES ('out-' || lower(hex(randomblob(8))), ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    libsql::params![
                        cp.job_id.as_str(),
                        cp.run_id.as_str(),
                        outcome.source_row_key.as_str(),
                        i64::from(outcome.attempt),
                        outcome.status.as_str(),
                        outcome.error_message.as_deref(),
                        outcome.failed_stage.map(FailedStage::as_str),
                        i64::from(outcome.load_tries),
                        now.as_str()
                    ],
                )
                .await?;
            }

            for change in &cp.batch_changes {
                match change {
                    BatchChange::Upsert(entry) => {
                        tx.execute(
                            "INSERT INTO retry_batch (job_id, source_row_key, attempt, last_error,
                                                      failed_stage, position)
                             VALUES (?1, ?2, ?3, ?4, ?5,
                                     (SELECT COALESCE(MAX(position), 0) + 1
                                      FROM retry_batch WHERE job_id = ?1))
                             ON CONFLICT(job_id, source_row_key) DO UPDATE SET
                                 attempt = excluded.attempt,
                                 last_error = excluded.last_error,
                                 failed_stage = excluded.failed_stage",
                            libsql::params![
                                cp.job_id.as_str(),
                                entry.source_row_key.as_str(),
                                i64::from(entry.attempt),
                                entry.last_error.as_str(),
                                entry.failed_stage.as_str()
                            ],
                        )
                        .await?;
                    }
                    BatchChange::Remove { source_row_key } => {
                        tx.execute(
                            "DELETE FROM retry_batch WHERE job_id = ?1 AND source_row_key = ?2",
                            libsql::params![cp.job_id.as_str(), source_row_key.as_str()],
                        )
                        .await?;
                    }
                }
            }

            tx.execute(
                "UPDATE jobs SET total_rows = ?1, processed_rows = ?2, successful_rows = ?3,
                        failed_row_count = ?4
                 WHERE id = ?5",
                libsql::params![
                    cp.counters.total_rows.map(sql_int),
                    sql_int(cp.counters.processed_rows),
                    sql_int(cp.counters.successful_rows),
                    sql_int(cp.counters.failed_row_count),
                    cp.job_id.as_str()
                ],
            )
            .await?;
            tx.execute(
                "UPDATE job_runs SET processed_rows = ?1, successful_rows = ?2, failed_row_count = ?3
                 WHERE id = ?4",
                libsql::params![
                    sql_int(cp.run_counters.processed_rows),
                    sql_int(cp.run_counters.successful_rows),
                    sql_int(cp.run_counters.failed_row_count),
                    cp.run_id.as_str()
                ],
            )
            .await?;

            tx.commit().await?;
        }

        tracing::debug!(
            job_id = %cp.job_id,
            run_id = %cp.run_id,
            outcomes = cp.outcomes.len(),
            processed = cp.counters.processed_rows,
            "checkpoint written"
        );
        self.is_cancel_requested(&cp.job_id).await
    }
}
