//! Retry batch repository.
//!
//! Rows of a job that failed and have not yet been retried, in first-failure
//! order. Membership changes are written by checkpoints only.

use ferry_core::entities::{RetryBatch, RetryEntry};

use crate::error::DatabaseError;
use crate::helpers::{get_u32, get_u64, parse_enum};
use crate::store::FerryStore;

impl FerryStore {
    pub async fn get_retry_batch(&self, job_id: &str) -> Result<RetryBatch, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT source_row_key, attempt, last_error, failed_stage
                 FROM retry_batch WHERE job_id = ?1 ORDER BY position",
                [job_id],
            )
            .await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(RetryEntry {
                source_row_key: row.get(0)?,
                attempt: get_u32(&row, 1)?,
                last_error: row.get(2)?,
                failed_stage: parse_enum(&row.get::<String>(3)?)?,
            });
        }
        Ok(RetryBatch {
            job_id: job_id.to_string(),
            entries,
        })
    }

    pub async fn retry_batch_size(&self, job_id: &str) -> Result<u64, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query("SELECT count(*) FROM retry_batch WHERE job_id = ?1", [job_id])
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        get_u64(&row, 0)
    }
}
