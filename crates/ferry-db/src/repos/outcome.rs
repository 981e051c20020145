//! Row outcome log: queries and JSON Lines export.

use std::path::Path;

use ferry_core::entities::RowOutcome;

use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, get_u32, parse_datetime, parse_enum};
use crate::store::FerryStore;

const SELECT_COLS: &str = "id, job_id, run_id, source_row_key, attempt, status, error_message, \
     failed_stage, load_tries, created_at";

fn row_to_outcome(row: &libsql::Row) -> Result<RowOutcome, DatabaseError> {
    Ok(RowOutcome {
        id: row.get(0)?,
        job_id: row.get(1)?,
        run_id: row.get(2)?,
        source_row_key: row.get(3)?,
        attempt: get_u32(row, 4)?,
        status: parse_enum(&row.get::<String>(5)?)?,
        error_message: get_opt_string(row, 6)?,
        failed_stage: get_opt_string(row, 7)?
            .map(|s| parse_enum(&s))
            .transpose()?,
        load_tries: get_u32(row, 8)?,
        created_at: parse_datetime(&row.get::<String>(9)?)?,
    })
}

impl FerryStore {
    /// Outcomes of a job in recording order.
    pub async fn list_outcomes(
        &self,
        job_id: &str,
        failed_only: bool,
        limit: Option<u32>,
    ) -> Result<Vec<RowOutcome>, DatabaseError> {
        let status_clause = if failed_only { " AND status = 'failed'" } else { "" };
        let limit_clause = limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default();
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM row_outcomes WHERE job_id = ?1{status_clause} \
                     ORDER BY rowid{limit_clause}"
                ),
                [job_id],
            )
            .await?;
        let mut outcomes = Vec::new();
        while let Some(row) = rows.next().await? {
            outcomes.push(row_to_outcome(&row)?);
        }
        Ok(outcomes)
    }

    /// Every attempt recorded for one source row, in attempt order.
    pub async fn outcomes_for_key(
        &self,
        job_id: &str,
        source_row_key: &str,
    ) -> Result<Vec<RowOutcome>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM row_outcomes \
                     WHERE job_id = ?1 AND source_row_key = ?2 ORDER BY attempt, rowid"
                ),
                [job_id, source_row_key],
            )
            .await?;
        let mut outcomes = Vec::new();
        while let Some(row) = rows.next().await? {
            outcomes.push(row_to_outcome(&row)?);
        }
        Ok(outcomes)
    }

    /// Write a job's outcome log to `path` as JSON Lines. Returns the line count.
    pub async fn export_outcomes_jsonl(
        &self,
        job_id: &str,
        failed_only: bool,
        path: &Path,
    ) -> Result<usize, DatabaseError> {
        let outcomes = self.list_outcomes(job_id, failed_only, None).await?;
        serde_jsonlines::write_json_lines(path, &outcomes)?;
        tracing::info!(job_id, path = %path.display(), lines = outcomes.len(), "outcome log exported");
        Ok(outcomes.len())
    }
}

#[cfg(test)]
mod tests {
    use ferry_core::enums::{FailedStage, OutcomeStatus};
    use ferry_core::progress::{JobCounters, RunCounters};
    use tempfile::TempDir;

    use crate::repos::checkpoint::{Checkpoint, NewRowOutcome};
    use crate::test_support::{seed_job, test_store};

    use super::*;

    async fn store_with_outcomes() -> (FerryStore, String) {
        let store = test_store().await;
        let (job, run) = seed_job(&store).await;
        store
            .start_run(&job.id, &run.id, JobCounters::default())
            .await
            .unwrap();
        let outcome = |key: &str, ok: bool| NewRowOutcome {
            source_row_key: key.into(),
            attempt: 1,
            status: if ok { OutcomeStatus::Success } else { OutcomeStatus::Failed },
            error_message: (!ok).then(|| "field 'Email' (from 'email'): expected string".into()),
            failed_stage: (!ok).then_some(FailedStage::Transform),
            load_tries: u32::from(ok),
        };
        store
            .checkpoint(&Checkpoint {
                job_id: job.id.clone(),
                run_id: run.id.clone(),
                outcomes: vec![outcome("a", true), outcome("b", false), outcome("c", true)],
                batch_changes: Vec::new(),
                counters: JobCounters {
                    total_rows: None,
                    processed_rows: 3,
                    successful_rows: 2,
                    failed_row_count: 1,
                },
                run_counters: RunCounters {
                    processed_rows: 3,
                    successful_rows: 2,
                    failed_row_count: 1,
                },
            })
            .await
            .unwrap();
        (store, job.id)
    }

    #[tokio::test]
    async fn list_filters_failed_and_limits() {
        let (store, job_id) = store_with_outcomes().await;
        let all = store.list_outcomes(&job_id, false, None).await.unwrap();
        let keys: Vec<_> = all.iter().map(|o| o.source_row_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert!(all.iter().all(|o| o.id.starts_with("out-")));

        let failed = store.list_outcomes(&job_id, true, None).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].failed_stage, Some(FailedStage::Transform));
        assert_eq!(failed[0].load_tries, 0);

        assert_eq!(store.list_outcomes(&job_id, false, Some(2)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn export_writes_one_line_per_outcome() {
        let (store, job_id) = store_with_outcomes().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("outcomes.jsonl");

        let written = store.export_outcomes_jsonl(&job_id, false, &path).await.unwrap();
        assert_eq!(written, 3);

        let read: Vec<RowOutcome> = serde_jsonlines::json_lines(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(read, store.list_outcomes(&job_id, false, None).await.unwrap());
    }
}
