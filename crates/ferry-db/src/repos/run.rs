//! Job run repository.

use ferry_core::entities::JobRun;

use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, get_opt_u64, get_u64, parse_datetime, parse_enum, parse_optional_datetime, sql_int};
use crate::store::FerryStore;

pub(crate) const SELECT_COLS: &str = "id, job_id, kind, status, scope_size, processed_rows, \
     successful_rows, failed_row_count, error, created_at, started_at, completed_at";

pub(crate) fn row_to_run(row: &libsql::Row) -> Result<JobRun, DatabaseError> {
    Ok(JobRun {
        id: row.get(0)?,
        job_id: row.get(1)?,
        kind: parse_enum(&row.get::<String>(2)?)?,
        status: parse_enum(&row.get::<String>(3)?)?,
        scope_size: get_opt_u64(row, 4)?,
        processed_rows: get_u64(row, 5)?,
        successful_rows: get_u64(row, 6)?,
        failed_row_count: get_u64(row, 7)?,
        error: get_opt_string(row, 8)?,
        created_at: parse_datetime(&row.get::<String>(9)?)?,
        started_at: parse_optional_datetime(get_opt_string(row, 10)?.as_deref())?,
        completed_at: parse_optional_datetime(get_opt_string(row, 11)?.as_deref())?,
    })
}

/// Insert a run on `conn`, which may be an open transaction.
pub(crate) async fn insert_run(conn: &libsql::Connection, run: &JobRun) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO job_runs ({SELECT_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        ),
        libsql::params![
            run.id.as_str(),
            run.job_id.as_str(),
            run.kind.as_str(),
            run.status.as_str(),
            run.scope_size.map(sql_int),
            sql_int(run.processed_rows),
            sql_int(run.successful_rows),
            sql_int(run.failed_row_count),
            run.error.as_deref(),
            run.created_at.to_rfc3339(),
            run.started_at.map(|t| t.to_rfc3339()),
            run.completed_at.map(|t| t.to_rfc3339())
        ],
    )
    .await?;
    Ok(())
}

impl FerryStore {
    pub async fn get_run(&self, id: &str) -> Result<JobRun, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(&format!("SELECT {SELECT_COLS} FROM job_runs WHERE id = ?1"), [id])
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        row_to_run(&row)
    }

    /// All runs of a job, oldest first.
    pub async fn list_runs(&self, job_id: &str) -> Result<Vec<JobRun>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM job_runs WHERE job_id = ?1 ORDER BY created_at, rowid"
                ),
                [job_id],
            )
            .await?;
        let mut runs = Vec::new();
        while let Some(row) = rows.next().await? {
            runs.push(row_to_run(&row)?);
        }
        Ok(runs)
    }

    /// Runs still waiting for the run slot, in submission order.
    pub async fn queued_runs(&self) -> Result<Vec<JobRun>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM job_runs WHERE status = 'queued' ORDER BY created_at, rowid"
                ),
                (),
            )
            .await?;
        let mut runs = Vec::new();
        while let Some(row) = rows.next().await? {
            runs.push(row_to_run(&row)?);
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use ferry_core::enums::{JobStatus, RunKind};

    use crate::test_support::{seed_job, test_store};

    #[tokio::test]
    async fn initial_run_is_created_with_job() {
        let store = test_store().await;
        let (job, run) = seed_job(&store).await;
        assert_eq!(run.kind, RunKind::Initial);
        assert_eq!(run.status, JobStatus::Queued);
        assert_eq!(job.current_run_id.as_deref(), Some(run.id.as_str()));

        let runs = store.list_runs(&job.id).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(store.get_run(&run.id).await.unwrap(), run);
    }

    #[tokio::test]
    async fn queued_runs_in_submission_order() {
        let store = test_store().await;
        let (_, first) = seed_job(&store).await;
        let (_, second) = seed_job(&store).await;
        let ids: Vec<_> = store
            .queued_runs()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }
}
