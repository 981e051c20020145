//! Job repository: creation, lifecycle transitions, cancel flags, recovery.

use chrono::Utc;

use ferry_core::entities::{Job, JobRun, JobSpec, JobSummary};
use ferry_core::enums::{JobStatus, RunKind};
use ferry_core::ids::{PREFIX_JOB, PREFIX_RUN};
use ferry_core::progress::{JobCounters, RunCounters, percent_complete};

use crate::error::DatabaseError;
use crate::helpers::{
    get_bool, get_opt_string, get_opt_u64, get_u64, parse_datetime, parse_enum,
    parse_optional_datetime, sql_int,
};
use crate::repos::run::insert_run;
use crate::store::FerryStore;

const SELECT_COLS: &str = "id, name, source_environment_id, dest_environment_id, source_entity, \
     dest_entity, mapping, status, total_rows, processed_rows, successful_rows, failed_row_count, \
     current_run_id, last_error, cancel_requested, created_at, started_at, completed_at";

fn row_to_job(row: &libsql::Row) -> Result<Job, DatabaseError> {
    Ok(Job {
        id: row.get(0)?,
        name: row.get(1)?,
        source_environment_id: row.get(2)?,
        dest_environment_id: row.get(3)?,
        source_entity: row.get(4)?,
        dest_entity: row.get(5)?,
        mapping: serde_json::from_str(&row.get::<String>(6)?)?,
        status: parse_enum(&row.get::<String>(7)?)?,
        total_rows: get_opt_u64(row, 8)?,
        processed_rows: get_u64(row, 9)?,
        successful_rows: get_u64(row, 10)?,
        failed_row_count: get_u64(row, 11)?,
        current_run_id: get_opt_string(row, 12)?,
        last_error: get_opt_string(row, 13)?,
        cancel_requested: get_bool(row, 14)?,
        created_at: parse_datetime(&row.get::<String>(15)?)?,
        started_at: parse_optional_datetime(get_opt_string(row, 16)?.as_deref())?,
        completed_at: parse_optional_datetime(get_opt_string(row, 17)?.as_deref())?,
    })
}

fn invalid_transition(job: &Job, to: JobStatus) -> DatabaseError {
    DatabaseError::InvalidState(format!(
        "Cannot transition job {} from {} to {}",
        job.id, job.status, to
    ))
}

impl FerryStore {
    /// Persist a new job in `queued` state together with its initial run.
    ///
    /// `spec` must already be validated.
    pub async fn create_job(&self, spec: &JobSpec, name: &str) -> Result<(Job, JobRun), DatabaseError> {
        let now = Utc::now();
        let job_id = self.db().generate_id(PREFIX_JOB).await?;
        let run_id = self.db().generate_id(PREFIX_RUN).await?;
        let mapping_json = serde_json::to_string(&spec.mapping)?;

        let job = Job {
            id: job_id.clone(),
            name: name.to_string(),
            source_environment_id: spec.source_environment_id.clone(),
            dest_environment_id: spec.dest_environment_id.clone(),
            source_entity: spec.source_entity.clone(),
            dest_entity: spec.dest_entity.clone(),
            mapping: spec.mapping.clone(),
            status: JobStatus::Queued,
            total_rows: None,
            processed_rows: 0,
            successful_rows: 0,
            failed_row_count: 0,
            current_run_id: Some(run_id.clone()),
            last_error: None,
            cancel_requested: false,
            created_at: now,
            started_at: None,
            completed_at: None,
        };
        let run = JobRun {
            id: run_id,
            job_id,
            kind: RunKind::Initial,
            status: JobStatus::Queued,
            scope_size: None,
            processed_rows: 0,
            successful_rows: 0,
            failed_row_count: 0,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        };

        let _guard = self.write().await;
        let tx = self.db().conn().transaction().await?;
        tx.execute(
            "INSERT INTO jobs (id, name, source_environment_id, dest_environment_id, source_entity,
                               dest_entity, mapping, status, current_run_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            libsql::params![
                job.id.as_str(),
                job.name.as_str(),
                job.source_environment_id.as_str(),
                job.dest_environment_id.as_str(),
                job.source_entity.as_str(),
                job.dest_entity.as_str(),
                mapping_json,
                JobStatus::Queued.as_str(),
                run.id.as_str(),
                now.to_rfc3339()
            ],
        )
        .await?;
        insert_run(&tx, &run).await?;
        tx.commit().await?;

        tracing::info!(job_id = %job.id, run_id = %run.id, "job queued");
        Ok((job, run))
    }

    pub async fn get_job(&self, id: &str) -> Result<Job, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(&format!("SELECT {SELECT_COLS} FROM jobs WHERE id = ?1"), [id])
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        row_to_job(&row)
    }

    /// All jobs, oldest first. Jobs are never deleted.
    pub async fn list_jobs(&self) -> Result<Vec<Job>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM jobs ORDER BY created_at, rowid"),
                (),
            )
            .await?;
        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await? {
            jobs.push(row_to_job(&row)?);
        }
        Ok(jobs)
    }

    /// List view with environment names resolved. `rows_per_second` is left
    /// empty; only the live engine knows it.
    pub async fn list_job_summaries(&self) -> Result<Vec<JobSummary>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT j.id, j.name, j.status, j.total_rows, j.processed_rows, j.successful_rows,
                        j.failed_row_count, j.started_at, j.completed_at, s.name, d.name
                 FROM jobs j
                 JOIN environments s ON s.id = j.source_environment_id
                 JOIN environments d ON d.id = j.dest_environment_id
                 ORDER BY j.created_at, j.rowid",
                (),
            )
            .await?;
        let mut summaries = Vec::new();
        while let Some(row) = rows.next().await? {
            let total_rows = get_opt_u64(&row, 3)?;
            let processed_rows = get_u64(&row, 4)?;
            summaries.push(JobSummary {
                id: row.get(0)?,
                name: row.get(1)?,
                status: parse_enum(&row.get::<String>(2)?)?,
                total_rows,
                processed_rows,
                successful_rows: get_u64(&row, 5)?,
                failed_row_count: get_u64(&row, 6)?,
                started_at: parse_optional_datetime(get_opt_string(&row, 7)?.as_deref())?,
                completed_at: parse_optional_datetime(get_opt_string(&row, 8)?.as_deref())?,
                source_environment_name: row.get(9)?,
                dest_environment_name: row.get(10)?,
                percent_complete: percent_complete(processed_rows, total_rows),
                rows_per_second: None,
            });
        }
        Ok(summaries)
    }

    /// `queued → running` for a job and its run, recording `started_at` and the
    /// counters the run starts from.
    pub async fn start_run(
        &self,
        job_id: &str,
        run_id: &str,
        counters: JobCounters,
    ) -> Result<Job, DatabaseError> {
        let job = self.get_job(job_id).await?;
        if !job.status.can_transition_to(JobStatus::Running) {
            return Err(invalid_transition(&job, JobStatus::Running));
        }
        let now = Utc::now();

        {
            let _guard = self.write().await;
            let tx = self.db().conn().transaction().await?;
            tx.execute(
                "UPDATE jobs SET status = 'running', current_run_id = ?1, started_at = ?2,
                        completed_at = NULL, total_rows = ?3, processed_rows = ?4,
                        successful_rows = ?5, failed_row_count = ?6
                 WHERE id = ?7",
                libsql::params![
                    run_id,
                    now.to_rfc3339(),
                    counters.total_rows.map(sql_int),
                    sql_int(counters.processed_rows),
                    sql_int(counters.successful_rows),
                    sql_int(counters.failed_row_count),
                    job_id
                ],
            )
            .await?;
            tx.execute(
                "UPDATE job_runs SET status = 'running', started_at = ?1 WHERE id = ?2",
                libsql::params![now.to_rfc3339(), run_id],
            )
            .await?;
            tx.commit().await?;
        }

        tracing::info!(job_id, run_id, "run started");
        self.get_job(job_id).await
    }

    /// `running → terminal` for a job and its run.
    ///
    /// `error` is stored as the run error and, for `failed`, as the job's
    /// `last_error`. Clears any pending cancel request.
    pub async fn finish_run(
        &self,
        job_id: &str,
        run_id: &str,
        status: JobStatus,
        counters: JobCounters,
        run_counters: RunCounters,
        error: Option<&str>,
    ) -> Result<Job, DatabaseError> {
        let job = self.get_job(job_id).await?;
        if !status.is_terminal() || !job.status.can_transition_to(status) {
            return Err(invalid_transition(&job, status));
        }
        let now = Utc::now();
        let last_error = if status == JobStatus::Failed { error } else { None };

        {
            let _guard = self.write().await;
            let tx = self.db().conn().transaction().await?;
            tx.execute(
                "UPDATE jobs SET status = ?1, completed_at = ?2, total_rows = ?3,
                        processed_rows = ?4, successful_rows = ?5, failed_row_count = ?6,
                        last_error = ?7, cancel_requested = 0
                 WHERE id = ?8",
                libsql::params![
                    status.as_str(),
                    now.to_rfc3339(),
                    counters.total_rows.map(sql_int),
                    sql_int(counters.processed_rows),
                    sql_int(counters.successful_rows),
                    sql_int(counters.failed_row_count),
                    last_error,
                    job_id
                ],
            )
            .await?;
            tx.execute(
                "UPDATE job_runs SET status = ?1, completed_at = ?2, processed_rows = ?3,
                        successful_rows = ?4, failed_row_count = ?5, error = ?6
                 WHERE id = ?7",
                libsql::params![
                    status.as_str(),
                    now.to_rfc3339(),
                    sql_int(run_counters.processed_rows),
                    sql_int(run_counters.successful_rows),
                    sql_int(run_counters.failed_row_count),
                    error,
                    run_id
                ],
            )
            .await?;
            tx.commit().await?;
        }

        tracing::info!(job_id, run_id, status = %status, "run finished");
        self.get_job(job_id).await
    }

    /// Queue a retry run scoped to the job's current retry batch.
    ///
    /// The job goes back to `queued`; counters are left untouched until the run
    /// starts.
    pub async fn enqueue_retry(&self, job_id: &str, scope_size: u64) -> Result<JobRun, DatabaseError> {
        let job = self.get_job(job_id).await?;
        if !job.status.can_transition_to(JobStatus::Queued) {
            return Err(invalid_transition(&job, JobStatus::Queued));
        }
        let now = Utc::now();
        let run = JobRun {
            id: self.db().generate_id(PREFIX_RUN).await?,
            job_id: job_id.to_string(),
            kind: RunKind::Retry,
            status: JobStatus::Queued,
            scope_size: Some(scope_size),
            processed_rows: 0,
            successful_rows: 0,
            failed_row_count: 0,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        };

        let _guard = self.write().await;
        let tx = self.db().conn().transaction().await?;
        insert_run(&tx, &run).await?;
        tx.execute(
            "UPDATE jobs SET status = 'queued', current_run_id = ?1, completed_at = NULL,
                    last_error = NULL, cancel_requested = 0
             WHERE id = ?2",
            libsql::params![run.id.as_str(), job_id],
        )
        .await?;
        tx.commit().await?;

        tracing::info!(job_id, run_id = %run.id, scope_size, "retry run queued");
        Ok(run)
    }

    /// `queued → cancelled` for a job that never reached the run slot.
    pub async fn cancel_queued(&self, job_id: &str) -> Result<Job, DatabaseError> {
        let job = self.get_job(job_id).await?;
        if job.status != JobStatus::Queued {
            return Err(invalid_transition(&job, JobStatus::Cancelled));
        }
        let now = Utc::now();

        {
            let _guard = self.write().await;
            let tx = self.db().conn().transaction().await?;
            tx.execute(
                "UPDATE jobs SET status = 'cancelled', completed_at = ?1, cancel_requested = 0
                 WHERE id = ?2",
                libsql::params![now.to_rfc3339(), job_id],
            )
            .await?;
            if let Some(run_id) = job.current_run_id.as_deref() {
                tx.execute(
                    "UPDATE job_runs SET status = 'cancelled', completed_at = ?1
                     WHERE id = ?2 AND status = 'queued'",
                    libsql::params![now.to_rfc3339(), run_id],
                )
                .await?;
            }
            tx.commit().await?;
        }

        tracing::info!(job_id, "queued job cancelled");
        self.get_job(job_id).await
    }

    /// Flag a running job for cancellation. The engine that owns the run
    /// observes the flag at its next checkpoint.
    pub async fn request_cancel(&self, job_id: &str) -> Result<Job, DatabaseError> {
        let job = self.get_job(job_id).await?;
        if job.status != JobStatus::Running {
            return Err(invalid_transition(&job, JobStatus::Cancelled));
        }
        {
            let _guard = self.write().await;
            self.db()
                .conn()
                .execute("UPDATE jobs SET cancel_requested = 1 WHERE id = ?1", [job_id])
                .await?;
        }
        self.get_job(job_id).await
    }

    pub async fn is_cancel_requested(&self, job_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query("SELECT cancel_requested FROM jobs WHERE id = ?1", [job_id])
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        get_bool(&row, 0)
    }

    /// Mark every job and run left `running` by a stopped engine as `failed`.
    ///
    /// The job's failed count is reset to its retry batch size, so rows an
    /// interrupted retry run never reached still count as failed.
    ///
    /// Returns the affected job ids.
    pub async fn recover_interrupted(&self, reason: &str) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query("SELECT id FROM jobs WHERE status = 'running' ORDER BY created_at, rowid", ())
            .await?;
        let mut job_ids = Vec::new();
        while let Some(row) = rows.next().await? {
            job_ids.push(row.get::<String>(0)?);
        }
        if job_ids.is_empty() {
            return Ok(job_ids);
        }

        let now = Utc::now().to_rfc3339();
        let _guard = self.write().await;
        let tx = self.db().conn().transaction().await?;
        tx.execute(
            "UPDATE job_runs SET status = 'failed', completed_at = ?1, error = ?2
             WHERE status = 'running'",
            libsql::params![now.as_str(), reason],
        )
        .await?;
        tx.execute(
            "UPDATE jobs SET status = 'failed', completed_at = ?1, last_error = ?2,
                    cancel_requested = 0,
                    failed_row_count = (SELECT COUNT(*) FROM retry_batch b WHERE b.job_id = jobs.id),
                    processed_rows = successful_rows
                        + (SELECT COUNT(*) FROM retry_batch b WHERE b.job_id = jobs.id)
             WHERE status = 'running'",
            libsql::params![now.as_str(), reason],
        )
        .await?;
        tx.commit().await?;

        for job_id in &job_ids {
            tracing::warn!(job_id = %job_id, "interrupted run marked failed");
        }
        Ok(job_ids)
    }
}
