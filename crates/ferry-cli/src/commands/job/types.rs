use ferry_core::entities::{Job, JobSummary};
use ferry_engine::JobScheduler;
use serde::Serialize;

use crate::commands::shared::rate::{checkpointed_rate, format_rate};

/// A job with its derived progress figures.
#[derive(Debug, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub percent_complete: Option<u8>,
    pub rows_per_second: Option<f64>,
    pub rate: Option<String>,
}

impl JobView {
    /// Live figures when `scheduler` runs the job, checkpointed ones otherwise.
    pub async fn load(scheduler: &JobScheduler, job_id: &str) -> anyhow::Result<Self> {
        let job = scheduler.get(job_id).await?;
        let rows_per_second = match scheduler.live_progress(job_id) {
            Some(snapshot) => snapshot.rows_per_second,
            None => checkpointed_rate(scheduler.store(), &job).await?,
        };
        Ok(Self {
            percent_complete: job.percent_complete(),
            rows_per_second,
            rate: format_rate(rows_per_second),
            job,
        })
    }
}

/// One line of `job list`.
#[derive(Debug, Serialize)]
pub struct JobListRow {
    #[serde(flatten)]
    pub summary: JobSummary,
    pub rate: Option<String>,
}

/// Result of queueing a retry pass without running it.
#[derive(Debug, Serialize)]
pub struct RetryQueued {
    pub job_id: String,
    pub run_id: String,
    pub rows: u64,
}

/// Result of `job outcomes --export`.
#[derive(Debug, Serialize)]
pub struct OutcomeExport {
    pub job_id: String,
    pub path: String,
    pub lines: usize,
}
