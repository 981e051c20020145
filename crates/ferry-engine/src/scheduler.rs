//! Job scheduling: one running job engine-wide, a FIFO queue behind it.
//!
//! The run slot is a single-permit semaphore. Whoever holds the permit owns the
//! active run; [`JobScheduler::pump`] hands the permit to the next queued run
//! when the active one finishes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use ferry_client::{ClientProvider, EnvironmentClient};
use ferry_config::{EngineConfig, FerryConfig, RetryConfig};
use ferry_core::entities::{Job, JobSpec, JobSummary};
use ferry_core::enums::{JobStatus, RunKind};
use ferry_core::progress::{JobCounters, RunCounters};
use ferry_db::error::DatabaseError;
use ferry_db::store::FerryStore;

use crate::error::{EngineError, not_found};
use crate::extract::KeyScope;
use crate::pipeline::{Pipeline, RunEnd};
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::retry::RetryCoordinator;

/// Error recorded on runs found `running` when an engine starts.
pub const INTERRUPTED_REASON: &str = "interrupted: engine stopped while run was active";

/// Tunables the engine reads from [`FerryConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineSettings {
    pub engine: EngineConfig,
    pub retry: RetryConfig,
}

impl From<&FerryConfig> for EngineSettings {
    fn from(config: &FerryConfig) -> Self {
        Self {
            engine: config.engine.clone(),
            retry: config.retry.clone(),
        }
    }
}

/// What [`JobScheduler::recover`] found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Jobs marked `failed` because their run was interrupted.
    pub interrupted: Vec<String>,
    /// Queued runs put back on the queue.
    pub requeued: usize,
}

#[derive(Debug, Clone)]
struct QueuedRun {
    job_id: String,
    run_id: String,
}

struct ActiveRun {
    job_id: String,
    run_id: String,
    cancel: CancellationToken,
    tracker: Option<Arc<ProgressTracker>>,
}

#[derive(Default)]
struct SchedulerState {
    queue: VecDeque<QueuedRun>,
    active: Option<ActiveRun>,
}

struct Inner {
    store: Arc<FerryStore>,
    clients: Arc<dyn ClientProvider>,
    settings: EngineSettings,
    dispatch: bool,
    run_slot: Arc<Semaphore>,
    state: Mutex<SchedulerState>,
    idle: Notify,
}

/// Accepts, runs, cancels, and retries migration jobs.
///
/// Cheap to clone; clones share one queue and one run slot.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl JobScheduler {
    /// A scheduler that runs queued jobs in this process.
    #[must_use]
    pub fn new(
        store: Arc<FerryStore>,
        clients: Arc<dyn ClientProvider>,
        settings: EngineSettings,
    ) -> Self {
        Self::build(store, clients, settings, true)
    }

    /// A scheduler that only records submissions, retries, and cancels.
    ///
    /// Queued runs are left for a dispatching scheduler to pick up (see
    /// [`Self::recover`]).
    #[must_use]
    pub fn submit_only(
        store: Arc<FerryStore>,
        clients: Arc<dyn ClientProvider>,
        settings: EngineSettings,
    ) -> Self {
        Self::build(store, clients, settings, false)
    }

    fn build(
        store: Arc<FerryStore>,
        clients: Arc<dyn ClientProvider>,
        settings: EngineSettings,
        dispatch: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                clients,
                settings,
                dispatch,
                run_slot: Arc::new(Semaphore::new(1)),
                state: Mutex::new(SchedulerState::default()),
                idle: Notify::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn store(&self) -> &Arc<FerryStore> {
        &self.inner.store
    }

    // ── Submission ─────────────────────────────────────────────────

    /// Validate and persist a job, then queue its initial run.
    ///
    /// Returns the new job id. The job starts right away when the run slot is
    /// free and waits in FIFO order otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for an invalid mapping, a blank
    /// entity name, or an unknown environment; nothing is persisted then.
    pub async fn submit(&self, spec: JobSpec) -> Result<String, EngineError> {
        spec.mapping.validate()?;
        if spec.source_entity.trim().is_empty() {
            return Err(EngineError::Validation("source entity must not be blank".into()));
        }
        if spec.dest_entity.trim().is_empty() {
            return Err(EngineError::Validation(
                "destination entity must not be blank".into(),
            ));
        }
        self.require_environment("source", &spec.source_environment_id).await?;
        self.require_environment("destination", &spec.dest_environment_id)
            .await?;

        let name = spec.display_name();
        let (job, run) = self.inner.store.create_job(&spec, &name).await?;
        tracing::info!(job_id = %job.id, run_id = %run.id, name = %job.name, "job submitted");

        self.enqueue(QueuedRun {
            job_id: job.id.clone(),
            run_id: run.id,
        });
        Ok(job.id)
    }

    async fn require_environment(&self, role: &str, id: &str) -> Result<(), EngineError> {
        match self.inner.store.get_environment(id).await {
            Ok(_) => Ok(()),
            Err(DatabaseError::NoResult) => Err(EngineError::Validation(format!(
                "unknown {role} environment '{id}'"
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Queue a new run scoped to the job's current retry batch.
    ///
    /// Returns the new run id.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] unless the job is finished and has
    /// failed rows to retry.
    pub async fn retry_failed(&self, job_id: &str) -> Result<String, EngineError> {
        let job = self
            .inner
            .store
            .get_job(job_id)
            .await
            .map_err(not_found("job", job_id))?;
        if !job.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "job {job_id} is {}; only finished jobs can be retried",
                job.status
            )));
        }
        if job.failed_row_count == 0 {
            return Err(EngineError::InvalidState(format!(
                "job {job_id} has no failed rows to retry"
            )));
        }
        let batch_size = self.inner.store.retry_batch_size(job_id).await?;

        let run = self
            .inner
            .store
            .enqueue_retry(job_id, batch_size)
            .await
            .map_err(not_found("job", job_id))?;
        tracing::info!(job_id, run_id = %run.id, rows = batch_size, "retry run queued");
        self.enqueue(QueuedRun {
            job_id: job_id.to_string(),
            run_id: run.id.clone(),
        });
        Ok(run.id)
    }

    /// Re-establish scheduler state after a restart.
    ///
    /// Runs left `running` by a stopped engine are marked `failed`. A
    /// dispatching scheduler also queues persisted queued runs again, in
    /// creation order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] if this scheduler has a run
    /// active, and database errors otherwise.
    pub async fn recover(&self) -> Result<RecoveryReport, EngineError> {
        if self.state().active.is_some() {
            return Err(EngineError::InvalidState(
                "cannot recover while a run is active".into(),
            ));
        }
        let interrupted = self.inner.store.recover_interrupted(INTERRUPTED_REASON).await?;
        let queued = self.inner.store.queued_runs().await?;

        let mut requeued = 0;
        if self.inner.dispatch {
            let mut state = self.state();
            for run in queued {
                if state.queue.iter().any(|q| q.run_id == run.id) {
                    continue;
                }
                state.queue.push_back(QueuedRun {
                    job_id: run.job_id,
                    run_id: run.id,
                });
                requeued += 1;
            }
        }
        tracing::info!(interrupted = interrupted.len(), requeued, "scheduler recovered");
        self.pump();
        Ok(RecoveryReport {
            interrupted,
            requeued,
        })
    }

    // ── Queries ────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown job id.
    pub async fn get(&self, job_id: &str) -> Result<Job, EngineError> {
        let mut job = self
            .inner
            .store
            .get_job(job_id)
            .await
            .map_err(not_found("job", job_id))?;
        self.overlay_job(&mut job);
        Ok(job)
    }

    /// All jobs in submission order, with live counters for the active job.
    ///
    /// # Errors
    ///
    /// Returns database errors.
    pub async fn list(&self) -> Result<Vec<Job>, EngineError> {
        let mut jobs = self.inner.store.list_jobs().await?;
        for job in &mut jobs {
            self.overlay_job(job);
        }
        Ok(jobs)
    }

    /// List view with environment names, percent complete, and live rate.
    ///
    /// # Errors
    ///
    /// Returns database errors.
    pub async fn list_summaries(&self) -> Result<Vec<JobSummary>, EngineError> {
        let mut summaries = self.inner.store.list_job_summaries().await?;
        for summary in &mut summaries {
            if summary.status != JobStatus::Running {
                continue;
            }
            if let Some(snapshot) = self.live_progress(&summary.id) {
                summary.total_rows = snapshot.counters.total_rows;
                summary.processed_rows = snapshot.counters.processed_rows;
                summary.successful_rows = snapshot.counters.successful_rows;
                summary.failed_row_count = snapshot.counters.failed_row_count;
                summary.percent_complete = snapshot.percent_complete;
                summary.rows_per_second = snapshot.rows_per_second;
            }
        }
        Ok(summaries)
    }

    /// Progress of `job_id` if it is this scheduler's active job.
    #[must_use]
    pub fn live_progress(&self, job_id: &str) -> Option<ProgressSnapshot> {
        let state = self.state();
        let active = state.active.as_ref().filter(|a| a.job_id == job_id)?;
        active.tracker.as_ref().map(|tracker| tracker.snapshot())
    }

    /// Id and progress of the job running here, once its run has begun.
    #[must_use]
    pub fn active_progress(&self) -> Option<(String, ProgressSnapshot)> {
        let state = self.state();
        let active = state.active.as_ref()?;
        let snapshot = active.tracker.as_ref()?.snapshot();
        Some((active.job_id.clone(), snapshot))
    }

    fn overlay_job(&self, job: &mut Job) {
        if job.status != JobStatus::Running {
            return;
        }
        if let Some(snapshot) = self.live_progress(&job.id) {
            job.total_rows = snapshot.counters.total_rows;
            job.processed_rows = snapshot.counters.processed_rows;
            job.successful_rows = snapshot.counters.successful_rows;
            job.failed_row_count = snapshot.counters.failed_row_count;
        }
    }

    /// Whether no run is active or queued in this scheduler.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.state();
        state.active.is_none() && state.queue.is_empty()
    }

    /// Resolve once no run is active or queued.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    // ── Cancellation ───────────────────────────────────────────────

    /// Cancel a job.
    ///
    /// A queued job is dropped from the queue and marked `cancelled` at once. A
    /// running job is signalled and becomes `cancelled` when its in-flight rows
    /// are recorded; the returned job may still read `running`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] for a job that already finished.
    pub async fn cancel(&self, job_id: &str) -> Result<Job, EngineError> {
        let job = self
            .inner
            .store
            .get_job(job_id)
            .await
            .map_err(not_found("job", job_id))?;

        let was_active = {
            let mut state = self.state();
            if let Some(active) = state.active.as_ref().filter(|a| a.job_id == job_id) {
                active.cancel.cancel();
                true
            } else {
                state.queue.retain(|q| q.job_id != job_id);
                false
            }
        };
        if was_active {
            tracing::info!(job_id, "cancel signalled to active run");
        }

        match job.status {
            JobStatus::Running => match self.inner.store.request_cancel(job_id).await {
                Ok(_) => {}
                // Our run finished between the read and the request.
                Err(DatabaseError::InvalidState(_)) if was_active => {}
                Err(err) => return Err(not_found("job", job_id)(err)),
            },
            // The active run may not have started yet; it sees the token
            // before it moves the job to running.
            JobStatus::Queued if was_active => {}
            JobStatus::Queued => {
                self.inner
                    .store
                    .cancel_queued(job_id)
                    .await
                    .map_err(not_found("job", job_id))?;
                tracing::info!(job_id, "queued job cancelled");
            }
            status => {
                return Err(EngineError::InvalidState(format!(
                    "job {job_id} is already {status}"
                )));
            }
        }
        self.get(job_id).await
    }

    /// Stop dispatching: forget queued runs and cancel the active one.
    ///
    /// Forgotten runs stay `queued` in the store for the next
    /// [`Self::recover`]. Returns the id of the cancelled job, if any.
    pub fn shutdown(&self) -> Option<String> {
        let mut state = self.state();
        let dropped = state.queue.len();
        state.queue.clear();
        let active = state.active.as_ref().map(|active| {
            active.cancel.cancel();
            active.job_id.clone()
        });
        drop(state);
        tracing::info!(dropped, active = ?active, "scheduler shutting down");
        if active.is_none() {
            self.inner.idle.notify_waiters();
        }
        active
    }

    // ── Dispatch ───────────────────────────────────────────────────

    fn enqueue(&self, run: QueuedRun) {
        if !self.inner.dispatch {
            return;
        }
        self.state().queue.push_back(run);
        self.pump();
    }

    /// Start the next queued run if the run slot is free.
    fn pump(&self) {
        if !self.inner.dispatch {
            return;
        }
        let mut state = self.state();
        let Ok(permit) = Arc::clone(&self.inner.run_slot).try_acquire_owned() else {
            return;
        };
        let Some(next) = state.queue.pop_front() else {
            drop(permit);
            drop(state);
            self.inner.idle.notify_waiters();
            return;
        };

        let cancel = CancellationToken::new();
        state.active = Some(ActiveRun {
            job_id: next.job_id.clone(),
            run_id: next.run_id.clone(),
            cancel: cancel.clone(),
            tracker: None,
        });
        drop(state);

        let scheduler = self.clone();
        tokio::spawn(async move {
            if let Err(err) = scheduler.execute(&next, cancel).await {
                tracing::error!(
                    job_id = %next.job_id,
                    run_id = %next.run_id,
                    error = %err,
                    "run could not be executed"
                );
            }
            scheduler.state().active = None;
            drop(permit);
            scheduler.pump();
        });
    }

    async fn execute(&self, queued: &QueuedRun, cancel: CancellationToken) -> Result<(), EngineError> {
        let store = &self.inner.store;
        let job_id = queued.job_id.as_str();
        let run_id = queued.run_id.as_str();

        let job = store.get_job(job_id).await?;
        let run = store.get_run(run_id).await?;
        if job.status != JobStatus::Queued || run.status != JobStatus::Queued {
            tracing::debug!(job_id, run_id, status = %job.status, "run no longer queued, skipping");
            return Ok(());
        }
        if cancel.is_cancelled() {
            store.cancel_queued(job_id).await?;
            return Ok(());
        }

        let (base, scope, coordinator, scope_size) = match run.kind {
            RunKind::Initial => (
                JobCounters::default(),
                KeyScope::All,
                RetryCoordinator::default(),
                None,
            ),
            RunKind::Retry => {
                let batch = store.get_retry_batch(job_id).await?;
                let coordinator = RetryCoordinator::from_batch(&batch);
                let scope_size = u64::try_from(coordinator.len()).unwrap_or(u64::MAX);
                let base = JobCounters {
                    total_rows: Some(job.successful_rows + scope_size),
                    processed_rows: job.successful_rows,
                    successful_rows: job.successful_rows,
                    failed_row_count: 0,
                };
                (
                    base,
                    KeyScope::Keys(coordinator.scope().to_vec()),
                    coordinator,
                    Some(scope_size),
                )
            }
        };

        store.start_run(job_id, run_id, base).await?;
        let tracker = Arc::new(ProgressTracker::begin(base));
        {
            let mut state = self.state();
            if let Some(active) = state.active.as_mut().filter(|a| a.run_id == run_id) {
                active.tracker = Some(Arc::clone(&tracker));
            }
        }
        tracing::info!(job_id, run_id, kind = %run.kind, "run executing");

        let (source, dest) = match self.resolve_clients(&job).await {
            Ok(clients) => clients,
            Err(err) => {
                tracker.stop();
                tracker.carry_unattempted(unattempted(scope_size, &tracker));
                let reason = format!("cannot start: {err}");
                tracing::error!(job_id, run_id, error = %reason, "run failed to start");
                let (counters, run_counters) = tracker.counters();
                return self
                    .record_finish(job_id, run_id, JobStatus::Failed, counters, run_counters, Some(&reason))
                    .await;
            }
        };
        self.check_source_fields(&job, source.as_ref()).await;

        let end = Pipeline {
            store: Arc::clone(store),
            job_id: job_id.to_string(),
            run_id: run_id.to_string(),
            kind: run.kind,
            source,
            dest,
            source_entity: job.source_entity.clone(),
            dest_entity: job.dest_entity.clone(),
            mapping: job.mapping.clone(),
            scope,
            coordinator,
            tracker: Arc::clone(&tracker),
            settings: self.inner.settings.clone(),
            cancel,
        }
        .run()
        .await;
        tracker.stop();

        let missed = unattempted(scope_size, &tracker);
        if missed > 0 {
            if end == RunEnd::Exhausted {
                tracing::warn!(job_id, run_id, rows = missed, "retry rows no longer returned by source");
            }
            tracker.carry_unattempted(missed);
        }

        let (counters, run_counters) = tracker.counters();
        let (status, error) = match end {
            RunEnd::Exhausted if counters.failed_row_count == 0 => (JobStatus::Completed, None),
            RunEnd::Exhausted => (JobStatus::CompletedWithErrors, None),
            RunEnd::Cancelled => (JobStatus::Cancelled, None),
            RunEnd::Failed(reason) => {
                tracing::error!(job_id, run_id, error = %reason, "run failed");
                (JobStatus::Failed, Some(reason))
            }
        };
        self.record_finish(job_id, run_id, status, counters, run_counters, error.as_deref())
            .await
    }

    /// Move the run to its terminal status.
    ///
    /// If that write fails, record `failed` instead: the run slot is released
    /// once this returns, and the job must not stay `running`.
    async fn record_finish(
        &self,
        job_id: &str,
        run_id: &str,
        status: JobStatus,
        counters: JobCounters,
        run_counters: RunCounters,
        error: Option<&str>,
    ) -> Result<(), EngineError> {
        let store = &self.inner.store;
        let Err(err) = store
            .finish_run(job_id, run_id, status, counters, run_counters, error)
            .await
        else {
            return Ok(());
        };
        tracing::error!(job_id, run_id, status = %status, error = %err, "could not record run end");
        let reason = format!("could not record {status}: {err}");
        store
            .finish_run(job_id, run_id, JobStatus::Failed, counters, run_counters, Some(&reason))
            .await?;
        Ok(())
    }

    async fn resolve_clients(
        &self,
        job: &Job,
    ) -> Result<(Arc<dyn EnvironmentClient>, Arc<dyn EnvironmentClient>), EngineError> {
        let store = &self.inner.store;
        let source_env = store
            .get_environment(&job.source_environment_id)
            .await
            .map_err(not_found("environment", &job.source_environment_id))?;
        let dest_env = store
            .get_environment(&job.dest_environment_id)
            .await
            .map_err(not_found("environment", &job.dest_environment_id))?;
        let source = self.inner.clients.client_for(&source_env)?;
        let dest = self.inner.clients.client_for(&dest_env)?;
        Ok((source, dest))
    }

    /// Warn about mapped source fields the source entity does not describe.
    async fn check_source_fields(&self, job: &Job, source: &dyn EnvironmentClient) {
        let fields = match source.list_entity_fields(&job.source_entity).await {
            Ok(fields) => fields,
            Err(err) => {
                tracing::warn!(job_id = %job.id, error = %err, "could not describe source entity");
                return;
            }
        };
        for entry in job.mapping.entries() {
            if entry.transform.ignores_source() {
                continue;
            }
            if !fields.iter().any(|f| f.name == entry.source_field) {
                tracing::warn!(
                    job_id = %job.id,
                    field = %entry.source_field,
                    entity = %job.source_entity,
                    "mapped source field not described by source entity"
                );
            }
        }
    }
}

/// Retry-scope rows the run never recorded an outcome for.
fn unattempted(scope_size: Option<u64>, tracker: &ProgressTracker) -> u64 {
    scope_size.map_or(0, |size| size.saturating_sub(tracker.counters().1.processed_rows))
}
