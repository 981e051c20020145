//! The streaming run pipeline.
//!
//! ```text
//! extract ──raw──▶ transform ──rows──▶ load dispatcher ──▶ JoinSet of writes
//!                      │                                        │
//!                      └──────────── outcomes ◀─────────────────┘
//!                                       │
//!                                    recorder ──▶ checkpoint (store)
//! ```
//!
//! Stages are tokio tasks joined by bounded channels; a full channel is the only
//! throttle. The recorder is the single consumer of outcomes, so progress,
//! retry-batch changes, and checkpoints for a job are applied in one order.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use ferry_client::EnvironmentClient;
use ferry_core::enums::{FailedStage, OutcomeStatus, RunKind};
use ferry_core::mapping::ColumnMapping;
use ferry_core::row::{RawRow, TransformedRow};
use ferry_db::repos::checkpoint::{Checkpoint, NewRowOutcome};
use ferry_db::store::FerryStore;

use crate::extract::{KeyScope, RowExtractor};
use crate::load::RowLoader;
use crate::progress::ProgressTracker;
use crate::retry::RetryCoordinator;
use crate::scheduler::EngineSettings;
use crate::transform::RowTransformer;

/// How a run's pipeline ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEnd {
    /// The source sequence ran dry and every row was recorded.
    Exhausted,
    /// Cancelled; rows in flight at the time were recorded.
    Cancelled,
    /// The run cannot go on (unreadable page, failed checkpoint).
    Failed(String),
}

/// Result of one row attempt on its way to the recorder.
#[derive(Debug)]
struct RowResult {
    key: String,
    failure: Option<(FailedStage, String)>,
    load_tries: u32,
}

enum ExtractEnd {
    Exhausted,
    Stopped,
    Failed(String),
}

/// Everything one run needs.
pub(crate) struct Pipeline {
    pub store: Arc<FerryStore>,
    pub job_id: String,
    pub run_id: String,
    pub kind: RunKind,
    pub source: Arc<dyn EnvironmentClient>,
    pub dest: Arc<dyn EnvironmentClient>,
    pub source_entity: String,
    pub dest_entity: String,
    pub mapping: ColumnMapping,
    pub scope: KeyScope,
    pub coordinator: RetryCoordinator,
    pub tracker: Arc<ProgressTracker>,
    pub settings: EngineSettings,
    pub cancel: CancellationToken,
}

impl Pipeline {
    pub(crate) async fn run(self) -> RunEnd {
        let engine = &self.settings.engine;
        let capacity = engine.channel_capacity.max(1);
        let stop = self.cancel.child_token();

        let (raw_tx, raw_rx) = mpsc::channel::<RawRow>(capacity);
        let (row_tx, row_rx) = mpsc::channel::<TransformedRow>(capacity);
        let (outcome_tx, outcome_rx) = mpsc::channel::<RowResult>(capacity);

        let extractor = RowExtractor::new(
            Arc::clone(&self.source),
            &self.source_entity,
            self.scope,
            engine.page_size,
        );
        let extract = tokio::spawn(extract_stage(
            extractor,
            raw_tx,
            Arc::clone(&self.tracker),
            self.kind == RunKind::Initial,
            stop.clone(),
        ));
        let transform = tokio::spawn(transform_stage(
            RowTransformer::new(self.mapping),
            raw_rx,
            row_tx,
            outcome_tx.clone(),
            stop.clone(),
        ));
        let load = tokio::spawn(load_stage(
            RowLoader::new(Arc::clone(&self.dest), &self.dest_entity, self.settings.retry.clone()),
            row_rx,
            outcome_tx,
            engine.load_concurrency.max(1),
            stop.clone(),
        ));
        let recorder = Recorder {
            store: Arc::clone(&self.store),
            job_id: self.job_id.clone(),
            run_id: self.run_id.clone(),
            coordinator: self.coordinator,
            tracker: Arc::clone(&self.tracker),
            batch_size: engine.checkpoint_batch_size.max(1),
            cancel: self.cancel.clone(),
            stop: stop.clone(),
        };
        let record = tokio::spawn(recorder.run(outcome_rx));

        let extract_end = extract.await.unwrap_or_else(|err| {
            stop.cancel();
            ExtractEnd::Failed(format!("extract stage panicked: {err}"))
        });
        let mut panicked = None;
        if let Err(err) = transform.await {
            stop.cancel();
            panicked = Some(format!("transform stage panicked: {err}"));
        }
        if let Err(err) = load.await {
            stop.cancel();
            panicked = Some(format!("load stage panicked: {err}"));
        }
        let record_end = record
            .await
            .unwrap_or_else(|err| Err(format!("recorder panicked: {err}")));

        if let Err(reason) = record_end {
            return RunEnd::Failed(reason);
        }
        if let Some(reason) = panicked {
            return RunEnd::Failed(reason);
        }
        match extract_end {
            ExtractEnd::Failed(reason) => RunEnd::Failed(reason),
            _ if self.cancel.is_cancelled() => RunEnd::Cancelled,
            ExtractEnd::Exhausted => {
                self.tracker.exhausted();
                RunEnd::Exhausted
            }
            ExtractEnd::Stopped => RunEnd::Cancelled,
        }
    }
}

async fn extract_stage(
    mut extractor: RowExtractor,
    tx: mpsc::Sender<RawRow>,
    tracker: Arc<ProgressTracker>,
    apply_total: bool,
    stop: CancellationToken,
) -> ExtractEnd {
    let mut total_applied = !apply_total;
    loop {
        let batch = tokio::select! {
            biased;
            () = stop.cancelled() => return ExtractEnd::Stopped,
            batch = extractor.next_batch() => batch,
        };
        let rows = match batch {
            Ok(Some(rows)) => rows,
            Ok(None) => return ExtractEnd::Exhausted,
            Err(err) => {
                tracing::error!(error = %err, "source sequence failed");
                stop.cancel();
                return ExtractEnd::Failed(err.to_string());
            }
        };
        if !total_applied {
            if let Some(total) = extractor.reported_total() {
                tracker.set_reported_total(total);
            }
            total_applied = true;
        }
        for row in rows {
            if tx.send(row).await.is_err() {
                return ExtractEnd::Stopped;
            }
        }
    }
}

async fn transform_stage(
    transformer: RowTransformer,
    mut rx: mpsc::Receiver<RawRow>,
    tx: mpsc::Sender<TransformedRow>,
    outcomes: mpsc::Sender<RowResult>,
    stop: CancellationToken,
) {
    loop {
        let row = tokio::select! {
            biased;
            () = stop.cancelled() => break,
            row = rx.recv() => row,
        };
        let Some(row) = row else { break };
        match transformer.transform(&row) {
            Ok(shaped) => {
                if tx.send(shaped).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::debug!(row_key = %row.key, error = %err, "transform failed");
                let result = RowResult {
                    key: row.key,
                    failure: Some((FailedStage::Transform, err.to_string())),
                    load_tries: 0,
                };
                if outcomes.send(result).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn load_stage(
    loader: RowLoader,
    mut rx: mpsc::Receiver<TransformedRow>,
    outcomes: mpsc::Sender<RowResult>,
    concurrency: usize,
    stop: CancellationToken,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut writes = JoinSet::new();

    loop {
        let row = tokio::select! {
            biased;
            () = stop.cancelled() => break,
            row = rx.recv() => row,
        };
        let Some(row) = row else { break };
        let permit = tokio::select! {
            biased;
            () = stop.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => permit,
        };
        let Ok(permit) = permit else { break };

        let loader = loader.clone();
        let outcomes = outcomes.clone();
        let stop = stop.clone();
        writes.spawn(async move {
            let result = match loader.write(&row, &stop).await {
                Ok(tries) => RowResult {
                    key: row.key,
                    failure: None,
                    load_tries: tries,
                },
                Err(err) => RowResult {
                    load_tries: err.tries(),
                    key: row.key,
                    failure: Some((FailedStage::Load, err.to_string())),
                },
            };
            drop(permit);
            // The recorder outlives every sender; a send error means it failed
            // and the run is already ending.
            let _ = outcomes.send(result).await;
        });
        while let Some(joined) = writes.try_join_next() {
            log_join(joined);
        }
    }

    while let Some(joined) = writes.join_next().await {
        log_join(joined);
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        tracing::error!(error = %err, "row write task failed");
    }
}

struct Recorder {
    store: Arc<FerryStore>,
    job_id: String,
    run_id: String,
    coordinator: RetryCoordinator,
    tracker: Arc<ProgressTracker>,
    batch_size: usize,
    cancel: CancellationToken,
    stop: CancellationToken,
}

impl Recorder {
    /// Record outcomes until every sender is gone.
    ///
    /// When a checkpoint fails the tracker is put back to the last committed
    /// counters, so the run finishes with counts the row log accounts for.
    async fn run(mut self, mut rx: mpsc::Receiver<RowResult>) -> Result<(), String> {
        let mut buf = Vec::with_capacity(self.batch_size);
        let mut failure = None;
        let mut committed = self.tracker.counters();
        loop {
            buf.clear();
            if rx.recv_many(&mut buf, self.batch_size).await == 0 {
                break;
            }
            if failure.is_some() {
                continue;
            }
            let checkpoint = self.apply(buf.drain(..));
            match self.store.checkpoint(&checkpoint).await {
                Ok(cancel_requested) => {
                    committed = (checkpoint.counters, checkpoint.run_counters);
                    if cancel_requested && !self.cancel.is_cancelled() {
                        tracing::info!(job_id = %self.job_id, "cancel requested, stopping run");
                        self.cancel.cancel();
                    }
                }
                Err(err) => {
                    tracing::error!(job_id = %self.job_id, error = %err, "checkpoint failed");
                    self.tracker.restore(committed.0, committed.1);
                    failure = Some(format!("checkpoint failed: {err}"));
                    self.stop.cancel();
                }
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// Count a batch of outcomes and build the checkpoint that persists them.
    fn apply(&mut self, results: impl Iterator<Item = RowResult>) -> Checkpoint {
        let mut checkpoint = Checkpoint {
            job_id: self.job_id.clone(),
            run_id: self.run_id.clone(),
            ..Checkpoint::default()
        };
        for result in results {
            let attempt = self.coordinator.next_attempt(&result.key);
            match result.failure {
                None => {
                    self.tracker.record(true);
                    if let Some(change) = self.coordinator.record_success(&result.key) {
                        checkpoint.batch_changes.push(change);
                    }
                    checkpoint.outcomes.push(NewRowOutcome {
                        source_row_key: result.key,
                        attempt,
                        status: OutcomeStatus::Success,
                        error_message: None,
                        failed_stage: None,
                        load_tries: result.load_tries,
                    });
                }
                Some((stage, message)) => {
                    self.tracker.record(false);
                    tracing::debug!(
                        row_key = %result.key,
                        attempt,
                        stage = %stage,
                        error = %message,
                        "row failed"
                    );
                    checkpoint.batch_changes.push(self.coordinator.record_failure(
                        &result.key,
                        attempt,
                        &message,
                        stage,
                    ));
                    checkpoint.outcomes.push(NewRowOutcome {
                        source_row_key: result.key,
                        attempt,
                        status: OutcomeStatus::Failed,
                        error_message: Some(message),
                        failed_stage: Some(stage),
                        load_tries: result.load_tries,
                    });
                }
            }
        }
        let (counters, run_counters) = self.tracker.counters();
        checkpoint.counters = counters;
        checkpoint.run_counters = run_counters;
        checkpoint
    }
}
