//! Live progress of the active run.
//!
//! The recorder is the only writer; readers (scheduler `get`/`list`) take a
//! snapshot under the same lock, so a reader never sees a half-applied row.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use ferry_core::progress::{JobCounters, RunCounters, percent_complete, rate_per_second};

/// Point-in-time view of a run's progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub counters: JobCounters,
    pub run: RunCounters,
    pub percent_complete: Option<u8>,
    /// Rows per second over the run so far, when available.
    pub rows_per_second: Option<f64>,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct State {
    counters: JobCounters,
    run: RunCounters,
    started: Option<Instant>,
    stopped: Option<Instant>,
}

/// Counters of one job while a run executes.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: Mutex<State>,
}

impl ProgressTracker {
    /// Start tracking from `base` (zero for an initial run, rebased for a retry).
    #[must_use]
    pub fn begin(base: JobCounters) -> Self {
        Self {
            state: Mutex::new(State {
                counters: base,
                run: RunCounters::default(),
                started: Some(Instant::now()),
                stopped: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a total reported by the source. A total below the rows already
    /// processed is raised to that count.
    pub fn set_reported_total(&self, total: u64) {
        let mut state = self.state();
        let processed = state.counters.processed_rows;
        if total < processed {
            tracing::warn!(reported = total, processed, "source under-reported its row count");
        }
        state.counters.total_rows = Some(total.max(processed));
    }

    /// Count one row outcome.
    pub fn record(&self, success: bool) {
        let mut state = self.state();
        state.counters.processed_rows += 1;
        state.run.processed_rows += 1;
        if success {
            state.counters.successful_rows += 1;
            state.run.successful_rows += 1;
        } else {
            state.counters.failed_row_count += 1;
            state.run.failed_row_count += 1;
        }
        let processed = state.counters.processed_rows;
        if let Some(total) = state.counters.total_rows {
            if processed > total {
                tracing::warn!(total, processed, "row count exceeded reported total");
                state.counters.total_rows = Some(processed);
            }
        }
    }

    /// The source ran dry: an unknown total becomes the processed count.
    pub fn exhausted(&self) {
        let mut state = self.state();
        if state.counters.total_rows.is_none() {
            state.counters.total_rows = Some(state.counters.processed_rows);
        }
    }

    /// Reset to counters the store is known to hold.
    pub fn restore(&self, counters: JobCounters, run: RunCounters) {
        let mut state = self.state();
        state.counters = counters;
        state.run = run;
    }

    /// Count retry-scope rows a stopped run never reached as still failed.
    ///
    /// They stay in the retry batch, so the job's failed count keeps matching
    /// it. Run counters are untouched: the run did not attempt them.
    pub fn carry_unattempted(&self, rows: u64) {
        if rows == 0 {
            return;
        }
        let mut state = self.state();
        state.counters.processed_rows += rows;
        state.counters.failed_row_count += rows;
        let processed = state.counters.processed_rows;
        if state.counters.total_rows.is_some_and(|total| total < processed) {
            state.counters.total_rows = Some(processed);
        }
    }

    /// Freeze elapsed time; the rate is unavailable from here on.
    pub fn stop(&self) {
        let mut state = self.state();
        if state.stopped.is_none() {
            state.stopped = Some(Instant::now());
        }
    }

    #[must_use]
    pub fn counters(&self) -> (JobCounters, RunCounters) {
        let state = self.state();
        (state.counters, state.run)
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state();
        let elapsed = match (state.started, state.stopped) {
            (Some(started), Some(stopped)) => stopped.duration_since(started),
            (Some(started), None) => started.elapsed(),
            _ => Duration::ZERO,
        };
        let running = state.started.is_some() && state.stopped.is_none();
        ProgressSnapshot {
            counters: state.counters,
            run: state.run,
            percent_complete: percent_complete(state.counters.processed_rows, state.counters.total_rows),
            rows_per_second: rate_per_second(state.run.processed_rows, elapsed, running),
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counts_keep_identity() {
        let tracker = ProgressTracker::begin(JobCounters::default());
        tracker.set_reported_total(4);
        tracker.record(true);
        tracker.record(false);
        tracker.record(true);
        let snap = tracker.snapshot();
        assert_eq!(snap.counters.processed_rows, 3);
        assert_eq!(snap.counters.successful_rows, 2);
        assert_eq!(snap.counters.failed_row_count, 1);
        assert!(snap.counters.is_consistent());
        assert_eq!(snap.percent_complete, Some(75));
    }

    #[test]
    fn under_reported_total_is_raised() {
        let tracker = ProgressTracker::begin(JobCounters::default());
        tracker.set_reported_total(1);
        tracker.record(true);
        tracker.record(true);
        let snap = tracker.snapshot();
        assert_eq!(snap.counters.total_rows, Some(2));
        assert_eq!(snap.percent_complete, Some(100));
    }

    #[test]
    fn unknown_total_resolves_on_exhaustion() {
        let tracker = ProgressTracker::begin(JobCounters::default());
        tracker.record(true);
        assert_eq!(tracker.snapshot().percent_complete, None);
        tracker.exhausted();
        assert_eq!(tracker.snapshot().counters.total_rows, Some(1));
    }

    #[test]
    fn retry_base_is_kept_but_rate_is_run_local() {
        let base = JobCounters {
            total_rows: Some(12),
            processed_rows: 10,
            successful_rows: 10,
            failed_row_count: 0,
        };
        let tracker = ProgressTracker::begin(base);
        tracker.record(true);
        let (job, run) = tracker.counters();
        assert_eq!(job.processed_rows, 11);
        assert_eq!(run.processed_rows, 1);
    }

    #[test]
    fn unattempted_rows_count_as_failed_for_the_job_only() {
        let base = JobCounters {
            total_rows: Some(10),
            processed_rows: 5,
            successful_rows: 5,
            failed_row_count: 0,
        };
        let tracker = ProgressTracker::begin(base);
        tracker.record(true);
        tracker.record(false);
        tracker.carry_unattempted(3);

        let (job, run) = tracker.counters();
        assert_eq!(
            job,
            JobCounters {
                total_rows: Some(10),
                processed_rows: 10,
                successful_rows: 6,
                failed_row_count: 4,
            }
        );
        assert!(job.is_consistent());
        assert_eq!(run.processed_rows, 2);
        assert_eq!(run.failed_row_count, 1);
    }

    #[test]
    fn restore_discards_uncommitted_counts() {
        let tracker = ProgressTracker::begin(JobCounters::default());
        tracker.record(true);
        let committed = tracker.counters();
        tracker.record(false);
        tracker.record(false);

        tracker.restore(committed.0, committed.1);
        assert_eq!(tracker.counters(), committed);
        assert_eq!(tracker.snapshot().counters.failed_row_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_needs_one_second_and_a_running_tracker() {
        let tracker = ProgressTracker::begin(JobCounters::default());
        tracker.record(true);
        tracker.record(true);
        assert_eq!(tracker.snapshot().rows_per_second, None);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(tracker.snapshot().rows_per_second, Some(1.0));

        tracker.stop();
        assert_eq!(tracker.snapshot().rows_per_second, None);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_unavailable_without_rows() {
        let tracker = ProgressTracker::begin(JobCounters::default());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(tracker.snapshot().rows_per_second, None);
    }
}
