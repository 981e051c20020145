use std::time::Duration;

use anyhow::Context;
use ferry_engine::{JobScheduler, ProgressSnapshot, RecoveryReport};

use crate::commands::shared::rate::format_rate;
use crate::ui;

/// How a drive ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveEnd {
    /// Nothing left queued or running.
    Drained,
    /// Ctrl-C: the active job was cancelled and the rest left queued.
    Interrupted,
}

/// Put persisted work back on the scheduler: fail runs a dead engine left
/// `running`, queue the `queued` ones.
pub async fn recover(scheduler: &JobScheduler) -> anyhow::Result<RecoveryReport> {
    let report = scheduler
        .recover()
        .await
        .context("failed to recover persisted jobs")?;
    for job_id in &report.interrupted {
        tracing::warn!(job_id, "job was running when the last engine stopped; marked failed");
    }
    Ok(report)
}

/// Run the scheduler until it is idle, printing progress to stderr.
///
/// The first Ctrl-C cancels the active job cooperatively and stops dispatch;
/// a second one aborts without waiting.
pub async fn drive(scheduler: &JobScheduler, progress_every: Duration) -> anyhow::Result<DriveEnd> {
    let show_progress = ui::prefs().progress;
    let mut ticker = tokio::time::interval(progress_every.max(Duration::from_millis(100)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    let idle = scheduler.wait_idle();
    tokio::pin!(idle);
    let mut end = DriveEnd::Drained;

    loop {
        tokio::select! {
            () = &mut idle => return Ok(end),
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                if end == DriveEnd::Interrupted {
                    anyhow::bail!(
                        "interrupted again; the active job will be marked failed on the next start"
                    );
                }
                end = DriveEnd::Interrupted;
                match scheduler.shutdown() {
                    Some(job_id) => eprintln!("cancelling {job_id}; press Ctrl-C again to abort"),
                    None => eprintln!("stopping"),
                }
            }
            _ = ticker.tick(), if show_progress => {
                if let Some((job_id, snapshot)) = scheduler.active_progress() {
                    eprintln!("{}", progress_line(&job_id, &snapshot));
                }
            }
        }
    }
}

/// One stderr progress line, e.g.
/// `job-1a2b3c4d: 120/200 (60%) ok 118 failed 2 @ 41.3 rows/sec`.
#[must_use]
pub fn progress_line(job_id: &str, snapshot: &ProgressSnapshot) -> String {
    let counters = &snapshot.counters;
    let mut line = format!("{job_id}: {}", counters.processed_rows);
    if let Some(total) = counters.total_rows {
        line.push_str(&format!("/{total}"));
    }
    if let Some(percent) = snapshot.percent_complete {
        line.push_str(&format!(" ({percent}%)"));
    }
    line.push_str(&format!(
        " ok {} failed {}",
        counters.successful_rows, counters.failed_row_count
    ));
    if let Some(rate) = format_rate(snapshot.rows_per_second) {
        line.push_str(&format!(" @ {rate}"));
    }
    line
}
