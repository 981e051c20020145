use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::RunArgs;
use crate::commands::shared::drive::{DriveEnd, drive, recover};
use crate::context::AppContext;
use crate::output::output;

/// What one `ferry run` did.
#[derive(Debug, Serialize)]
struct RunReport {
    /// Jobs found `running` from a previous engine and marked failed.
    interrupted: Vec<String>,
    /// Persisted queued runs picked up at start.
    requeued: usize,
    stopped_early: bool,
    /// Runs still queued on exit.
    remaining_queued: usize,
}

/// Handle `ferry run`: recover, then run queued jobs until none are left.
pub async fn handle(args: &RunArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let scheduler = ctx.dispatching_scheduler();
    let recovery = recover(&scheduler).await?;
    tracing::info!(
        interrupted = recovery.interrupted.len(),
        requeued = recovery.requeued,
        "engine started"
    );

    let end = drive(&scheduler, Duration::from_secs(args.progress_interval)).await?;
    let remaining_queued = ctx
        .store
        .queued_runs()
        .await
        .context("failed to read queued runs")?
        .len();

    output(
        &RunReport {
            interrupted: recovery.interrupted,
            requeued: recovery.requeued,
            stopped_early: end == DriveEnd::Interrupted,
            remaining_queued,
        },
        flags.format,
    )
}
