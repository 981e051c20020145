use std::time::Duration;

use crate::cli::GlobalFlags;
use crate::commands::shared::drive::{DriveEnd, drive, recover};
use crate::context::AppContext;
use crate::output::output;

use super::types::{JobView, RetryQueued};

const WAIT_PROGRESS_EVERY: Duration = Duration::from_secs(2);

pub async fn run(id: &str, wait: bool, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    if !wait {
        let scheduler = ctx.recording_scheduler();
        let run_id = scheduler.retry_failed(id).await?;
        let run = ctx.store.get_run(&run_id).await?;
        return output(
            &RetryQueued {
                job_id: id.to_string(),
                run_id,
                rows: run.scope_size.unwrap_or_default(),
            },
            flags.format,
        );
    }

    let scheduler = ctx.dispatching_scheduler();
    recover(&scheduler).await?;
    scheduler.retry_failed(id).await?;
    if drive(&scheduler, WAIT_PROGRESS_EVERY).await? == DriveEnd::Interrupted {
        eprintln!("interrupted; jobs still queued run with `ferry run`");
    }
    output(&JobView::load(&scheduler, id).await?, flags.format)
}
