use ferry_core::enums::JobStatus;

use crate::cli::GlobalFlags;
use crate::commands::shared::rate::{checkpointed_rate, format_rate};
use crate::context::AppContext;
use crate::output::output;

use super::types::JobListRow;

pub async fn run(ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let scheduler = ctx.recording_scheduler();
    let summaries = scheduler.list_summaries().await?;

    let mut rows = Vec::with_capacity(summaries.len());
    for mut summary in summaries {
        // The engine runs in another process; estimate from its checkpoints.
        if summary.status == JobStatus::Running && summary.rows_per_second.is_none() {
            let job = scheduler.get(&summary.id).await?;
            summary.rows_per_second = checkpointed_rate(&ctx.store, &job).await?;
        }
        let rate = format_rate(summary.rows_per_second);
        rows.push(JobListRow { summary, rate });
    }
    output(&rows, flags.format)
}
