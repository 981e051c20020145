use ferry_core::enums::JobStatus;

use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

use super::types::JobView;

pub async fn run(id: &str, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let scheduler = ctx.recording_scheduler();
    let job = scheduler.cancel(id).await?;
    if job.status == JobStatus::Running {
        eprintln!("cancel requested; the engine stops {id} at its next checkpoint");
    }
    output(&JobView::load(&scheduler, id).await?, flags.format)
}
