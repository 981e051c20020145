use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

use super::types::JobView;

pub async fn run(id: &str, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let view = JobView::load(&ctx.recording_scheduler(), id).await?;
    output(&view, flags.format)
}
