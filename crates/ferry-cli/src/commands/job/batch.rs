use anyhow::Context;

use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

pub async fn run(id: &str, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    // Resolve first so an unknown id is an error rather than an empty batch.
    ctx.recording_scheduler().get(id).await?;
    let batch = ctx
        .store
        .get_retry_batch(id)
        .await
        .with_context(|| format!("failed to read retry batch of {id}"))?;
    output(&batch, flags.format)
}
