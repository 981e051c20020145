use std::path::Path;

use anyhow::Context;

use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

use super::types::OutcomeExport;

pub async fn run(
    id: &str,
    failed_only: bool,
    limit: Option<u32>,
    export: Option<&str>,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    ctx.recording_scheduler().get(id).await?;

    if let Some(path) = export {
        if limit.is_some() {
            tracing::warn!("--limit is ignored with --export; the whole log is written");
        }
        let lines = ctx
            .store
            .export_outcomes_jsonl(id, failed_only, Path::new(path))
            .await
            .with_context(|| format!("failed to export outcomes of {id} to {path}"))?;
        return output(
            &OutcomeExport {
                job_id: id.to_string(),
                path: path.to_string(),
                lines,
            },
            flags.format,
        );
    }

    let outcomes = ctx
        .store
        .list_outcomes(id, failed_only, limit)
        .await
        .with_context(|| format!("failed to read outcomes of {id}"))?;
    output(&outcomes, flags.format)
}
