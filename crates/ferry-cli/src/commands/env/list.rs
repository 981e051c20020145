use anyhow::Context;

use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

use super::types::EnvironmentView;

pub async fn run(ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let environments = ctx
        .store
        .list_environments()
        .await
        .context("failed to list environments")?;
    let views = environments
        .into_iter()
        .map(|env| EnvironmentView::new(env, &ctx.config.credentials))
        .collect::<Vec<_>>();
    output(&views, flags.format)
}
